//! Syntax errors

use thiserror::Error;

/// A syntax error from the lexer or parser, with its source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    /// What went wrong
    pub message: String,
    /// 1-based source line
    pub line: u32,
    /// 1-based source column
    pub column: u32,
}

impl ParseError {
    /// Create a parse error
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}
