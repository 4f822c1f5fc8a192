//! Compilation errors

use thiserror::Error;

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Assignment or update applied to a non-target expression
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,

    /// `break` outside of any loop
    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    /// `continue` outside of any loop
    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
