//! Engine errors
//!
//! The embedding surface collapses the per-stage errors into one type
//! carrying the §-style error kind and a human-readable message.

use thiserror::Error;

use mink_compiler::CompileError;
use mink_core::VmError;
use mink_frontend::ParseError;

/// The error taxonomy surfaced to embedders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lexer or parser failure
    Syntax,
    /// Unsupported operation (calling a non-function, undeclared name in
    /// strict contexts)
    Reference,
    /// Disallowed coercion or property write on the wrong kind of value
    Type,
    /// Out-of-bound numeric argument
    Range,
    /// Allocation failed and collection could not recover
    Memory,
    /// Everything else that terminates execution
    Runtime,
}

/// An error from any stage of the evaluate pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    /// Which kind of failure this is
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl EngineError {
    /// Create an engine error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ParseError> for EngineError {
    fn from(error: ParseError) -> Self {
        Self::new(ErrorKind::Syntax, error.to_string())
    }
}

impl From<CompileError> for EngineError {
    fn from(error: CompileError) -> Self {
        Self::new(ErrorKind::Syntax, error.to_string())
    }
}

impl From<VmError> for EngineError {
    fn from(error: VmError) -> Self {
        let kind = match &error {
            VmError::TypeError(_) => ErrorKind::Type,
            VmError::ReferenceError(_) => ErrorKind::Reference,
            VmError::RangeError(_) => ErrorKind::Range,
            VmError::OutOfMemory => ErrorKind::Memory,
            VmError::StackOverflow
            | VmError::Interrupted
            | VmError::Bytecode(_)
            | VmError::Internal(_) => ErrorKind::Runtime,
        };
        Self::new(kind, error.to_string())
    }
}
