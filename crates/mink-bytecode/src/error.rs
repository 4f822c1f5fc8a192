//! Bytecode errors

use thiserror::Error;

/// Errors raised when consuming a bytecode artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// An instruction referenced a constant index past the pool
    #[error("invalid constant index {0}")]
    InvalidConstantIndex(u32),

    /// An instruction referenced a string index past the pool
    #[error("invalid string index {0}")]
    InvalidStringIndex(u32),

    /// An instruction referenced a nested function index past the table
    #[error("invalid function index {0}")]
    InvalidFunctionIndex(u32),

    /// A jump targeted an instruction index past the stream
    #[error("invalid jump target {0}")]
    InvalidJumpTarget(u32),
}
