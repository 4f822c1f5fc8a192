//! VM error types

use thiserror::Error;

/// VM execution errors.
///
/// Errors are not exceptions: each pipeline stage surfaces a first-error
/// result, and the VM transitions to its `Error` state when one of these
/// terminates execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Disallowed coercion or operation on the wrong kind of value
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Unsupported operation such as calling a non-function
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Out-of-bound numeric argument
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Operand stack exhausted or call stack too deep
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Allocation failed and collection could not recover
    #[error("out of memory")]
    OutOfMemory,

    /// Execution was interrupted by the embedder's flag
    #[error("interrupted")]
    Interrupted,

    /// Malformed bytecode
    #[error("bytecode error: {0}")]
    Bytecode(#[from] mink_bytecode::BytecodeError),

    /// Everything else that terminates execution
    #[error("InternalError: {0}")]
    Internal(String),
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a reference error
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<mink_gc::AllocError> for VmError {
    fn from(_: mink_gc::AllocError) -> Self {
        Self::OutOfMemory
    }
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;
