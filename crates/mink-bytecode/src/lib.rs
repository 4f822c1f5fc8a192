//! # Mink Bytecode
//!
//! The compilation artifact shared by the compiler and the VM.
//!
//! ## Design Principles
//!
//! - **Stack-based**: instructions operate on the VM's operand stack
//! - **Flat encoding**: every instruction is `{ opcode, operand: u32 }`;
//!   the operand's interpretation depends on the opcode
//! - **Pooled literals**: scalar constants are deduplicated into a
//!   constant pool; names and string literals into a string pool
//! - **Serializable**: the artifact types derive serde for caching

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod bytecode;
pub mod constant;
pub mod error;
pub mod instruction;

pub use builder::BytecodeBuilder;
pub use bytecode::Bytecode;
pub use constant::{Constant, ConstantPool};
pub use error::BytecodeError;
pub use instruction::{Instruction, Opcode};

/// Bytecode format version
pub const BYTECODE_VERSION: u32 = 1;
