//! # Mink Core
//!
//! The execution engine: the value model with its coercions, the
//! GC-managed string/object/array/function types, the stack VM, and the
//! runtime/context lifecycle.
//!
//! ## Design Principles
//!
//! - **Tagged values**: a `Copy` sum type with tag-based dispatch
//! - **Single-threaded**: one VM runs at a time per runtime; interior
//!   mutability is `Cell`/`RefCell`, never locks
//! - **Runtime-owned state**: the heap and intern table belong to a
//!   runtime and are threaded explicitly; no global mutable state

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array;
pub mod builtins;
pub mod context;
pub mod convert;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod object;
pub mod runtime;
pub mod string;
pub mod value;

pub use array::{JsArray, JsArrayExt};
pub use context::VmContext;
pub use error::{VmError, VmResult};
pub use function::{FnKind, JsFunction, JsFunctionExt, NativeContext, NativeFn};
pub use interpreter::{Vm, VmState};
pub use object::{JsObject, JsObjectExt, Property};
pub use runtime::{RuntimeConfig, VmRuntime};
pub use string::{JsString, StringTable};
pub use value::{JsBigInt, JsSymbol, Value};
