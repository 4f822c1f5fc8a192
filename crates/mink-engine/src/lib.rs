//! # Mink Engine
//!
//! The embeddable surface: a [`Runtime`] owns a heap and an intern
//! table; a [`Context`] owns a global object and a VM and evaluates
//! source text through the lex → parse → compile → execute pipeline.
//!
//! ```no_run
//! use mink_engine::Runtime;
//!
//! let runtime = Runtime::new();
//! let mut ctx = runtime.new_context().unwrap();
//! let value = ctx.evaluate("2 + 3 * 4;", "<embed>").unwrap();
//! assert_eq!(value.as_number(), Some(14.0));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;

use std::rc::Rc;

use mink_compiler::compile_program;
use mink_frontend::Parser;

pub use error::{EngineError, ErrorKind};
pub use mink_core::{
    JsArray, JsArrayExt, JsFunction, JsObject, JsObjectExt, JsString, NativeContext, NativeFn,
    Property, Value, VmError, VmResult, VmState,
};
pub use mink_core::convert::{number_to_string, to_number, value_to_string};
pub use mink_gc::{GcConfig, GcRef, HeapStats, WeakRef};

use mink_core::{RuntimeConfig, VmContext, VmRuntime};

/// An engine runtime: the heap, the intern table, and nothing else.
///
/// Runtimes are independent; values must never cross runtimes.
pub struct Runtime {
    inner: VmRuntime,
}

impl Runtime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self {
            inner: VmRuntime::new(),
        }
    }

    /// Create a runtime with a custom heap configuration
    pub fn with_gc_config(gc: GcConfig) -> Self {
        Self {
            inner: VmRuntime::with_config(RuntimeConfig { gc }),
        }
    }

    /// Create an execution context with a fresh global object and VM
    pub fn new_context(&self) -> Result<Context, EngineError> {
        Ok(Context {
            inner: self.inner.create_context()?,
        })
    }

    /// Heap statistics for the whole runtime
    pub fn heap_stats(&self) -> HeapStats {
        self.inner.heap().stats()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// An execution context.
pub struct Context {
    inner: VmContext,
}

impl Context {
    /// Evaluate source text: lex → parse → compile → execute.
    ///
    /// Returns the last statement's value. The first error from any
    /// stage is surfaced with its kind; VM failures leave the context in
    /// an error state that [`Context::clear_error`] resets.
    pub fn evaluate(&mut self, source: &str, filename: &str) -> Result<Value, EngineError> {
        tracing::debug!(target: "mink::engine", filename, bytes = source.len(), "evaluate");

        let program = Parser::new(source).parse_program()?;
        let bytecode = compile_program(&program)?;
        tracing::debug!(
            target: "mink::engine",
            filename,
            instructions = bytecode.len(),
            "compiled"
        );

        let value = self.inner.execute(Rc::new(bytecode))?;
        Ok(value)
    }

    /// The context's global object
    pub fn global_object(&self) -> GcRef<JsObject> {
        self.inner.global_object()
    }

    /// Read a global by name
    pub fn get_global(&self, name: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.inner.get_global(name)?)
    }

    /// Write a global by name
    pub fn set_global(&self, name: &str, value: Value) -> Result<(), EngineError> {
        Ok(self.inner.set_global(name, value)?)
    }

    /// Bind a native function as a global
    pub fn define_global_function(&self, name: &str, func: NativeFn) -> Result<(), EngineError> {
        Ok(self.inner.define_global_function(name, func)?)
    }

    /// Call a function value with an explicit `this` and arguments
    pub fn call_function(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        Ok(self.inner.call_function(callee, this, args)?)
    }

    /// Allocate a string value in this context's heap
    pub fn new_string(&self, s: &str) -> Result<Value, EngineError> {
        Ok(Value::String(self.inner.interner().intern(s)?))
    }

    /// Force a full garbage collection
    pub fn gc(&self) {
        self.inner.gc();
    }

    /// Live heap bytes
    pub fn memory_usage(&self) -> usize {
        self.inner.memory_usage()
    }

    /// The VM failure message recorded by the last evaluation, if any
    pub fn error_message(&self) -> Option<&str> {
        self.inner.error_message()
    }

    /// Clear a terminal VM error so the context can evaluate again
    pub fn clear_error(&mut self) {
        self.inner.clear_error();
    }

    /// The interrupt flag; set it to stop execution at the next
    /// instruction boundary
    pub fn interrupt_flag(&self) -> Rc<std::cell::Cell<bool>> {
        self.inner.interrupt_flag()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish()
    }
}
