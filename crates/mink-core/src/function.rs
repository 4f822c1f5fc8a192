//! Functions
//!
//! Either a native function pointer or a compiled bytecode body with its
//! parameter names and captured scope. Variable environments are plain
//! objects chained through the prototype link, so a captured scope is
//! just the environment object that was current when the function value
//! was built.

use std::cell::Cell;
use std::rc::Rc;

use mink_bytecode::Bytecode;
use mink_gc::{GcHeader, GcRef, GcTraceable, Heap, WriteBarrier, tags};

use crate::error::VmResult;
use crate::object::JsObject;
use crate::string::{JsString, StringTable};
use crate::value::Value;

/// What a native function sees of the runtime.
pub struct NativeContext<'a> {
    /// The managed heap, for allocating result values
    pub heap: &'a Rc<Heap>,
    /// The intern table
    pub interner: &'a Rc<StringTable>,
    /// The context's global object
    pub globals: GcRef<JsObject>,
}

/// Native function pointer type.
///
/// Receives `(ctx, this, args)` and returns the call result.
pub type NativeFn =
    fn(&mut NativeContext<'_>, &Value, &[Value]) -> VmResult<Value>;

/// The two function flavors.
pub enum FnKind {
    /// Implemented in Rust
    Native(NativeFn),
    /// Compiled from source
    Bytecode {
        /// The compiled body
        bytecode: Rc<Bytecode>,
        /// Interned parameter names, in declaration order
        param_names: Vec<GcRef<JsString>>,
        /// Environment captured by `BIND_SCOPE`
        captured_scope: Cell<Option<GcRef<JsObject>>>,
    },
}

/// A heap function object.
pub struct JsFunction {
    /// Optional function name
    pub name: Option<GcRef<JsString>>,
    /// Native or bytecode body
    pub kind: FnKind,
}

impl JsFunction {
    /// Build a native function
    pub fn native(name: Option<GcRef<JsString>>, func: NativeFn) -> Self {
        Self {
            name,
            kind: FnKind::Native(func),
        }
    }

    /// Build a bytecode function with no captured scope yet
    pub fn from_bytecode(
        name: Option<GcRef<JsString>>,
        bytecode: Rc<Bytecode>,
        param_names: Vec<GcRef<JsString>>,
    ) -> Self {
        Self {
            name,
            kind: FnKind::Bytecode {
                bytecode,
                param_names,
                captured_scope: Cell::new(None),
            },
        }
    }

    /// The captured scope, for bytecode functions
    pub fn captured_scope(&self) -> Option<GcRef<JsObject>> {
        match &self.kind {
            FnKind::Bytecode { captured_scope, .. } => captured_scope.get(),
            FnKind::Native(_) => None,
        }
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.map(|n| n.as_str().to_string());
        match &self.kind {
            FnKind::Native(_) => f
                .debug_struct("JsFunction")
                .field("name", &name)
                .field("native", &true)
                .finish(),
            FnKind::Bytecode { param_names, .. } => f
                .debug_struct("JsFunction")
                .field("name", &name)
                .field("params", &param_names.len())
                .finish(),
        }
    }
}

impl GcTraceable for JsFunction {
    const NEEDS_TRACE: bool = true;
    const TAG: u8 = tags::FUNCTION;

    fn trace(&self, tracer: &mut dyn FnMut(*const GcHeader)) {
        if let Some(name) = self.name {
            tracer(name.header_ptr());
        }
        if let FnKind::Bytecode {
            param_names,
            captured_scope,
            ..
        } = &self.kind
        {
            for param in param_names {
                tracer(param.header_ptr());
            }
            if let Some(scope) = captured_scope.get() {
                tracer(scope.header_ptr());
            }
        }
    }
}

/// Barrier-aware scope binding on the GC handle.
pub trait JsFunctionExt {
    /// Bind `scope` as the function's captured environment
    fn bind_scope(&self, barrier: &WriteBarrier, scope: GcRef<JsObject>);
}

impl JsFunctionExt for GcRef<JsFunction> {
    fn bind_scope(&self, barrier: &WriteBarrier, scope: GcRef<JsObject>) {
        if let FnKind::Bytecode { captured_scope, .. } = &self.kind {
            captured_scope.set(Some(scope));
            // SAFETY: both the function and the scope object are live
            unsafe { barrier.record_store(self.header_ptr(), scope.header_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytecode_function_traces_scope() {
        let heap = Rc::new(Heap::new());
        let interner = StringTable::new(Rc::clone(&heap));

        let scope = heap
            .alloc(JsObject::new(Rc::clone(heap.barrier())))
            .unwrap();
        let func = heap
            .alloc(JsFunction::from_bytecode(
                Some(interner.intern("f").unwrap()),
                Rc::new(Bytecode::default()),
                vec![interner.intern("a").unwrap()],
            ))
            .unwrap();
        func.bind_scope(heap.barrier(), scope);
        heap.add_root(func.header_ptr());

        heap.collect(&[]);
        // The function keeps its captured scope alive
        assert_eq!(func.captured_scope().unwrap().property_count(), 0);
        assert_eq!(scope.property_count(), 0);
    }

    #[test]
    fn test_native_function_has_no_scope() {
        fn noop(
            _ctx: &mut NativeContext<'_>,
            _this: &Value,
            _args: &[Value],
        ) -> VmResult<Value> {
            Ok(Value::Undefined)
        }

        let heap = Rc::new(Heap::new());
        let func = JsFunction::native(None, noop);
        assert!(func.captured_scope().is_none());
        assert!(matches!(func.kind, FnKind::Native(_)));
        drop(heap);
    }
}
