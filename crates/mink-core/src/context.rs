//! Execution contexts
//!
//! A context owns a fresh global object and a VM, both allocating from
//! its runtime's heap. Dropping the context unpins its roots.

use std::cell::Cell;
use std::rc::Rc;

use mink_bytecode::Bytecode;
use mink_gc::{GcRef, Heap};

use crate::builtins;
use crate::error::VmResult;
use crate::function::{JsFunction, NativeFn};
use crate::interpreter::{Vm, VmState};
use crate::object::{JsObject, JsObjectExt};
use crate::string::StringTable;
use crate::value::Value;

/// An execution context: one global object, one VM.
pub struct VmContext {
    heap: Rc<Heap>,
    interner: Rc<StringTable>,
    globals: GcRef<JsObject>,
    vm: Vm,
}

impl VmContext {
    /// Create a context over a runtime's heap and intern table.
    pub fn new(heap: Rc<Heap>, interner: Rc<StringTable>) -> VmResult<Self> {
        let globals = heap.alloc(JsObject::new(Rc::clone(heap.barrier())))?;
        heap.add_root(globals.header_ptr());
        builtins::install_globals(&heap, &interner, globals)?;
        let vm = Vm::new(Rc::clone(&heap), Rc::clone(&interner), globals)?;
        Ok(Self {
            heap,
            interner,
            globals,
            vm,
        })
    }

    /// Execute compiled bytecode in this context.
    pub fn execute(&mut self, bytecode: Rc<Bytecode>) -> VmResult<Value> {
        self.vm.execute(bytecode)
    }

    /// Call a function value with an explicit `this` and arguments.
    pub fn call_function(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> VmResult<Value> {
        self.vm.call_function(callee, this, args)
    }

    /// The context's global object.
    pub fn global_object(&self) -> GcRef<JsObject> {
        self.globals
    }

    /// The heap this context allocates from.
    pub fn heap(&self) -> &Rc<Heap> {
        &self.heap
    }

    /// The runtime's intern table.
    pub fn interner(&self) -> &Rc<StringTable> {
        &self.interner
    }

    /// The VM state.
    pub fn state(&self) -> VmState {
        self.vm.state()
    }

    /// The recorded VM failure message, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.vm.error_message()
    }

    /// Clear a terminal VM error, returning the VM to `Ready`.
    pub fn clear_error(&mut self) {
        self.vm.reset();
    }

    /// The interrupt flag checked at the top of dispatch.
    pub fn interrupt_flag(&self) -> Rc<Cell<bool>> {
        self.vm.interrupt_flag()
    }

    /// Force a full collection with the VM's roots.
    pub fn gc(&self) {
        self.vm.collect_garbage(true);
    }

    /// Live heap bytes.
    pub fn memory_usage(&self) -> usize {
        self.heap.live_bytes()
    }

    /// Bind a native function as a global.
    pub fn define_global_function(&self, name: &str, func: NativeFn) -> VmResult<()> {
        let key = self.interner.intern(name)?;
        let function = self
            .heap
            .alloc(JsFunction::native(Some(key), func))?;
        self.globals.set_property(key, Value::Function(function));
        Ok(())
    }

    /// Read a global by name.
    pub fn get_global(&self, name: &str) -> VmResult<Option<Value>> {
        let key = self.interner.intern(name)?;
        Ok(self.globals.get(key))
    }

    /// Write a global by name.
    pub fn set_global(&self, name: &str, value: Value) -> VmResult<()> {
        let key = self.interner.intern(name)?;
        self.globals.set_property(key, value);
        Ok(())
    }
}

impl Drop for VmContext {
    fn drop(&mut self) {
        self.heap.remove_root(self.globals.header_ptr());
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("state", &self.vm.state())
            .finish()
    }
}
