//! The runtime
//!
//! A runtime owns a heap and an intern table; contexts are created from
//! it and share both. Runtimes are independent: crossing runtimes with
//! heap references is forbidden.

use std::cell::Cell;
use std::rc::Rc;

use mink_gc::{GcConfig, Heap};

use crate::context::VmContext;
use crate::error::VmResult;
use crate::string::StringTable;
use crate::value::JsSymbol;

/// Runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Heap configuration
    pub gc: GcConfig,
}

/// A runtime: the shared heap and intern table behind one or more
/// contexts.
pub struct VmRuntime {
    heap: Rc<Heap>,
    interner: Rc<StringTable>,
    config: RuntimeConfig,
    symbol_counter: Cell<u64>,
}

impl VmRuntime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with a custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let heap = Rc::new(Heap::with_config(config.gc.clone()));
        let interner = Rc::new(StringTable::new(Rc::clone(&heap)));
        Self {
            heap,
            interner,
            config,
            symbol_counter: Cell::new(0),
        }
    }

    /// Create an execution context with a fresh global object
    pub fn create_context(&self) -> VmResult<VmContext> {
        VmContext::new(Rc::clone(&self.heap), Rc::clone(&self.interner))
    }

    /// The runtime's heap
    pub fn heap(&self) -> &Rc<Heap> {
        &self.heap
    }

    /// The runtime's intern table
    pub fn interner(&self) -> &Rc<StringTable> {
        &self.interner
    }

    /// The runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Mint a fresh symbol payload with a runtime-unique identity
    pub fn new_symbol(&self, description: Option<&str>) -> JsSymbol {
        let id = self.symbol_counter.get();
        self.symbol_counter.set(id + 1);
        JsSymbol {
            description: description.map(Into::into),
            id,
        }
    }
}

impl Default for VmRuntime {
    fn default() -> Self {
        Self::new()
    }
}
