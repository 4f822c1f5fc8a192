//! Weak references
//!
//! A weak reference holds a raw pointer to a target's header without
//! tracing it, so the target can be collected when no strong references
//! remain. Dead targets are cleared during sweep and the reference's
//! callback, if any, is invoked exactly once.

use std::cell::Cell;
use std::rc::Rc;

use crate::object::GcHeader;

/// The shared target slot of a weak reference.
pub(crate) struct WeakSlot {
    /// Raw pointer to the target's header (NOT traced, hence weak)
    target: Cell<*const GcHeader>,
}

impl WeakSlot {
    pub(crate) fn new(target: *const GcHeader) -> Self {
        Self {
            target: Cell::new(target),
        }
    }

    pub(crate) fn target(&self) -> Option<*const GcHeader> {
        let ptr = self.target.get();
        if ptr.is_null() { None } else { Some(ptr) }
    }

    pub(crate) fn clear(&self) {
        self.target.set(std::ptr::null());
    }
}

/// A weak reference handle.
///
/// Obtained from [`Heap::new_weak_ref`](crate::Heap::new_weak_ref). After a
/// collection reclaims the target, [`WeakRef::target`] returns `None`.
#[derive(Clone)]
pub struct WeakRef {
    slot: Rc<WeakSlot>,
}

impl WeakRef {
    pub(crate) fn new(slot: Rc<WeakSlot>) -> Self {
        Self { slot }
    }

    /// Get the target header pointer, if the target is still alive
    pub fn target(&self) -> Option<*const GcHeader> {
        self.slot.target()
    }

    /// Check whether the target has been reclaimed
    pub fn is_cleared(&self) -> bool {
        self.slot.target().is_none()
    }
}

impl std::fmt::Debug for WeakRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRef")
            .field("cleared", &self.is_cleared())
            .finish()
    }
}

/// A registered weak reference with its one-shot callback.
pub(crate) struct WeakEntry {
    pub(crate) slot: Rc<WeakSlot>,
    /// Invoked exactly once when the target is reclaimed. Callbacks must be
    /// total; there is no error channel out of the sweep phase.
    pub(crate) callback: Option<Box<dyn FnMut()>>,
}
