//! Write barriers and the remembered set
//!
//! The barrier state is shared (`Rc`) between the heap and every mutable
//! heap object, so reference stores can be recorded without objects
//! carrying a back-pointer to the heap itself.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashSet;

use crate::object::{GcHeader, Generation, MarkColor};

/// GC phase, used to decide whether insertion barriers are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    /// No collection in progress
    Idle,
    /// Incremental marking in progress; insertion barriers active
    Marking,
}

/// Shared write-barrier state.
///
/// Two jobs, both triggered on every reference-field store:
///
/// 1. **Generational card-marking**: a store of a young reference into an
///    old object records the old object in the remembered set, which minor
///    collections treat as additional roots.
/// 2. **Dijkstra insertion barrier**: while incremental marking is in
///    progress, storing a white reference into a black object re-grays the
///    stored child, preserving the strong tri-color invariant
///    (no black → white edge).
pub struct WriteBarrier {
    phase: Cell<GcPhase>,
    /// Objects grayed by the insertion barrier, drained into the mark
    /// worklist at each incremental step
    buffer: RefCell<Vec<*const GcHeader>>,
    /// Old objects known to reference young objects
    remembered: RefCell<FxHashSet<usize>>,
}

impl WriteBarrier {
    /// Create new barrier state in the idle phase
    pub fn new() -> Self {
        Self {
            phase: Cell::new(GcPhase::Idle),
            buffer: RefCell::new(Vec::new()),
            remembered: RefCell::new(FxHashSet::default()),
        }
    }

    /// Get the current GC phase
    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.phase.get()
    }

    pub(crate) fn set_phase(&self, phase: GcPhase) {
        self.phase.set(phase);
    }

    /// Record a store of `child` into a reference field of `parent`.
    ///
    /// Call this after every heap-reference store. Null `child` pointers
    /// are ignored (storing a primitive clears no invariant).
    ///
    /// # Safety
    /// Both non-null pointers must point to live `GcHeader`s.
    pub unsafe fn record_store(&self, parent: *const GcHeader, child: *const GcHeader) {
        if parent.is_null() || child.is_null() {
            return;
        }
        // SAFETY: caller guarantees both headers are live
        let parent_header = unsafe { &*parent };
        let child_header = unsafe { &*child };

        if parent_header.generation() == Generation::Old
            && child_header.generation() == Generation::Young
        {
            self.remembered.borrow_mut().insert(parent as usize);
        }

        if self.phase.get() == GcPhase::Marking
            && parent_header.mark() == MarkColor::Black
            && child_header.mark() == MarkColor::White
        {
            child_header.set_mark(MarkColor::Gray);
            self.buffer.borrow_mut().push(child);
        }
    }

    /// Drain the insertion-barrier buffer
    pub(crate) fn drain_buffer(&self) -> Vec<*const GcHeader> {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }

    /// Snapshot the remembered set
    pub(crate) fn remembered_roots(&self) -> Vec<*const GcHeader> {
        self.remembered
            .borrow()
            .iter()
            .map(|&addr| addr as *const GcHeader)
            .collect()
    }

    /// Clear the remembered set (after a full collection)
    pub(crate) fn clear_remembered(&self) {
        self.remembered.borrow_mut().clear();
    }

    /// Number of remembered-set entries
    pub fn remembered_len(&self) -> usize {
        self.remembered.borrow().len()
    }
}

impl Default for WriteBarrier {
    fn default() -> Self {
        Self::new()
    }
}
