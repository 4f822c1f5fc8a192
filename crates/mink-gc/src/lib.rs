//! # Mink Garbage Collector
//!
//! Tri-color mark-sweep collector with two generations.
//!
//! ## Design
//!
//! - **Header-prefixed allocation**: every object is a `GcBox<T>` whose
//!   first field is a [`GcHeader`] carrying mark color, type tag,
//!   generation and age
//! - **Tri-color marking**: white/gray/black with an explicit gray worklist
//! - **Two generations**: new objects enter the young list and are promoted
//!   to the old list after surviving enough cycles; minor collections sweep
//!   only the young list, seeded by a remembered set
//! - **Write barriers**: Dijkstra insertion barriers keep the strong
//!   tri-color invariant during incremental marking and card-mark
//!   old-to-young stores
//! - **Weak references**: untraced target slots cleared during sweep, with
//!   one-shot callbacks

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod barrier;
pub mod heap;
pub mod object;
pub mod weak_ref;

pub use barrier::{GcPhase, WriteBarrier};
pub use heap::{AllocError, GcConfig, GcRef, GcTraceable, Heap, HeapStats};
pub use object::{GcHeader, Generation, MarkColor, tags};
pub use weak_ref::WeakRef;
