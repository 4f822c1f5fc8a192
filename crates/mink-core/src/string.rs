//! Heap strings and the intern table
//!
//! Strings are immutable. Names (identifiers, property keys) are
//! interned through the per-runtime [`StringTable`] so equal names share
//! one allocation and compare by identity; derived strings (concat
//! results) may stay unique.

use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHasher};

use mink_gc::{GcHeader, GcRef, GcTraceable, Heap, tags};

use crate::error::VmResult;

/// An immutable heap string with a precomputed hash.
pub struct JsString {
    data: Box<str>,
    hash: u64,
}

impl JsString {
    /// Create a string value (not interned)
    pub fn new(s: impl Into<Box<str>>) -> Self {
        let data: Box<str> = s.into();
        let hash = Self::compute_hash(&data);
        Self { data, hash }
    }

    /// Get the string as a slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the string is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Precomputed content hash
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub(crate) fn compute_hash(s: &str) -> u64 {
        let mut hasher = FxHasher::default();
        s.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for JsString {}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsString({:?})", self.data)
    }
}

impl std::fmt::Display for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.data
    }
}

impl GcTraceable for JsString {
    const NEEDS_TRACE: bool = false;
    const TAG: u8 = tags::STRING;

    fn trace(&self, _tracer: &mut dyn FnMut(*const GcHeader)) {
        // Strings hold no references to other GC objects
    }

    fn heap_size_hint(&self) -> usize {
        self.data.len()
    }
}

/// Per-runtime string intern table.
///
/// Keyed by content hash with a collision bucket. Interned strings are
/// pinned as heap roots: they live for the runtime's lifetime and are
/// identity-comparable.
pub struct StringTable {
    heap: Rc<Heap>,
    table: RefCell<FxHashMap<u64, Vec<GcRef<JsString>>>>,
}

impl StringTable {
    /// Create an intern table allocating from `heap`
    pub fn new(heap: Rc<Heap>) -> Self {
        Self {
            heap,
            table: RefCell::new(FxHashMap::default()),
        }
    }

    /// Intern `s`, returning the canonical allocation for its content.
    pub fn intern(&self, s: &str) -> VmResult<GcRef<JsString>> {
        let hash = JsString::compute_hash(s);
        if let Some(bucket) = self.table.borrow().get(&hash) {
            for &existing in bucket {
                if existing.as_str() == s {
                    return Ok(existing);
                }
            }
        }

        let string = self.heap.alloc(JsString::new(s))?;
        // Interned strings live for the runtime's lifetime
        self.heap.add_root(string.header_ptr());
        self.table.borrow_mut().entry(hash).or_default().push(string);
        Ok(string)
    }

    /// Whether `s` is already interned
    pub fn is_interned(&self, s: &str) -> bool {
        let hash = JsString::compute_hash(s);
        self.table
            .borrow()
            .get(&hash)
            .is_some_and(|bucket| bucket.iter().any(|e| e.as_str() == s))
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.table.borrow().values().map(Vec::len).sum()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }
}
