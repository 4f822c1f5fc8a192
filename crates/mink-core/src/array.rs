//! Arrays
//!
//! A dense sequence of values. Length is directly settable: shrinking
//! truncates, growing fills with `undefined`. Indexed reads past the
//! length yield `undefined`.

use std::cell::RefCell;
use std::rc::Rc;

use mink_gc::{GcHeader, GcRef, GcTraceable, WriteBarrier, tags};

use crate::value::Value;

/// A heap array.
pub struct JsArray {
    elements: RefCell<Vec<Value>>,
    barrier: Rc<WriteBarrier>,
}

impl JsArray {
    /// Create an empty array
    pub fn new(barrier: Rc<WriteBarrier>) -> Self {
        Self {
            elements: RefCell::new(Vec::new()),
            barrier,
        }
    }

    /// Create an empty array with reserved capacity
    pub fn with_capacity(capacity: usize, barrier: Rc<WriteBarrier>) -> Self {
        Self {
            elements: RefCell::new(Vec::with_capacity(capacity)),
            barrier,
        }
    }

    /// Semantic length
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    /// Whether the array is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    /// Set the length directly: truncate or fill with `undefined`
    pub fn set_length(&self, length: usize) {
        self.elements.borrow_mut().resize(length, Value::Undefined);
    }

    /// Indexed read; out of range yields `undefined`
    pub fn get(&self, index: usize) -> Value {
        self.elements
            .borrow()
            .get(index)
            .copied()
            .unwrap_or(Value::Undefined)
    }

    /// Remove and return the last element (`undefined` when empty)
    pub fn pop(&self) -> Value {
        self.elements.borrow_mut().pop().unwrap_or(Value::Undefined)
    }

    pub(crate) fn barrier(&self) -> &Rc<WriteBarrier> {
        &self.barrier
    }
}

impl std::fmt::Debug for JsArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsArray").field("len", &self.len()).finish()
    }
}

impl GcTraceable for JsArray {
    const NEEDS_TRACE: bool = true;
    const TAG: u8 = tags::ARRAY;

    fn trace(&self, tracer: &mut dyn FnMut(*const GcHeader)) {
        for element in self.elements.borrow().iter() {
            element.trace(tracer);
        }
    }
}

/// Barrier-aware mutation on the GC handle.
pub trait JsArrayExt {
    /// Append a value; returns the new length
    fn push_element(&self, value: Value) -> usize;

    /// Indexed write; writing past the end grows the array, filling the
    /// gap with `undefined`
    fn set_element(&self, index: usize, value: Value);
}

impl JsArrayExt for GcRef<JsArray> {
    fn push_element(&self, value: Value) -> usize {
        let mut elements = self.elements.borrow_mut();
        elements.push(value);
        let len = elements.len();
        drop(elements);
        record_store(self, value);
        len
    }

    fn set_element(&self, index: usize, value: Value) {
        let mut elements = self.elements.borrow_mut();
        if index >= elements.len() {
            elements.resize(index + 1, Value::Undefined);
        }
        elements[index] = value;
        drop(elements);
        record_store(self, value);
    }
}

fn record_store(array: &GcRef<JsArray>, value: Value) {
    if let Some(child) = value.gc_header() {
        // SAFETY: both the array and the value target are live
        unsafe { array.barrier().record_store(array.header_ptr(), child) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mink_gc::Heap;

    fn array() -> (Rc<Heap>, GcRef<JsArray>) {
        let heap = Rc::new(Heap::new());
        let arr = heap
            .alloc(JsArray::new(Rc::clone(heap.barrier())))
            .unwrap();
        (heap, arr)
    }

    #[test]
    fn test_push_and_pop() {
        let (_heap, arr) = array();
        assert_eq!(arr.push_element(Value::Number(1.0)), 1);
        assert_eq!(arr.push_element(Value::Number(2.0)), 2);
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.pop(), Value::Number(2.0));
        assert_eq!(arr.pop(), Value::Number(1.0));
        assert_eq!(arr.pop(), Value::Undefined);
    }

    #[test]
    fn test_out_of_range_read_is_undefined() {
        let (_heap, arr) = array();
        arr.push_element(Value::Number(1.0));
        assert_eq!(arr.get(5), Value::Undefined);
    }

    #[test]
    fn test_set_past_end_grows_with_undefined() {
        let (_heap, arr) = array();
        arr.set_element(2, Value::Boolean(true));
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Value::Undefined);
        assert_eq!(arr.get(2), Value::Boolean(true));
    }

    #[test]
    fn test_set_length_truncates_and_grows() {
        let (_heap, arr) = array();
        for i in 0..5 {
            arr.push_element(Value::Number(i as f64));
        }
        arr.set_length(2);
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get(4), Value::Undefined);

        arr.set_length(4);
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.get(3), Value::Undefined);
        assert_eq!(arr.get(1), Value::Number(1.0));
    }

    #[test]
    fn test_elements_are_traced() {
        let (heap, arr) = array();
        heap.add_root(arr.header_ptr());
        let inner = heap
            .alloc(JsArray::new(Rc::clone(heap.barrier())))
            .unwrap();
        arr.push_element(Value::Array(inner));

        heap.collect(&[]);
        assert_eq!(heap.live_objects(), 2);
        assert_eq!(inner.len(), 0);
    }
}
