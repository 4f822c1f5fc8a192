//! Objects
//!
//! A property-bearing object: an insertion-ordered property sequence,
//! a nullable prototype link for delegation lookup, and an `extensible`
//! flag. Mutation goes through [`JsObjectExt`] on the GC handle so the
//! write barrier sees every reference store.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mink_gc::{GcHeader, GcRef, GcTraceable, WriteBarrier, tags};

use crate::string::JsString;
use crate::value::Value;

/// One property: key, value and the three boolean descriptors.
pub struct Property {
    /// Interned key
    pub key: GcRef<JsString>,
    /// Current value
    pub value: Value,
    /// Whether the value may change
    pub writable: bool,
    /// Whether the property shows up in iteration
    pub enumerable: bool,
    /// Whether the property may be redefined or deleted
    pub configurable: bool,
}

impl Property {
    /// A plain data property (writable, enumerable, configurable)
    pub fn data(key: GcRef<JsString>, value: Value) -> Self {
        Self {
            key,
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }
}

/// A heap object.
pub struct JsObject {
    /// Insertion-ordered; keys are unique within the sequence
    properties: RefCell<Vec<Property>>,
    prototype: Cell<Option<GcRef<JsObject>>>,
    extensible: Cell<bool>,
    barrier: Rc<WriteBarrier>,
}

impl JsObject {
    /// Create an empty extensible object with no prototype
    pub fn new(barrier: Rc<WriteBarrier>) -> Self {
        Self {
            properties: RefCell::new(Vec::new()),
            prototype: Cell::new(None),
            extensible: Cell::new(true),
            barrier,
        }
    }

    /// Create an empty object delegating to `prototype`
    pub fn with_prototype(barrier: Rc<WriteBarrier>, prototype: GcRef<JsObject>) -> Self {
        let obj = Self::new(barrier);
        obj.prototype.set(Some(prototype));
        obj
    }

    fn position(&self, key: GcRef<JsString>) -> Option<usize> {
        self.properties.borrow().iter().position(|p| {
            GcRef::ptr_eq(p.key, key)
                || (p.key.hash_value() == key.hash_value() && p.key.as_str() == key.as_str())
        })
    }

    /// Get an own property's value
    pub fn get_own(&self, key: GcRef<JsString>) -> Option<Value> {
        self.position(key)
            .map(|i| self.properties.borrow()[i].value)
    }

    /// Get a property, walking the prototype chain on a miss
    pub fn get(&self, key: GcRef<JsString>) -> Option<Value> {
        if let Some(value) = self.get_own(key) {
            return Some(value);
        }
        let mut proto = self.prototype.get();
        while let Some(object) = proto {
            if let Some(value) = object.get_own(key) {
                return Some(value);
            }
            proto = object.prototype.get();
        }
        None
    }

    /// Whether an own property exists
    pub fn has_own(&self, key: GcRef<JsString>) -> bool {
        self.position(key).is_some()
    }

    /// Whether the property exists here or along the prototype chain
    pub fn has(&self, key: GcRef<JsString>) -> bool {
        self.get(key).is_some()
    }

    /// Own property keys in insertion order
    pub fn own_keys(&self) -> Vec<GcRef<JsString>> {
        self.properties.borrow().iter().map(|p| p.key).collect()
    }

    /// Own enumerable keys in insertion order
    pub fn enumerable_keys(&self) -> Vec<GcRef<JsString>> {
        self.properties
            .borrow()
            .iter()
            .filter(|p| p.enumerable)
            .map(|p| p.key)
            .collect()
    }

    /// Number of own properties
    pub fn property_count(&self) -> usize {
        self.properties.borrow().len()
    }

    /// The prototype link
    pub fn prototype(&self) -> Option<GcRef<JsObject>> {
        self.prototype.get()
    }

    /// Whether new properties may be added
    pub fn is_extensible(&self) -> bool {
        self.extensible.get()
    }

    /// Forbid adding new properties
    pub fn prevent_extensions(&self) {
        self.extensible.set(false);
    }

    /// Set without barrier bookkeeping; prefer [`JsObjectExt::set_property`].
    ///
    /// Returns false when the write is refused (non-writable property, or
    /// a new property on a non-extensible object).
    pub(crate) fn set_raw(&self, key: GcRef<JsString>, value: Value) -> bool {
        if let Some(i) = self.position(key) {
            let mut properties = self.properties.borrow_mut();
            if !properties[i].writable {
                return false;
            }
            properties[i].value = value;
            return true;
        }
        if !self.extensible.get() {
            return false;
        }
        self.properties
            .borrow_mut()
            .push(Property::data(key, value));
        true
    }

    /// Define without barrier bookkeeping; prefer
    /// [`JsObjectExt::define_property`].
    ///
    /// Returns false when an existing property is non-configurable or a
    /// new property would be added to a non-extensible object.
    pub(crate) fn define_raw(&self, property: Property) -> bool {
        if let Some(i) = self.position(property.key) {
            let mut properties = self.properties.borrow_mut();
            if !properties[i].configurable {
                return false;
            }
            properties[i] = property;
            return true;
        }
        if !self.extensible.get() {
            return false;
        }
        self.properties.borrow_mut().push(property);
        true
    }

    /// Delete an own property. Returns false when it exists but is
    /// non-configurable; true otherwise (including absent keys).
    pub fn delete(&self, key: GcRef<JsString>) -> bool {
        if let Some(i) = self.position(key) {
            let mut properties = self.properties.borrow_mut();
            if !properties[i].configurable {
                return false;
            }
            properties.remove(i);
        }
        true
    }

    pub(crate) fn barrier(&self) -> &Rc<WriteBarrier> {
        &self.barrier
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject")
            .field("properties", &self.property_count())
            .field("extensible", &self.extensible.get())
            .finish()
    }
}

impl GcTraceable for JsObject {
    const NEEDS_TRACE: bool = true;
    const TAG: u8 = tags::OBJECT;

    fn trace(&self, tracer: &mut dyn FnMut(*const GcHeader)) {
        for property in self.properties.borrow().iter() {
            tracer(property.key.header_ptr());
            property.value.trace(tracer);
        }
        if let Some(proto) = self.prototype.get() {
            tracer(proto.header_ptr());
        }
    }
}

/// Barrier-aware mutation, implemented on the GC handle (the handle
/// knows its own header; the object does not).
pub trait JsObjectExt {
    /// Set a property, honoring `writable` and `extensible`.
    fn set_property(&self, key: GcRef<JsString>, value: Value) -> bool;

    /// Define or redefine a property, honoring `configurable` and
    /// `extensible`.
    fn define_property(&self, property: Property) -> bool;

    /// Replace the prototype link.
    fn set_prototype(&self, prototype: Option<GcRef<JsObject>>);
}

impl JsObjectExt for GcRef<JsObject> {
    fn set_property(&self, key: GcRef<JsString>, value: Value) -> bool {
        let ok = self.set_raw(key, value);
        if ok {
            // SAFETY: both this object and any value target are live
            unsafe {
                let barrier = self.barrier();
                barrier.record_store(self.header_ptr(), key.header_ptr());
                if let Some(child) = value.gc_header() {
                    barrier.record_store(self.header_ptr(), child);
                }
            }
        }
        ok
    }

    fn define_property(&self, property: Property) -> bool {
        let key = property.key;
        let value = property.value;
        let ok = self.define_raw(property);
        if ok {
            // SAFETY: both this object and any value target are live
            unsafe {
                let barrier = self.barrier();
                barrier.record_store(self.header_ptr(), key.header_ptr());
                if let Some(child) = value.gc_header() {
                    barrier.record_store(self.header_ptr(), child);
                }
            }
        }
        ok
    }

    fn set_prototype(&self, prototype: Option<GcRef<JsObject>>) {
        self.prototype.set(prototype);
        if let Some(proto) = prototype {
            // SAFETY: both objects are live
            unsafe {
                self.barrier()
                    .record_store(self.header_ptr(), proto.header_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mink_gc::Heap;

    struct Fixture {
        heap: Rc<Heap>,
        interner: crate::string::StringTable,
    }

    impl Fixture {
        fn new() -> Self {
            let heap = Rc::new(Heap::new());
            let interner = crate::string::StringTable::new(Rc::clone(&heap));
            Self { heap, interner }
        }

        fn object(&self) -> GcRef<JsObject> {
            self.heap
                .alloc(JsObject::new(Rc::clone(self.heap.barrier())))
                .unwrap()
        }

        fn key(&self, s: &str) -> GcRef<JsString> {
            self.interner.intern(s).unwrap()
        }
    }

    #[test]
    fn test_get_set() {
        let fx = Fixture::new();
        let obj = fx.object();
        let key = fx.key("foo");

        assert!(obj.set_property(key, Value::Number(42.0)));
        assert_eq!(obj.get(key), Some(Value::Number(42.0)));
        assert!(obj.get(fx.key("bar")).is_none());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let fx = Fixture::new();
        let obj = fx.object();
        for name in ["c", "a", "b"] {
            obj.set_property(fx.key(name), Value::Null);
        }
        let keys: Vec<String> = obj.own_keys().iter().map(|k| k.as_str().into()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_keys_are_unique() {
        let fx = Fixture::new();
        let obj = fx.object();
        let key = fx.key("x");
        obj.set_property(key, Value::Number(1.0));
        obj.set_property(key, Value::Number(2.0));
        assert_eq!(obj.property_count(), 1);
        assert_eq!(obj.get(key), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_prototype_delegation() {
        let fx = Fixture::new();
        let proto = fx.object();
        let obj = fx.object();
        obj.set_prototype(Some(proto));

        let key = fx.key("inherited");
        proto.set_property(key, Value::Boolean(true));

        assert_eq!(obj.get(key), Some(Value::Boolean(true)));
        assert!(!obj.has_own(key));
        assert!(obj.has(key));
    }

    #[test]
    fn test_non_writable_refuses_set() {
        let fx = Fixture::new();
        let obj = fx.object();
        let key = fx.key("ro");
        obj.define_property(Property {
            key,
            value: Value::Number(1.0),
            writable: false,
            enumerable: true,
            configurable: true,
        });

        assert!(!obj.set_property(key, Value::Number(2.0)));
        assert_eq!(obj.get(key), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_non_extensible_refuses_new_properties() {
        let fx = Fixture::new();
        let obj = fx.object();
        let existing = fx.key("existing");
        obj.set_property(existing, Value::Number(1.0));
        obj.prevent_extensions();

        assert!(!obj.set_property(fx.key("new"), Value::Number(2.0)));
        // Existing writable properties still update
        assert!(obj.set_property(existing, Value::Number(3.0)));
    }

    #[test]
    fn test_non_configurable_refuses_delete_and_redefine() {
        let fx = Fixture::new();
        let obj = fx.object();
        let key = fx.key("locked");
        obj.define_property(Property {
            key,
            value: Value::Null,
            writable: true,
            enumerable: true,
            configurable: false,
        });

        assert!(!obj.delete(key));
        assert!(!obj.define_property(Property::data(key, Value::Boolean(true))));
        assert!(obj.has_own(key));
    }

    #[test]
    fn test_delete() {
        let fx = Fixture::new();
        let obj = fx.object();
        let key = fx.key("gone");
        obj.set_property(key, Value::Number(1.0));

        assert!(obj.delete(key));
        assert!(!obj.has_own(key));
        // Deleting an absent key succeeds
        assert!(obj.delete(key));
    }

    #[test]
    fn test_cyclic_objects_are_collected() {
        let fx = Fixture::new();
        let a = fx.object();
        let b = fx.object();
        let key = fx.key("other");
        a.set_property(key, Value::Object(b));
        b.set_property(key, Value::Object(a));

        let objects_before = fx.heap.live_objects();
        fx.heap.collect(&[]);
        // Both objects reclaimed; interned keys survive as roots
        assert_eq!(fx.heap.live_objects(), objects_before - 2);
    }
}
