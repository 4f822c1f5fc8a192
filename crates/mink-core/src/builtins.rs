//! Built-in native functions
//!
//! The VM consults an array-method object when a named property read on
//! an array misses `length` and the indices, which is how `a.push(1)`
//! resolves to a callable. A small set of globals (`print`) is installed
//! on every fresh context.

use std::rc::Rc;

use mink_gc::{GcRef, Heap};

use crate::array::JsArrayExt;
use crate::convert::value_to_string;
use crate::error::{VmError, VmResult};
use crate::function::{JsFunction, NativeContext, NativeFn};
use crate::object::{JsObject, JsObjectExt};
use crate::string::StringTable;
use crate::value::Value;

/// `Array.prototype.push`: append each argument, return the new length.
fn array_push(
    _ctx: &mut NativeContext<'_>,
    this: &Value,
    args: &[Value],
) -> VmResult<Value> {
    let Value::Array(array) = this else {
        return Err(VmError::type_error("push called on a non-array"));
    };
    let mut len = array.len();
    for &arg in args {
        len = array.push_element(arg);
    }
    Ok(Value::Number(len as f64))
}

/// `Array.prototype.pop`: remove and return the last element.
fn array_pop(
    _ctx: &mut NativeContext<'_>,
    this: &Value,
    _args: &[Value],
) -> VmResult<Value> {
    let Value::Array(array) = this else {
        return Err(VmError::type_error("pop called on a non-array"));
    };
    Ok(array.pop())
}

/// `print(...)`: write the arguments to stdout, space-separated.
fn print(
    _ctx: &mut NativeContext<'_>,
    _this: &Value,
    args: &[Value],
) -> VmResult<Value> {
    let rendered: Vec<String> = args.iter().map(value_to_string).collect();
    println!("{}", rendered.join(" "));
    Ok(Value::Undefined)
}

fn native_value(
    heap: &Rc<Heap>,
    interner: &Rc<StringTable>,
    name: &str,
    func: NativeFn,
) -> VmResult<Value> {
    let name = interner.intern(name)?;
    Ok(Value::Function(
        heap.alloc(JsFunction::native(Some(name), func))?,
    ))
}

/// Build the object holding the array methods.
pub fn make_array_methods(
    heap: &Rc<Heap>,
    interner: &Rc<StringTable>,
) -> VmResult<GcRef<JsObject>> {
    let methods = heap.alloc(JsObject::new(Rc::clone(heap.barrier())))?;
    for (name, func) in [("push", array_push as NativeFn), ("pop", array_pop)] {
        let key = interner.intern(name)?;
        methods.set_property(key, native_value(heap, interner, name, func)?);
    }
    Ok(methods)
}

/// Install the default globals on a fresh context's global object.
pub fn install_globals(
    heap: &Rc<Heap>,
    interner: &Rc<StringTable>,
    globals: GcRef<JsObject>,
) -> VmResult<()> {
    let key = interner.intern("print")?;
    globals.set_property(key, native_value(heap, interner, "print", print)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::JsArray;

    fn fixture() -> (Rc<Heap>, Rc<StringTable>) {
        let heap = Rc::new(Heap::new());
        let interner = Rc::new(StringTable::new(Rc::clone(&heap)));
        (heap, interner)
    }

    #[test]
    fn test_array_push_returns_new_length() {
        let (heap, interner) = fixture();
        let globals = heap
            .alloc(JsObject::new(Rc::clone(heap.barrier())))
            .unwrap();
        let array = heap
            .alloc(JsArray::new(Rc::clone(heap.barrier())))
            .unwrap();

        let mut ctx = NativeContext {
            heap: &heap,
            interner: &interner,
            globals,
        };
        let result = array_push(
            &mut ctx,
            &Value::Array(array),
            &[Value::Number(1.0), Value::Number(2.0)],
        )
        .unwrap();
        assert_eq!(result, Value::Number(2.0));
        assert_eq!(array.len(), 2);

        let popped = array_pop(&mut ctx, &Value::Array(array), &[]).unwrap();
        assert_eq!(popped, Value::Number(2.0));
    }

    #[test]
    fn test_array_methods_on_non_array_is_type_error() {
        let (heap, interner) = fixture();
        let globals = heap
            .alloc(JsObject::new(Rc::clone(heap.barrier())))
            .unwrap();
        let mut ctx = NativeContext {
            heap: &heap,
            interner: &interner,
            globals,
        };
        let err = array_push(&mut ctx, &Value::Number(1.0), &[]).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_make_array_methods_exposes_push_and_pop() {
        let (heap, interner) = fixture();
        let methods = make_array_methods(&heap, &interner).unwrap();
        let push = methods.get(interner.intern("push").unwrap()).unwrap();
        assert!(push.is_function());
        let pop = methods.get(interner.intern("pop").unwrap()).unwrap();
        assert!(pop.is_function());
    }
}
