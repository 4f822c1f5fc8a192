//! End-to-end evaluation tests: source text in, values out.

use mink_engine::{ErrorKind, Runtime, Value};

fn eval(source: &str) -> Value {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    ctx.evaluate(source, "<test>").unwrap()
}

fn eval_number(source: &str) -> f64 {
    eval(source).as_number().expect("expected a number")
}

fn eval_string(source: &str) -> String {
    eval(source)
        .as_string()
        .expect("expected a string")
        .as_str()
        .to_string()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval_number("2 + 3 * 4;"), 14.0);
    assert_eq!(eval_number("(2 + 3) * 4;"), 20.0);
    assert_eq!(eval_number("10 % 3;"), 1.0);
    assert_eq!(eval_number("2 - -3;"), 5.0);
}

#[test]
fn variables_and_memory_usage() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    let value = ctx
        .evaluate("var x = 1; var y = 2; x + y;", "<test>")
        .unwrap();
    assert_eq!(value, Value::Number(3.0));
    assert!(ctx.memory_usage() > 0);
}

#[test]
fn array_push_and_length() {
    assert_eq!(
        eval_number("var a = []; a.push(1); a.push(2); a.length;"),
        2.0
    );
    assert_eq!(eval_number("var a = []; a.push(1); a.push(2); a[0];"), 1.0);
    assert_eq!(eval_number("var a = []; a.push(1); a.push(2); a[1];"), 2.0);
    assert_eq!(eval_number("var a = [7, 8, 9]; a.pop();"), 9.0);
}

#[test]
fn typeof_results() {
    assert_eq!(eval_string("typeof null;"), "object");
    assert_eq!(eval_string("typeof 1;"), "number");
    assert_eq!(eval_string("typeof undefined;"), "undefined");
    assert_eq!(eval_string("typeof 'hi';"), "string");
    assert_eq!(eval_string("typeof true;"), "boolean");
    assert_eq!(eval_string("function f() {} typeof f;"), "function");
    assert_eq!(eval_string("typeof {};"), "object");
}

#[test]
fn typeof_fixpoint() {
    assert_eq!(eval_string("typeof typeof 1;"), "string");
    assert_eq!(eval("typeof typeof 1 === 'string';"), Value::Boolean(true));
}

#[test]
fn if_else_completion_value() {
    assert_eq!(eval_number("if (1 < 2) { 10; } else { 20; }"), 10.0);
    assert_eq!(eval_number("if (1 > 2) { 10; } else { 20; }"), 20.0);
}

#[test]
fn object_properties() {
    assert_eq!(eval_number("var o = {}; o.x = 42; o.x;"), 42.0);
    assert_eq!(eval_number("var o = {}; o['x'] = 7; o.x;"), 7.0);
    assert_eq!(eval_number("var o = { a: 1, b: 2 }; o.a + o.b;"), 3.0);
    assert_eq!(eval("var o = {}; o.missing;"), Value::Undefined);
    assert_eq!(eval("var o = { x: 1 }; delete o.x; o.x;"), Value::Undefined);
}

#[test]
fn string_concatenation() {
    assert_eq!(eval_string("'foo' + 'bar';"), "foobar");
    assert_eq!(eval_string("'n = ' + 42;"), "n = 42");
    assert_eq!(eval_string("1 + '2';"), "12");
}

#[test]
fn while_loop() {
    assert_eq!(
        eval_number("var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } sum;"),
        10.0
    );
}

#[test]
fn for_loop_with_break_and_continue() {
    assert_eq!(
        eval_number(
            "var sum = 0;
             for (var i = 0; i < 10; i = i + 1) {
                 if (i == 3) { continue; }
                 if (i > 5) { break; }
                 sum = sum + i;
             }
             sum;"
        ),
        // 0 + 1 + 2 + 4 + 5
        12.0
    );
}

#[test]
fn functions_and_calls() {
    assert_eq!(
        eval_number("function add(a, b) { return a + b; } add(2, 3);"),
        5.0
    );
    assert_eq!(
        eval_number("var square = function(x) { return x * x; }; square(6);"),
        36.0
    );
    assert_eq!(
        eval_number(
            "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }
             fib(10);"
        ),
        55.0
    );
}

#[test]
fn closures_capture_their_scope() {
    assert_eq!(
        eval_number(
            "function outer() {
                 var hidden = 40;
                 function inner(n) { return hidden + n; }
                 return inner;
             }
             var f = outer();
             f(2);"
        ),
        42.0
    );
}

#[test]
fn update_and_compound_assignment() {
    assert_eq!(eval_number("var x = 1; x++; x;"), 2.0);
    assert_eq!(eval_number("var x = 1; x++;"), 1.0);
    assert_eq!(eval_number("var x = 1; ++x;"), 2.0);
    assert_eq!(eval_number("var x = 10; x -= 4; x;"), 6.0);
    assert_eq!(eval_number("var o = { n: 5 }; o.n += 2; o.n;"), 7.0);
    assert_eq!(eval_number("var o = { n: 5 }; o.n++; o.n;"), 6.0);
    assert_eq!(eval_number("var a = [1]; a[0] += 9; a[0];"), 10.0);
}

#[test]
fn logical_operators_short_circuit_and_keep_operand() {
    assert_eq!(eval_number("0 || 5;"), 5.0);
    assert_eq!(eval_number("3 || 5;"), 3.0);
    assert_eq!(eval_number("0 && 5;"), 0.0);
    assert_eq!(eval_number("3 && 5;"), 5.0);
    assert_eq!(eval_number("null ?? 7;"), 7.0);
    assert_eq!(eval_number("0 ?? 7;"), 0.0);
    // The right side must not run when short-circuited
    assert_eq!(
        eval_number("var called = 0; function f() { called = 1; return 2; } 1 || f(); called;"),
        0.0
    );
}

#[test]
fn conditional_expression() {
    assert_eq!(eval_number("1 < 2 ? 10 : 20;"), 10.0);
    assert_eq!(eval_string("'' ? 'yes' : 'no';"), "no");
}

#[test]
fn equality_is_strict() {
    assert_eq!(eval("1 == 1;"), Value::Boolean(true));
    assert_eq!(eval("1 == '1';"), Value::Boolean(false));
    assert_eq!(eval("1 === 1;"), Value::Boolean(true));
    assert_eq!(eval("null == undefined;"), Value::Boolean(false));
    assert_eq!(eval("'a' == 'a';"), Value::Boolean(true));
    assert_eq!(eval("var o = {}; o == o;"), Value::Boolean(true));
    assert_eq!(eval("({}) == ({});"), Value::Boolean(false));
}

#[test]
fn bitwise_operators() {
    assert_eq!(eval_number("6 & 3;"), 2.0);
    assert_eq!(eval_number("6 | 3;"), 7.0);
    assert_eq!(eval_number("6 ^ 3;"), 5.0);
    assert_eq!(eval_number("~0;"), -1.0);
    assert_eq!(eval_number("1 << 4;"), 16.0);
    assert_eq!(eval_number("-8 >> 1;"), -4.0);
    assert_eq!(eval_number("-1 >>> 28;"), 15.0);
    // Non-numeric operands coerce to 0
    assert_eq!(eval_number("undefined | 5;"), 5.0);
}

#[test]
fn division_boundaries() {
    assert_eq!(eval_number("1 / 0;"), f64::INFINITY);
    assert_eq!(eval_number("-1 / 0;"), f64::NEG_INFINITY);
    assert!(eval_number("0 / 0;").is_nan());
    assert!(eval_number("5 % 0;").is_nan());
}

#[test]
fn optional_chaining_and_nullish() {
    assert_eq!(eval("var o = null; o?.x;"), Value::Undefined);
    assert_eq!(eval_number("var o = { x: 3 }; o?.x;"), 3.0);
}

#[test]
fn empty_program_evaluates_to_undefined() {
    assert_eq!(eval(""), Value::Undefined);
    assert_eq!(eval(";"), Value::Undefined);
}

#[test]
fn syntax_error_kinds() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();

    let err = ctx.evaluate("1 = 2;", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);

    let err = ctx.evaluate("}", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);

    let err = ctx.evaluate("var x = 0xG;", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn runtime_error_state_and_clear() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();

    let err = ctx.evaluate("var x = 1; x();", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Reference);
    assert!(ctx.error_message().unwrap().contains("not a function"));

    // The context is stuck until the error is cleared
    assert!(ctx.evaluate("1;", "<test>").is_err());
    ctx.clear_error();
    assert_eq!(ctx.evaluate("1;", "<test>").unwrap(), Value::Number(1.0));
}

#[test]
fn type_error_on_non_object_property_write() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    let err = ctx.evaluate("var n = 1; n.x = 2;", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn negative_array_length_is_a_range_error() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    let err = ctx
        .evaluate("var a = []; a.length = -1;", "<test>")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn gc_reclaims_unrooted_objects_across_evaluations() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();

    // Allocate garbage with no surviving references
    ctx.evaluate(
        "var i = 0; while (i < 100) { var tmp = {}; tmp.self = tmp; i = i + 1; } i;",
        "<test>",
    )
    .unwrap();
    let before = ctx.memory_usage();
    ctx.gc();
    let after = ctx.memory_usage();
    assert!(after <= before);

    // Rooted state survives the collection
    ctx.evaluate("var keep = { x: 1 };", "<test>").unwrap();
    ctx.gc();
    assert_eq!(
        ctx.evaluate("keep.x;", "<test>").unwrap(),
        Value::Number(1.0)
    );
}

#[test]
fn cyclic_object_graphs_are_collected() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    ctx.evaluate("var a = {}; a.self = a; a = null;", "<test>")
        .unwrap();
    ctx.gc();
    // A second collection with no intervening mutation reclaims nothing
    let stats_before = runtime.heap_stats();
    ctx.gc();
    assert_eq!(runtime.heap_stats().last_reclaimed, 0);
    assert_eq!(runtime.heap_stats().live_bytes, stats_before.live_bytes);
}

#[test]
fn native_function_binding() {
    use mink_engine::{NativeContext, VmResult};

    fn double(
        _ctx: &mut NativeContext<'_>,
        _this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let n = args.first().and_then(Value::as_number).unwrap_or(f64::NAN);
        Ok(Value::Number(n * 2.0))
    }

    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    ctx.define_global_function("double", double).unwrap();
    assert_eq!(
        ctx.evaluate("double(21);", "<test>").unwrap(),
        Value::Number(42.0)
    );
}

#[test]
fn calling_script_functions_from_the_embedder() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    ctx.evaluate("function add(a, b) { return a + b; }", "<test>")
        .unwrap();
    let add = ctx.get_global("add").unwrap().expect("add is defined");
    let result = ctx
        .call_function(add, Value::Undefined, &[Value::Number(2.0), Value::Number(40.0)])
        .unwrap();
    assert_eq!(result, Value::Number(42.0));
}

#[test]
fn interrupt_flag_stops_runaway_loops() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    ctx.interrupt_flag().set(true);
    let err = ctx.evaluate("while (true) {}", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("interrupted"));
}

#[test]
fn deep_recursion_overflows_the_call_stack() {
    let runtime = Runtime::new();
    let mut ctx = runtime.new_context().unwrap();
    let err = ctx
        .evaluate("function f() { return f(); } f();", "<test>")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn number_formatting_round_trips() {
    assert_eq!(eval_string("'' + 0.1;"), "0.1");
    assert_eq!(eval_string("'' + 123456789;"), "123456789");
    assert_eq!(eval_string("'' + (0 / 0);"), "NaN");
    assert_eq!(eval_string("'' + (1 / 0);"), "Infinity");
}

#[test]
fn bigint_literals_carry_through() {
    assert_eq!(eval_string("typeof 1n;"), "object");
    assert_eq!(eval("1n == 1n;"), Value::Boolean(true));
}

#[test]
fn instanceof_and_in() {
    assert_eq!(
        eval("var o = { x: 1 }; 'x' in o;"),
        Value::Boolean(true)
    );
    assert_eq!(
        eval("var o = { x: 1 }; 'y' in o;"),
        Value::Boolean(false)
    );
    assert_eq!(
        eval("function F() {} ({}) instanceof F;"),
        Value::Boolean(false)
    );
}
