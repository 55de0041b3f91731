use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{EvalError, EvalResult};
use crate::interpreter::{Frame, HostModules, Interpreter};
use crate::lowering::lower_module;
use crate::namespace::NamespaceTree;
use crate::scope::ScopeBuilder;
use crate::value::{ObjectMap, Value};

fn run(source: &str) -> EvalResult<Value> {
    Interpreter::default().run_script(source, &Frame::root(None))
}

fn run_string(source: &str) -> String {
    run(source).unwrap().display_string()
}

#[test]
fn test_arithmetic_and_templates() {
    assert_eq!(run_string("const a = 2; let b = 3; b += a * 4; `${a}-${b}`"), "2-11");
    assert_eq!(run_string("'1' + 2"), "12");
    assert_eq!(run_string("10 % 4 === 2 && 2 ** 3 === 8"), "true");
}

#[test]
fn test_closures_capture_their_environment() {
    let source = "
        function counter() {
            let n = 0;
            return () => ++n;
        }
        const c = counter();
        c(); c();
        c()
    ";
    assert_eq!(run(source).unwrap().to_number(), 3.0);
}

#[test]
fn test_function_declarations_are_hoisted() {
    assert_eq!(run_string("twice(4); function twice(x) { return x * 2; }"), "8");
}

#[test]
fn test_destructuring_with_defaults_and_rest() {
    let source = "
        const { a, b: [x, y = 5], ...rest } = { a: 1, b: [2], c: 3, d: 4 };
        a + x + y + Object.keys(rest).length
    ";
    assert_eq!(run(source).unwrap().to_number(), 10.0);
}

#[test]
fn test_spread_and_array_methods() {
    let source = "
        const xs = [3, 1, 2];
        [...xs, 4].map((x) => x * 2).filter((x) => x > 2).join(',')
    ";
    assert_eq!(run_string(source), "6,4,8");
    assert_eq!(run_string("[3, 1, 2].sort((a, b) => a - b).join('')"), "123");
    assert_eq!(run_string("[1, 2, 3].reduce((sum, x) => sum + x, 0)"), "6");
}

#[test]
fn test_optional_chaining_and_nullish() {
    let source = "
        const o = { a: null };
        o.a?.b === undefined && o.missing?.() === undefined && (o.a ?? 'd') === 'd'
    ";
    assert_eq!(run_string(source), "true");
}

#[test]
fn test_loop_bindings_are_per_iteration() {
    let source = "
        const fns = [];
        for (let i = 0; i < 3; i++) {
            fns.push(() => i);
        }
        fns.map((f) => f()).join('')
    ";
    assert_eq!(run_string(source), "012");
}

#[test]
fn test_for_of_and_for_in() {
    let source = "
        let out = '';
        for (const [k, v] of Object.entries({ a: 1, b: 2 })) { out += k + v; }
        for (const key in { x: 0, y: 0 }) { out += key; }
        out
    ";
    assert_eq!(run_string(source), "a1b2xy");
}

#[test]
fn test_break_and_continue() {
    let source = "
        let total = 0;
        let i = 0;
        while (true) {
            i++;
            if (i > 10) break;
            if (i % 2) continue;
            total += i;
        }
        total
    ";
    assert_eq!(run(source).unwrap().to_number(), 30.0);
}

#[test]
fn test_try_catch_binds_thrown_values() {
    assert_eq!(
        run_string("try { throw new Error('boom'); } catch (e) { e.message }"),
        "boom"
    );
    assert_eq!(
        run_string("let seen; try { null.x; } catch (e) { seen = e.name; } seen"),
        "TypeError"
    );
    assert_eq!(
        run_string("let log = ''; try { log += 'a'; } finally { log += 'b'; } log"),
        "ab"
    );
}

#[test]
fn test_uncaught_throw_is_an_error() {
    let err = run("throw 'nope';").unwrap_err();
    assert!(matches!(err, EvalError::Thrown(Value::String(_))));
}

#[test]
fn test_const_cannot_be_reassigned() {
    assert!(matches!(run("const a = 1; a = 2;"), Err(EvalError::Type(_))));
}

#[test]
fn test_unknown_identifier_is_a_reference_error() {
    match run("missing + 1") {
        Err(EvalError::Reference { name }) => assert_eq!(name, "missing"),
        other => panic!("expected a reference error, got {:?}", other.map(|v| v.display_string())),
    }
}

#[test]
fn test_completion_directive_returns_last_expression() {
    let source = "
        const f = function () { 'use completion'; const x = 2; x * 21 };
        const g = function () { const x = 2; x * 21 };
        [f(), g()]
    ";
    assert_eq!(run_string(source), "42,");
}

#[test]
fn test_direct_eval_sees_local_bindings() {
    assert_eq!(run_string("const x = 5; eval('x * 2')"), "10");
    assert_eq!(run_string("eval(7)"), "7");
}

#[test]
fn test_call_depth_is_limited() {
    let interp = Interpreter::new(32, HostModules::new());
    let err = interp
        .run_script("function f(n) { return f(n + 1); } f(0)", &Frame::root(None))
        .unwrap_err();
    assert!(matches!(err, EvalError::Range(_)));
}

#[test]
fn test_standard_globals() {
    assert_eq!(run_string("Math.max(1, 5, 3) + Math.floor(2.7)"), "7");
    assert_eq!(run_string("JSON.stringify({ a: [1, 'x', true] })"), r#"{"a":[1,"x",true]}"#);
    assert_eq!(run_string("parseInt('42px') + Number('1.5')"), "43.5");
    assert_eq!(run_string("typeof undefinedThing"), "undefined");
}

#[test]
fn test_unsupported_constructs_are_reported() {
    assert!(matches!(run("switch (1) {}"), Err(EvalError::Unsupported(_))));
}

#[test]
fn test_module_imports_resolve_against_host_modules() {
    let mut exports = ObjectMap::new();
    exports.insert("answer".to_string(), Value::Number(42.0));
    let mut modules = HostModules::new();
    modules.register("host:values", exports);

    let interp = Interpreter::new(64, modules);
    let module = lower_module("import { answer } from 'host:values';\nexport default answer + 1;").unwrap();
    let tree = Rc::new(RefCell::new(NamespaceTree::new()));
    let scope = Rc::new(ScopeBuilder::new(tree).build("Global"));
    let value = interp.run_module(&module, scope).unwrap();
    assert_eq!(value.to_number(), 43.0);
}

#[test]
fn test_native_stack_use_is_limited() {
    // The depth limit alone would allow this; the stack budget stops it first
    let interp = Interpreter::new(1_000_000, HostModules::new());
    let err = interp
        .run_script("const f = (n) => n === 0 ? 0 : f(n - 1); f(100000)", &Frame::root(None))
        .unwrap_err();
    assert!(matches!(err, EvalError::Range(_)));

    // A failed run leaves nothing behind for the next one
    let value = interp
        .run_script("const g = (n) => n === 0 ? 'done' : g(n - 1); g(10)", &Frame::root(None))
        .unwrap();
    assert_eq!(value.display_string(), "done");
}

#[test]
fn test_stack_budget_is_configurable() {
    let interp = Interpreter::new(1_000_000, HostModules::new()).with_stack_budget(0);
    let source = "function f() { return 1; } function g() { return f(); } g()";
    assert!(matches!(interp.run_script(source, &Frame::root(None)), Err(EvalError::Range(_))));
}

#[test]
fn test_string_growth_is_capped() {
    assert!(matches!(run("'ab'.repeat(1e19)"), Err(EvalError::Range(_))));
    assert!(matches!(run("'x'.padStart(1e12)"), Err(EvalError::Range(_))));
    assert!(matches!(run("'x'.padEnd(1e12, '-')"), Err(EvalError::Range(_))));
    assert_eq!(run_string("'ab'.repeat(3)"), "ababab");
    assert_eq!(run_string("'7'.padStart(3, '0')"), "007");
    assert_eq!(run_string("''.repeat(1e19)"), "");

    let doubling = "let s = 'x'; while (true) { s = s + s; }";
    assert!(matches!(run(doubling), Err(EvalError::Range(_))));
    // The length error is catchable like any other
    assert_eq!(
        run_string("let s = 'x'; try { while (true) { s = `${s}${s}`; } } catch (e) { e.name }"),
        "RangeError"
    );
}

#[test]
fn test_array_growth_is_capped() {
    let huge_index = "const a = []; a['18446744073709551615'] = 1;";
    assert!(matches!(run(huge_index), Err(EvalError::Type(_))));
    assert!(matches!(run("const a = []; a[4294967295] = 1;"), Err(EvalError::Type(_))));
    assert!(matches!(run("const a = []; a[4294967294] = 1;"), Err(EvalError::Range(_))));
    assert!(matches!(run("const a = []; a.length = 1e12;"), Err(EvalError::Range(_))));
    assert!(matches!(run("const a = []; a.length = -1;"), Err(EvalError::Range(_))));
    assert_eq!(run_string("const a = []; a[3] = 'x'; a.length"), "4");
}
