//! Tests for `Runtime::evaluate`: result values, bindings and language features.

use pretty_assertions::assert_eq;
use tether_vm::{CollectStringPrint, ExcType, Key, NoPrint, NoopTracer, RootModule, Runtime, RuntimeConfig, Value};

fn runtime() -> Runtime {
    Runtime::with_io(RuntimeConfig::default(), Box::new(NoPrint), Box::new(NoopTracer))
}

/// Evaluates `code`, panicking with the fault summary if it raised.
fn eval_ok(rt: &mut Runtime, code: &str) -> Value {
    let value = rt.evaluate(code);
    if let Some(fault) = rt.take_fault() {
        panic!("unexpected fault evaluating {code:?}: {fault}");
    }
    value
}

fn eval_repr(code: &str) -> String {
    let mut rt = runtime();
    let value = eval_ok(&mut rt, code);
    rt.repr(value)
}

// =============================================================================
// 1. Result value
// =============================================================================

#[test]
fn top_level_return_is_the_result() {
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, "return 1234"), Value::Int(1234));
}

#[test]
fn return_stops_evaluation_early() {
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, "x = 1\nreturn x\nx = 2"), Value::Int(1));
    let x = rt.lookup(rt.module(RootModule::Main), &Key::from("x"));
    assert_eq!(x, Value::Int(1));
}

#[test]
fn trailing_expression_is_the_result() {
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, "x = 2\nx * 21"), Value::Int(42));
}

#[test]
fn script_without_trailing_expression_yields_none() {
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, "x = 1"), Value::None);
    assert_eq!(eval_ok(&mut rt, ""), Value::None);
}

#[test]
fn top_level_bindings_persist_between_evaluations() {
    let mut rt = runtime();
    eval_ok(&mut rt, "x = 1234");
    assert_eq!(eval_ok(&mut rt, "x + 1"), Value::Int(1235));
    let main = rt.module(RootModule::Main);
    assert_eq!(rt.lookup(main, &Key::from("x")), Value::Int(1234));
    assert!(!rt.has_fault());
}

// =============================================================================
// 2. Language features
// =============================================================================

#[test]
fn closures_capture_enclosing_locals() {
    let code = "
def make(n):
    def add(x):
        return x + n
    return add

add3 = make(3)
add3(4)
";
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, code), Value::Int(7));
}

#[test]
fn keyword_and_default_arguments_bind() {
    let mut rt = runtime();
    let code = "def f(a, b=10):\n    return a - b\n(f(b=1, a=5), f(15))";
    let value = eval_ok(&mut rt, code);
    assert_eq!(rt.repr(value), "(4, 5)");
}

#[test]
fn global_statement_rebinds_main() {
    let code = "
counter = 0
def bump():
    global counter
    counter += 1
bump()
bump()
counter
";
    let mut rt = runtime();
    assert_eq!(eval_ok(&mut rt, code), Value::Int(2));
}

#[test]
fn loops_and_branches() {
    let code = "
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
(total, n)
";
    assert_eq!(eval_repr(code), "(16, 3)");
}

#[test]
fn except_binds_exception_message() {
    let code = "
try:
    1 // 0
except ZeroDivisionError as e:
    caught = e.message
caught
";
    let mut rt = runtime();
    let value = eval_ok(&mut rt, code);
    assert_eq!(rt.str_value(value), Some("integer division or modulo by zero"));
}

#[test]
fn floor_division_and_modulo_round_toward_negative_infinity() {
    assert_eq!(eval_repr("(-7 // 2, -7 % 2, 7 // -2, 7.5 // 2)"), "(-4, 1, -4, 3.0)");
}

#[test]
fn container_repr() {
    assert_eq!(
        eval_repr("{'a': (1,), 'b': [1.5, None, True], 'c': 'it\\'s'}"),
        "{'a': (1,), 'b': [1.5, None, True], 'c': 'it\\'s'}"
    );
}

#[test]
fn builtin_methods() {
    assert_eq!(eval_repr("xs = [3, 1, 2]\nxs.append(0)\nsorted(xs)"), "[0, 1, 2, 3]");
    assert_eq!(eval_repr("'-'.join('a b c'.split())"), "'a-b-c'");
    assert_eq!(eval_repr("d = {'k': 1}\n(d.get('k'), d.get('z', 5), d.keys())"), "(1, 5, ['k'])");
}

#[test]
fn unpacking_assignment() {
    assert_eq!(eval_repr("a, b = 1, 2\nb, a = a, b\n(a, b)"), "(2, 1)");
}

#[test]
fn print_writes_through_the_print_writer() {
    let mut rt = Runtime::with_io(
        RuntimeConfig::default(),
        Box::new(CollectStringPrint::new()),
        Box::new(NoopTracer),
    );
    eval_ok(&mut rt, "print('a', 1, [1, 'b'])\nprint(sqrt(16))");
    assert_eq!(rt.take_output().as_deref(), Some("a 1 [1, 'b']\n4.0\n"));
}

#[test]
fn core_constructors_and_base_constants() {
    assert_eq!(eval_repr("(int('42'), float(2), str(7), bool([]), floor(pi))"), "(42, 2.0, '7', False, 3)");
    assert_eq!(eval_repr("type_of(ValueError('x'))"), "'ValueError'");
}

// =============================================================================
// 3. Faults raised by evaluation
// =============================================================================

#[test]
fn integer_overflow_raises() {
    let mut rt = runtime();
    assert_eq!(rt.evaluate("9223372036854775807 + 1"), Value::None);
    let fault = rt.take_fault().expect("overflow should fault");
    assert_eq!(fault.exc_type, ExcType::OverflowError);
}

#[test]
fn recursion_limit_raises_recursion_error() {
    let config = RuntimeConfig {
        max_recursion_depth: 20,
        ..RuntimeConfig::default()
    };
    let mut rt = Runtime::with_io(config, Box::new(NoPrint), Box::new(NoopTracer));
    rt.evaluate("def f(n):\n    return f(n + 1)\nf(0)");
    let fault = rt.take_fault().expect("unbounded recursion should fault");
    assert_eq!(fault.exc_type, ExcType::RecursionError);
    assert_eq!(fault.frames.first().map(|f| f.function.as_str()), Some("f"));
    assert_eq!(fault.frames.last().map(|f| f.function.as_str()), Some("<module>"));
}

#[test]
fn syntax_error_points_at_module() {
    let mut rt = runtime();
    rt.evaluate("x = 1\ndef (:\n");
    let fault = rt.take_fault().expect("bad syntax should fault");
    assert_eq!(fault.exc_type, ExcType::SyntaxError);
    assert_eq!(fault.frames.len(), 1);
    assert_eq!(fault.frames[0].function, "<module>");
}

#[test]
fn unsupported_syntax_is_a_syntax_error() {
    let mut rt = runtime();
    rt.evaluate("class A:\n    pass");
    let fault = rt.take_fault().expect("class statements are not supported");
    assert_eq!(fault.exc_type, ExcType::SyntaxError);
}

#[test]
fn undefined_name_raises_name_error() {
    let mut rt = runtime();
    rt.evaluate("missing + 1");
    let fault = rt.take_fault().expect("undefined name should fault");
    assert_eq!(fault.exc_type, ExcType::NameError);
    assert_eq!(fault.message, "name 'missing' is not defined");
}

#[test]
fn raise_and_reraise_user_exceptions() {
    let mut rt = runtime();
    rt.evaluate("try:\n    raise KeyError('k')\nexcept (IndexError, KeyError):\n    raise");
    let fault = rt.take_fault().expect("re-raised exception should fault");
    assert_eq!(fault.summary(), "KeyError: k");
}
