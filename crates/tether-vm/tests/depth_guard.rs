//! Tests for the parser's nesting guard, which keeps deeply nested sources away
//! from the recursive evaluator.

use pretty_assertions::assert_eq;
use tether_vm::{ExcType, Key, MAX_NESTING_DEPTH, NoPrint, NoopTracer, RootModule, Runtime, RuntimeConfig, Value};

fn runtime() -> Runtime {
    Runtime::with_io(RuntimeConfig::default(), Box::new(NoPrint), Box::new(NoopTracer))
}

/// `[[...[1]...]]` as an expression statement: one level for the statement,
/// one per list and one for the literal.
fn nested_lists(lists: usize) -> String {
    format!("{}1{}", "[".repeat(lists), "]".repeat(lists))
}

/// `if True:` blocks nested `blocks` deep around `x = 1`.
fn nested_ifs(blocks: usize) -> String {
    let mut code = String::new();
    for depth in 0..blocks {
        code.push_str(&"    ".repeat(depth));
        code.push_str("if True:\n");
    }
    code.push_str(&"    ".repeat(blocks));
    code.push_str("x = 1\n");
    code
}

fn limit() -> usize {
    usize::from(MAX_NESTING_DEPTH)
}

#[test]
fn nesting_up_to_the_limit_evaluates() {
    let mut rt = runtime();
    let lists = rt.evaluate(&nested_lists(limit() - 2));
    assert!(!rt.has_fault());
    assert_eq!(rt.type_name(lists), "list");

    rt.evaluate(&nested_ifs(limit() - 2));
    assert!(!rt.has_fault());
    let main = rt.module(RootModule::Main);
    assert_eq!(rt.lookup(main, &Key::from("x")), Value::Int(1));
}

#[test]
fn nested_expressions_past_the_limit_are_syntax_errors() {
    let mut rt = runtime();
    assert_eq!(rt.evaluate(&nested_lists(limit() - 1)), Value::None);
    let fault = rt.take_fault().expect("too deep nesting should fault");
    assert_eq!(fault.exc_type, ExcType::SyntaxError);
    assert_eq!(fault.message, "too many nested statements or expressions");
    assert_eq!(fault.frames.len(), 1);
    assert_eq!(fault.frames[0].function, "<module>");

    assert!(!rt.has_fault());
    assert_eq!(rt.evaluate("return 1"), Value::Int(1));
    assert!(!rt.has_fault());
}

#[test]
fn nested_blocks_past_the_limit_are_syntax_errors() {
    let mut rt = runtime();
    rt.evaluate(&nested_ifs(limit() - 1));
    let fault = rt.take_fault().expect("too deep nesting should fault");
    assert_eq!(fault.exc_type, ExcType::SyntaxError);
    assert_eq!(fault.frames[0].function, "<module>");
    assert!(!rt.has_fault());

    // nothing from the rejected source ran
    let main = rt.module(RootModule::Main);
    rt.lookup(main, &Key::from("x"));
    assert_eq!(rt.take_fault().map(|f| f.exc_type), Some(ExcType::AttributeError));
}
