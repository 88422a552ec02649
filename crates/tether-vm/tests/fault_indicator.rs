//! Tests for the fault indicator: every failing crossing stores a fault and
//! returns a placeholder, and `take_fault` clears it.

use pretty_assertions::assert_eq;
use tether_vm::{
    ExcType, Key, NoPrint, NoopTracer, RecordingTracer, RootModule, Runtime, RuntimeConfig, StackFrame, TraceEvent,
    Value,
};

fn runtime() -> Runtime {
    Runtime::with_io(RuntimeConfig::default(), Box::new(NoPrint), Box::new(NoopTracer))
}

#[test]
fn sqrt_of_negative_sets_and_clears_the_indicator() {
    let mut rt = runtime();
    assert!(!rt.has_fault());
    assert_eq!(rt.evaluate("sqrt(-1)"), Value::None);
    assert!(rt.has_fault());

    let fault = rt.take_fault().expect("fault should be pending");
    assert_eq!(fault.exc_type, ExcType::ValueError);
    assert_eq!(fault.message, "math domain error");
    assert_eq!(fault.frames[0], StackFrame::builtin("sqrt"));
    assert_eq!(fault.frames[1], StackFrame::new("<module>", "<eval>", Some(1)));

    assert!(!rt.has_fault());
    assert!(rt.take_fault().is_none());
}

#[test]
fn host_call_into_builtin_reports_a_frame() {
    let mut rt = runtime();
    let base = rt.module(RootModule::Base);
    let sqrt = rt.lookup(base, &Key::from("sqrt"));
    assert!(rt.is_callable(sqrt));

    assert_eq!(rt.call(sqrt, &[Value::Int(-1)], &[]), Value::None);
    let fault = rt.take_fault().expect("sqrt(-1) should fault");
    assert_eq!(fault.summary(), "ValueError: math domain error");
    assert_eq!(fault.frames, vec![StackFrame::builtin("sqrt")]);

    assert_eq!(rt.call(sqrt, &[Value::Int(16)], &[]), Value::Float(4.0));
    assert!(!rt.has_fault());
}

#[test]
fn traceback_lists_user_frames_innermost_first() {
    let code = "
def inner():
    return sqrt(-1)

def outer():
    x = 1
    return inner()

outer()
";
    let mut rt = runtime();
    rt.evaluate(code);
    let fault = rt.take_fault().expect("nested call should fault");
    let functions: Vec<_> = fault.frames.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(functions, vec!["sqrt", "inner", "outer", "<module>"]);
    assert_eq!(fault.frames[1].line, Some(3));
    assert_eq!(fault.frames[2].line, Some(7));
    assert_eq!(fault.frames[3].line, Some(9));
}

#[test]
fn missing_module_binding_is_a_lookup_fault() {
    let mut rt = runtime();
    let main = rt.module(RootModule::Main);
    assert_eq!(rt.lookup(main, &Key::from("nope")), Value::None);
    let fault = rt.take_fault().expect("missing binding should fault");
    assert_eq!(fault.exc_type, ExcType::AttributeError);
    assert!(fault.exc_type.is_lookup());
}

#[test]
fn main_lookup_falls_back_to_base_and_core() {
    let mut rt = runtime();
    let main = rt.module(RootModule::Main);
    let len = rt.lookup(main, &Key::from("len"));
    let int = rt.lookup(main, &Key::from("int"));
    assert!(!rt.has_fault());
    assert_eq!(rt.type_name(len), "builtin_function");
    assert_eq!(rt.type_name(int), "type");
}

#[test]
fn sequence_and_dict_lookups() {
    let mut rt = runtime();
    let list = rt.evaluate("[10, 20, 30]");
    assert_eq!(rt.lookup(list, &Key::Index(-1)), Value::Int(30));
    assert_eq!(rt.lookup(list, &Key::Index(3)), Value::None);
    assert_eq!(rt.take_fault().map(|f| f.exc_type), Some(ExcType::IndexError));

    let dict = rt.evaluate("{'a': 1, 2: 'two'}");
    assert_eq!(rt.lookup(dict, &Key::from("a")), Value::Int(1));
    let two = rt.lookup(dict, &Key::Index(2));
    assert_eq!(rt.str_value(two), Some("two"));
    rt.lookup(dict, &Key::from("zzz"));
    assert_eq!(rt.take_fault().map(|f| f.exc_type), Some(ExcType::KeyError));
}

#[test]
fn store_into_frozen_core_faults() {
    let mut rt = runtime();
    let core = rt.module(RootModule::Core);
    assert!(!rt.is_mutable_container(core));
    rt.store(core, &Key::from("int"), Value::Int(1));
    let fault = rt.take_fault().expect("Core is frozen");
    assert_eq!(fault.exc_type, ExcType::TypeError);
}

#[test]
fn store_into_main_and_list() {
    let mut rt = runtime();
    let main = rt.module(RootModule::Main);
    rt.store(main, &Key::from("x"), Value::Int(1234));
    assert!(!rt.has_fault());
    assert_eq!(rt.evaluate("x"), Value::Int(1234));

    let list = rt.evaluate("xs = [1, 2, 3]\nxs");
    rt.store(list, &Key::Index(0), Value::Bool(true));
    assert_eq!(rt.evaluate("xs[0]"), Value::Bool(true));

    let tuple = rt.evaluate("(1, 2)");
    rt.store(tuple, &Key::Index(0), Value::None);
    assert_eq!(rt.take_fault().map(|f| f.exc_type), Some(ExcType::TypeError));
}

#[test]
fn unhashable_dict_key_faults() {
    let mut rt = runtime();
    let list = rt.alloc_list(vec![]);
    assert_eq!(rt.alloc_dict(vec![(list, Value::Int(1))]), Value::None);
    let fault = rt.take_fault().expect("lists are unhashable");
    assert_eq!(fault.message, "unhashable type: 'list'");
}

#[test]
fn faults_are_reported_to_the_tracer() {
    let mut rt = Runtime::with_io(
        RuntimeConfig::default(),
        Box::new(NoPrint),
        Box::new(RecordingTracer::new()),
    );
    rt.evaluate("def f():\n    return sqrt(-1)\nf()");
    rt.take_fault();
    let events = rt.tracer().events();
    assert!(events.contains(&TraceEvent::Call {
        function: "f".to_owned(),
        depth: 2,
    }));
    assert!(events.contains(&TraceEvent::Fault {
        summary: "ValueError: math domain error".to_owned(),
    }));
}
