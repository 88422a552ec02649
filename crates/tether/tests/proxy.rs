//! Navigation, calls and assignment through proxies.

use parking_lot::{Mutex, MutexGuard};
use pretty_assertions::assert_eq;
use tether::{Arg, Error, PathKey, PrintMode, Proxy, SessionConfig, StackFrame, args};

static LOCK: Mutex<()> = Mutex::new(());

struct Fixture {
    _guard: MutexGuard<'static, ()>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = tether::teardown();
    }
}

fn fixture() -> Fixture {
    let guard = LOCK.lock();
    if tether::is_initialized() {
        tether::teardown().unwrap();
    }
    tether::initialize_with(SessionConfig::default().with_print(PrintMode::Silent)).unwrap();
    Fixture { _guard: guard }
}

const CONFIG: &str = "config = {'items': [10, 20, 30], 'name': 'demo', 'limits': (1, 2)}";

#[test]
fn navigation_reads_nested_values() {
    let _f = fixture();
    tether::evaluate(CONFIG).unwrap();
    let main = tether::main_module().unwrap();

    let third = main.get("config").unwrap().get("items").unwrap().get(2).unwrap();
    assert_eq!(third.cast::<i64>().unwrap(), 30);
    assert_eq!(third.path_string(), r#"Main.config["items"][2]"#);
    assert_eq!(third.key(), Some(&PathKey::Index(2)));

    let last = main.path([PathKey::from("config"), "items".into(), (-1).into()]).unwrap();
    assert_eq!(last.cast::<i64>().unwrap(), 30);

    let name = main.path(["config", "name"]).unwrap();
    assert_eq!(name.cast::<String>().unwrap(), "demo");
}

#[test]
fn usize_positions_convert_without_changing_the_index() {
    let _f = fixture();
    tether::evaluate(CONFIG).unwrap();
    let items = tether::main_module().unwrap().path(["config", "items"]).unwrap();

    let position: usize = 1;
    let key = PathKey::try_from(position).unwrap();
    assert_eq!(key, PathKey::Index(1));
    assert_eq!(items.get(key).unwrap().cast::<i64>().unwrap(), 20);

    // positions past i64::MAX are rejected rather than clamped to another index
    if usize::BITS >= 64 {
        assert!(PathKey::try_from(usize::MAX).is_err());
    }
}

#[test]
fn root_modules_are_navigable() {
    let _f = fixture();
    let base = tether::base_module().unwrap();
    let core = tether::core_module().unwrap();
    assert_eq!(base.path_string(), "Base");
    assert_eq!(core.type_name().unwrap(), "module");

    let sqrt = base.get("sqrt").unwrap();
    assert!(sqrt.is_callable().unwrap());
    assert_eq!(sqrt.call(&args![16]).unwrap().cast::<f64>().unwrap(), 4.0);

    // Main falls back to Base and Core
    let main = tether::main_module().unwrap();
    assert!(main.get("len").unwrap().is_callable().unwrap());
    assert_eq!(main.get("ValueError").unwrap().type_name().unwrap(), "type");
    assert_eq!(core.get("Main").unwrap().repr().unwrap(), "<module 'Main'>");
}

#[test]
fn missing_names_are_key_not_found() {
    let _f = fixture();
    tether::evaluate(CONFIG).unwrap();
    let main = tether::main_module().unwrap();

    assert_eq!(
        main.get("missing").unwrap_err(),
        Error::KeyNotFound {
            path: "Main".to_owned(),
            key: "missing".to_owned(),
        }
    );
    let config = main.get("config").unwrap();
    assert_eq!(
        config.get("nope").unwrap_err(),
        Error::KeyNotFound {
            path: "Main.config".to_owned(),
            key: "nope".to_owned(),
        }
    );
    assert_eq!(
        config.get("items").unwrap().get(5).unwrap_err(),
        Error::IndexOutOfRange {
            path: r#"Main.config["items"]"#.to_owned(),
            index: 5,
        }
    );
    // a navigation fault leaves the session usable
    assert_eq!(tether::evaluate("return 3").unwrap().cast::<i64>().unwrap(), 3);
}

#[test]
fn navigation_faults_that_are_not_lookups_are_runtime_errors() {
    let _f = fixture();
    let main = tether::main_module().unwrap();
    let err = main.get(0).unwrap_err();
    assert_eq!(err.exception().unwrap().exc_type, "TypeError");
}

#[test]
fn assignment_is_visible_to_runtime_code() {
    let _f = fixture();
    tether::evaluate(CONFIG).unwrap();
    tether::evaluate("x = 1").unwrap();
    let main = tether::main_module().unwrap();

    let first = main.path([PathKey::from("config"), "items".into(), 0.into()]).unwrap();
    assert!(first.is_mutable());
    first.assign(99).unwrap();
    assert_eq!(first.cast::<i64>().unwrap(), 99);
    assert_eq!(
        tether::evaluate("return config['items'][0]").unwrap().cast::<i64>().unwrap(),
        99
    );

    let x = main.get("x").unwrap();
    x.assign("now a string").unwrap();
    assert_eq!(tether::evaluate("return x").unwrap().cast::<String>().unwrap(), "now a string");

    let name = main.path(["config", "name"]).unwrap();
    name.assign(vec![1, 2]).unwrap();
    assert_eq!(tether::evaluate("return config['name']").unwrap().repr().unwrap(), "[1, 2]");
}

#[test]
fn assignment_survives_dropping_the_parent() {
    let _f = fixture();
    tether::evaluate("data = {'v': 1}").unwrap();
    let v = {
        let data = tether::main_module().unwrap().get("data").unwrap();
        data.get("v").unwrap()
    };
    assert!(v.parent().is_none());
    tether::evaluate("data = None").unwrap();
    tether::collect_garbage().unwrap();

    // the anchor keeps the old dict alive; the write lands there
    v.assign(2).unwrap();
    assert_eq!(v.cast::<i64>().unwrap(), 2);
    assert_eq!(tether::evaluate("return data").unwrap().cast::<Option<i64>>().unwrap(), None);
}

#[test]
fn immutable_locations_reject_assignment() {
    let _f = fixture();
    tether::evaluate(CONFIG).unwrap();
    let main = tether::main_module().unwrap();

    let result = tether::evaluate("return 5").unwrap();
    assert!(!result.is_mutable());
    assert_eq!(
        result.assign(1),
        Err(Error::Immutable {
            path: "<eval>".to_owned()
        })
    );

    let limit = main.path([PathKey::from("config"), "limits".into(), 0.into()]).unwrap();
    assert!(matches!(limit.assign(3), Err(Error::Immutable { .. })));

    let value_error = tether::core_module().unwrap().get("ValueError").unwrap();
    assert!(matches!(value_error.assign(3), Err(Error::Immutable { .. })));
    assert!(matches!(main.assign(3), Err(Error::Immutable { .. })));
}

#[test]
fn set_creates_bindings() {
    let _f = fixture();
    let main = tether::main_module().unwrap();
    main.set("fresh", 42).unwrap();
    assert_eq!(tether::evaluate("return fresh + 1").unwrap().cast::<i64>().unwrap(), 43);

    tether::evaluate("d = {}").unwrap();
    main.get("d").unwrap().set("k", "v").unwrap();
    assert_eq!(tether::evaluate("return d['k']").unwrap().cast::<String>().unwrap(), "v");

    let core = tether::core_module().unwrap();
    assert_eq!(
        core.set("x", 1),
        Err(Error::Immutable {
            path: "Core.x".to_owned()
        })
    );
}

#[test]
fn calls_mix_native_values_and_proxies() {
    let _f = fixture();
    tether::evaluate("def pair(a, b):\n    return (a, b)").unwrap();
    let pair = tether::main_module().unwrap().get("pair").unwrap();
    let y = tether::evaluate("return 'y'").unwrap();

    let mixed = pair.call(&args![1, &y]).unwrap();
    assert_eq!(mixed.cast::<(i64, String)>().unwrap(), (1, "y".to_owned()));
    assert_eq!(mixed.path_string(), "Main.pair(...)");

    // equivalent to boxing the native argument up front
    let one = Proxy::from_value(1_i64).unwrap();
    let boxed = pair.call(&args![&one, &y]).unwrap();
    assert_eq!(boxed.cast::<(i64, String)>().unwrap(), (1, "y".to_owned()));

    // and the order is preserved the other way round
    let swapped = pair.call(&args![&y, 1]).unwrap();
    assert_eq!(swapped.cast::<(String, i64)>().unwrap(), ("y".to_owned(), 1));
}

#[test]
fn keyword_arguments_and_defaults() {
    let _f = fixture();
    tether::evaluate("def scale(x, factor=2):\n    return x * factor").unwrap();
    let scale = tether::main_module().unwrap().get("scale").unwrap();
    assert_eq!(scale.call(&args![3]).unwrap().cast::<i64>().unwrap(), 6);
    let scaled = scale
        .call_with_kwargs(&args![3], &[("factor", Arg::from(10))])
        .unwrap();
    assert_eq!(scaled.cast::<i64>().unwrap(), 30);

    let err = scale.call_with_kwargs(&[], &[("bogus", Arg::from(1))]).unwrap_err();
    assert_eq!(err.exception().unwrap().exc_type, "TypeError");
}

#[test]
fn boxed_containers_are_shared_not_copied() {
    let _f = fixture();
    tether::evaluate("def push(xs):\n    xs.append(4)").unwrap();
    let push = tether::main_module().unwrap().get("push").unwrap();
    let list = Proxy::from_value(vec![1, 2, 3]).unwrap();
    push.call(&args![&list]).unwrap();
    assert_eq!(list.cast::<Vec<i64>>().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn methods_are_called_through_navigation() {
    let _f = fixture();
    tether::evaluate("items = [1]\nwords = 'a,b'").unwrap();
    let main = tether::main_module().unwrap();
    let items = main.get("items").unwrap();
    items.call_method("append", &args![2]).unwrap();
    assert_eq!(items.cast::<Vec<i64>>().unwrap(), vec![1, 2]);

    let parts = main.get("words").unwrap().call_method("split", &args![","]).unwrap();
    assert_eq!(parts.cast::<Vec<String>>().unwrap(), vec!["a", "b"]);
}

#[test]
fn runtime_errors_inside_calls_are_translated() {
    let _f = fixture();
    let sqrt = tether::main_module().unwrap().get("sqrt").unwrap();
    let record = sqrt.call(&args![-1]).unwrap_err().exception().cloned().unwrap();
    assert_eq!(record.summary(), "ValueError: math domain error");
    assert_eq!(record.frames, vec![StackFrame::builtin("sqrt")]);
    assert_eq!(sqrt.call(&args![9]).unwrap().cast::<f64>().unwrap(), 3.0);
}

#[test]
fn calling_a_non_callable_fails_before_crossing() {
    let _f = fixture();
    tether::evaluate("x = 5").unwrap();
    let x = tether::main_module().unwrap().get("x").unwrap();
    assert!(!x.is_callable().unwrap());
    assert_eq!(
        x.call(&args![1]),
        Err(Error::NotCallable {
            path: "Main.x".to_owned(),
            type_name: "int".to_owned(),
        })
    );
}

#[test]
fn every_proxy_holds_exactly_one_root() {
    let _f = fixture();
    let before = tether::heap_stats().unwrap().roots;
    let list = tether::evaluate("return [1, 2, 3]").unwrap();
    assert_eq!(tether::heap_stats().unwrap().roots, before + 1);

    let clone = list.clone();
    assert!(clone.same_state(&list));
    assert_eq!(tether::heap_stats().unwrap().roots, before + 1);

    let second = list.get(1).unwrap();
    assert_eq!(second.parent().map(|p| p.same_state(&list)), Some(true));
    assert_eq!(tether::heap_stats().unwrap().roots, before + 2);

    drop((list, clone, second));
    assert_eq!(tether::heap_stats().unwrap().roots, before);
}

#[test]
fn proxies_keep_values_alive_across_collection() {
    let _f = fixture();
    let list = tether::evaluate("return [1, 2, 3]").unwrap();
    tether::evaluate("return ['garbage']").unwrap();
    let freed = tether::collect_garbage().unwrap();
    assert!(freed >= 1);
    assert_eq!(list.cast::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
    assert_eq!(list.repr().unwrap(), "[1, 2, 3]");

    drop(list);
    assert!(tether::collect_garbage().unwrap() >= 1);
}

#[test]
fn debug_output_names_the_path() {
    let _f = fixture();
    let main = tether::main_module().unwrap();
    let rendered = format!("{main:?}");
    assert!(rendered.starts_with("Proxy { path: \"Main\""));
}
