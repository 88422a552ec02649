//! Boxing and unboxing through the type bridge.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use pretty_assertions::assert_eq;
use tether::{Bridge, Error, Handle, PrintMode, Proxy, SessionConfig, ToRuntime, box_value, unbox_value};

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

fn round_trip<T: Bridge>(value: T) -> T {
    unbox_value(box_value(value).unwrap()).unwrap()
}

fn mismatch(expected: &str, actual: &str) -> Error {
    Error::TypeMismatch {
        expected: expected.to_owned(),
        actual: actual.to_owned(),
    }
}

#[test]
fn registered_types_round_trip() {
    let _f = fixture();
    assert_eq!(round_trip(1234_i64), 1234);
    assert_eq!(round_trip(-7_i8), -7);
    assert_eq!(round_trip(u32::MAX), u32::MAX);
    assert!(round_trip(true));
    assert_eq!(round_trip(2.5_f64), 2.5);
    assert_eq!(round_trip('λ'), 'λ');
    assert_eq!(round_trip("héllo".to_owned()), "héllo");
    round_trip(());
    assert_eq!(round_trip(Some(3_i64)), Some(3));
    assert_eq!(round_trip(None::<i64>), None);
    assert_eq!(round_trip(vec![vec![1_i64], vec![], vec![2, 3]]), vec![vec![1], vec![], vec![2, 3]]);
    assert_eq!(
        round_trip((1_i64, "two".to_owned(), 3.0_f64, false)),
        (1, "two".to_owned(), 3.0, false)
    );
}

#[test]
fn maps_round_trip_as_dicts() {
    let _f = fixture();
    let hash: HashMap<String, i64> = [("a".to_owned(), 1), ("b".to_owned(), 2)].into();
    assert_eq!(round_trip(hash.clone()), hash);

    let tree: BTreeMap<i64, Vec<String>> = [(1, vec!["x".to_owned()]), (2, vec![])].into();
    assert_eq!(round_trip(tree.clone()), tree);

    let mut ordered = IndexMap::new();
    ordered.insert("z".to_owned(), 26_i64);
    ordered.insert("a".to_owned(), 1);
    let back = round_trip(ordered.clone());
    assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "a"]);

    let proxy = Proxy::from_value(hash).unwrap();
    assert_eq!(proxy.type_name().unwrap(), "dict");
    assert_eq!(proxy.get("b").unwrap().cast::<i64>().unwrap(), 2);
}

#[test]
fn unhashable_dict_keys_fault_while_boxing() {
    let _f = fixture();
    let map: HashMap<Vec<i64>, i64> = [(vec![1], 1)].into();
    let err = box_value(map).unwrap_err();
    assert_eq!(err.exception().unwrap().exc_type, "TypeError");
    // the fault was cleared with the error
    assert_eq!(tether::evaluate("return 1").unwrap().cast::<i64>().unwrap(), 1);
}

#[test]
fn runtime_types_follow_the_table() {
    assert_eq!(<() as ToRuntime>::RUNTIME_TYPE, "NoneType");
    assert_eq!(<u8 as ToRuntime>::RUNTIME_TYPE, "int");
    assert_eq!(<f32 as ToRuntime>::RUNTIME_TYPE, "float");
    assert_eq!(<&str as ToRuntime>::RUNTIME_TYPE, "str");
    assert_eq!(<Option<char> as ToRuntime>::RUNTIME_TYPE, "str");
    assert_eq!(<Vec<bool> as ToRuntime>::RUNTIME_TYPE, "list");
    assert_eq!(<(i64, i64) as ToRuntime>::RUNTIME_TYPE, "tuple");
    assert_eq!(<BTreeMap<String, i64> as ToRuntime>::RUNTIME_TYPE, "dict");
}

#[test]
fn boxed_values_have_the_mapped_runtime_type() {
    let _f = fixture();
    let cases = [
        (Proxy::from_value(()).unwrap(), "NoneType"),
        (Proxy::from_value(7_u16).unwrap(), "int"),
        (Proxy::from_value(0.5_f32).unwrap(), "float"),
        (Proxy::from_value("s").unwrap(), "str"),
        (Proxy::from_value(vec![1, 2]).unwrap(), "list"),
        (Proxy::from_value((1, 2)).unwrap(), "tuple"),
    ];
    for (proxy, expected) in cases {
        assert_eq!(proxy.type_name().unwrap(), expected);
    }
}

#[test]
fn mismatched_types_are_reported() {
    let _f = fixture();
    let float = box_value(1.5_f64).unwrap();
    assert_eq!(unbox_value::<i64>(float), Err(mismatch("int", "float")));

    let flag = box_value(true).unwrap();
    assert_eq!(unbox_value::<i64>(flag), Err(mismatch("int", "bool")));

    let text = box_value("ab").unwrap();
    assert_eq!(unbox_value::<char>(text), Err(mismatch("str of length 1", "str of length 2")));
    assert_eq!(unbox_value::<Vec<i64>>(text), Err(mismatch("list", "str")));

    let list = box_value(vec![1, 2]).unwrap();
    assert_eq!(unbox_value::<(i64, i64)>(list), Err(mismatch("tuple", "list")));

    let none = box_value(()).unwrap();
    assert_eq!(unbox_value::<String>(none), Err(mismatch("str", "NoneType")));
}

#[test]
fn integers_are_range_checked() {
    let _f = fixture();
    let big = box_value(300_i64).unwrap();
    assert_eq!(unbox_value::<u8>(big), Err(mismatch("int in u8 range", "int 300")));
    assert_eq!(unbox_value::<i16>(big), Ok(300));

    let negative = box_value(-1_i64).unwrap();
    assert!(matches!(unbox_value::<u32>(negative), Err(Error::TypeMismatch { .. })));
}

#[test]
fn floats_accept_exact_integers_only() {
    let _f = fixture();
    assert_eq!(unbox_value::<f64>(box_value(3_i64).unwrap()), Ok(3.0));
    assert_eq!(unbox_value::<f32>(box_value(0.5_f64).unwrap()), Ok(0.5));
    assert!(matches!(
        unbox_value::<f64>(box_value(i64::MAX).unwrap()),
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(
        unbox_value::<f32>(box_value(0.1_f64).unwrap()),
        Err(mismatch("float exactly representable as f32", "float 0.1"))
    );
}

#[test]
fn sequences_unbox_from_lists_and_tuples() {
    let _f = fixture();
    let tuple = tether::evaluate("return (1, 2, 3)").unwrap();
    assert_eq!(tuple.cast::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
    assert_eq!(tuple.cast::<(i64, i64, i64)>().unwrap(), (1, 2, 3));
    assert_eq!(tuple.cast::<(i64, i64)>(), Err(mismatch("tuple of length 2", "tuple of length 3")));

    let mixed = tether::evaluate("return [1, 'a']").unwrap();
    assert_eq!(mixed.cast::<Vec<i64>>(), Err(mismatch("int", "str")));
}

#[test]
fn handles_and_proxies_pass_through() {
    let _f = fixture();
    let list = tether::evaluate("return [1, 2]").unwrap();
    let handle = list.cast::<Handle>().unwrap();
    assert_eq!(handle, list.handle());
    assert_eq!(unbox_value::<Vec<i64>>(handle).unwrap(), vec![1, 2]);

    let again = list.cast::<Proxy>().unwrap();
    assert!(!again.same_state(&list));
    assert_eq!(again.handle(), list.handle());
    assert_eq!(again.path_string(), "<unboxed>");

    // boxing a proxy yields the very same runtime value
    assert_eq!(box_value(&list).unwrap(), list.handle());
    assert_eq!(box_value(again).unwrap(), list.handle());
}

#[test]
fn bare_handles_do_not_survive_collection() {
    let _f = fixture();
    let handle = box_value(vec![1_i64, 2]).unwrap();
    assert_eq!(unbox_value::<Vec<i64>>(handle), Ok(vec![1, 2]));
    tether::collect_garbage().unwrap();
    assert_eq!(unbox_value::<Vec<i64>>(handle), Err(Error::StaleHandle));

    // the freed slot is handed out again; the old handle must not see the new value
    let reused = Proxy::from_value(vec![9_i64]).unwrap();
    assert_eq!(reused.cast::<Vec<i64>>(), Ok(vec![9]));
    assert_eq!(unbox_value::<Vec<i64>>(handle), Err(Error::StaleHandle));
    assert_eq!(box_value(handle), Err(Error::StaleHandle));

    let pinned = Proxy::from_value(vec![1_i64, 2]).unwrap();
    tether::collect_garbage().unwrap();
    assert_eq!(pinned.cast::<Vec<i64>>(), Ok(vec![1, 2]));
}
