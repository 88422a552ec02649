//! Tests for GC roots and the mark/sweep collector.

use pretty_assertions::assert_eq;
use tether_vm::{Key, NoPrint, NoopTracer, RootModule, Runtime, RuntimeConfig, Value};

fn runtime() -> Runtime {
    Runtime::with_io(RuntimeConfig::default(), Box::new(NoPrint), Box::new(NoopTracer))
}

#[test]
fn unrooted_values_are_collected() {
    let mut rt = runtime();
    let list = rt.alloc_list(vec![Value::Int(1)]);
    assert!(rt.is_live(list));
    assert_eq!(rt.collect(), 1);
    assert!(!rt.is_live(list));
}

#[test]
fn reused_slot_does_not_revive_a_freed_value() {
    let mut rt = runtime();
    let old = rt.alloc_list(vec![Value::Int(1)]);
    assert_eq!(rt.collect(), 1);

    let new = rt.alloc_list(vec![Value::Int(9)]);
    assert_eq!(new.heap_id().map(|id| id.index()), old.heap_id().map(|id| id.index()));
    assert_ne!(new, old);
    assert!(!rt.is_live(old));
    assert!(rt.is_live(new));
    assert_eq!(rt.sequence_items(new), Some(&[Value::Int(9)][..]));
}

#[test]
fn rooted_values_survive_until_unrooted() {
    let mut rt = runtime();
    let inner = rt.alloc_str("inner");
    let list = rt.alloc_list(vec![inner]);
    let id = rt.root(list, None);

    rt.collect();
    assert!(rt.is_live(list));
    assert!(rt.is_live(inner));
    assert_eq!(rt.rooted_value(id), Some(list));

    assert!(rt.unroot(id));
    assert!(!rt.unroot(id), "second release of the same id is a no-op");
    assert_eq!(rt.rooted_value(id), None);
    rt.collect();
    assert!(!rt.is_live(list));
}

#[test]
fn anchor_is_pinned_with_the_value() {
    let mut rt = runtime();
    let list = rt.alloc_list(vec![Value::Int(1)]);
    let id = rt.root(Value::Int(1), Some(list));
    rt.collect();
    assert!(rt.is_live(list));
    assert_eq!(rt.rooted_anchor(id), Some(list));
}

#[test]
fn stale_root_id_does_not_release_a_reused_slot() {
    let mut rt = runtime();
    let first = rt.root(Value::Int(1), None);
    rt.unroot(first);
    let second = rt.root(Value::Int(2), None);
    assert!(!rt.unroot(first));
    assert_eq!(rt.rooted_value(second), Some(Value::Int(2)));
    assert_eq!(rt.root_count(), 1);
}

#[test]
fn reroot_points_a_registration_at_a_new_value() {
    let mut rt = runtime();
    let id = rt.root(Value::Int(1), None);
    let s = rt.alloc_str("kept");
    assert!(rt.reroot(id, s));
    rt.collect();
    assert_eq!(rt.str_value(s), Some("kept"));
}

#[test]
fn module_bindings_survive_collection() {
    let mut rt = runtime();
    rt.evaluate("x = [1, 'two', (3,)]");
    rt.collect();
    let main = rt.module(RootModule::Main);
    let x = rt.lookup(main, &Key::from("x"));
    assert_eq!(rt.repr(x), "[1, 'two', (3,)]");
}

#[test]
fn maybe_collect_honours_the_interval() {
    let config = RuntimeConfig {
        gc_interval: 100,
        ..RuntimeConfig::default()
    };
    let mut rt = Runtime::with_io(config, Box::new(NoPrint), Box::new(NoopTracer));
    assert_eq!(rt.maybe_collect(), None);
    for i in 0..100 {
        rt.alloc_str(format!("garbage {i}"));
    }
    assert_eq!(rt.maybe_collect(), Some(100));
    assert_eq!(rt.maybe_collect(), None);
}

#[test]
fn heap_stats_count_objects_and_roots() {
    let mut rt = runtime();
    let list = rt.alloc_list(vec![]);
    rt.root(list, None);
    rt.collect();
    let stats = rt.heap_stats();
    assert_eq!(stats.roots, 1);
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.objects_by_type.get("List"), Some(&1));
    assert_eq!(stats.objects_by_type.get("Module"), Some(&3));
}
