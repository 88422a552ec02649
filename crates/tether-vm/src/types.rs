//! Heap-resident object types.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    builtins::Method,
    exception::{ExcType, RunError, RunResult},
    expressions::FunctionDef,
    heap::{Heap, HeapData},
    value::Value,
};

/// Hashable projection of a dict key.
///
/// Only immutable values can be keys; lists, dicts and floats are rejected with
/// `TypeError: unhashable type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<DictKey>),
}

impl DictKey {
    pub fn from_value(value: Value, heap: &Heap) -> RunResult<Self> {
        match value {
            Value::None => Ok(Self::None),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Int(i) => Ok(Self::Int(i)),
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => Ok(Self::Str(s.clone())),
                HeapData::Tuple(items) => items
                    .iter()
                    .map(|item| Self::from_value(*item, heap))
                    .collect::<RunResult<Vec<_>>>()
                    .map(Self::Tuple),
                other => Err(unhashable(other.type_name())),
            },
            Value::Float(_) => Err(unhashable("float")),
            Value::Builtin(_) => Err(unhashable("builtin_function")),
        }
    }
}

fn unhashable(type_name: &str) -> RunError {
    RunError::type_error(format!("unhashable type: '{type_name}'"))
}

/// Insertion-ordered mapping; each entry keeps the original key value for iteration.
#[derive(Debug, Default)]
pub struct Dict {
    entries: IndexMap<DictKey, (Value, Value)>,
}

impl Dict {
    pub fn get(&self, key: &DictKey) -> Option<Value> {
        self.entries.get(key).map(|(_, v)| *v)
    }

    pub fn insert(&mut self, key: DictKey, key_value: Value, value: Value) {
        match self.entries.get_mut(&key) {
            // keep the first key object, like CPython
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key, (key_value, value));
            }
        }
    }

    pub fn remove(&mut self, key: &DictKey) -> Option<Value> {
        self.entries.shift_remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &DictKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.values().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.values().map(|(_, v)| *v)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.values().copied()
    }
}

/// A user-defined function or lambda.
#[derive(Debug)]
pub struct Function {
    pub def: Arc<FunctionDef>,
    /// Evaluated defaults, aligned with the trailing parameters.
    pub defaults: Vec<Value>,
    /// Enclosing-function locals visible at definition time, copied by value.
    pub captures: Vec<(String, Value)>,
}

/// A named namespace: `Main`, `Base` or `Core`.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub namespace: IndexMap<String, Value>,
    /// Frozen modules reject rebinding from both runtime code and the host.
    pub frozen: bool,
}

impl Module {
    pub fn new(name: impl Into<String>, frozen: bool) -> Self {
        Self {
            name: name.into(),
            namespace: IndexMap::new(),
            frozen,
        }
    }
}

/// An exception instance created by calling an exception type, e.g. `ValueError("bad")`.
#[derive(Debug, Clone)]
pub struct ExceptionObject {
    pub exc_type: ExcType,
    pub message: String,
}

/// A builtin method bound to its receiver, e.g. `xs.append`.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Method,
}
