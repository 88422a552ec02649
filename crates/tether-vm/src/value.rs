use std::fmt;

use crate::{builtins::Builtin, heap::HeapId};

/// A runtime value.
///
/// Scalars are stored inline; everything else lives on the heap and is
/// referenced by [`HeapId`]. `Value` is `Copy`: copying a `Ref` does not keep
/// the target alive, only reachability from a GC root does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A native function, bound in `Base` or `Core`.
    Builtin(Builtin),
    Ref(HeapId),
}

impl Value {
    #[must_use]
    pub fn heap_id(self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Identity comparison (`is`).
    #[must_use]
    pub fn is(self, other: Self) -> bool {
        match (self, other) {
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Builtin(b) => write!(f, "<built-in function {b}>"),
            Self::Ref(id) => write!(f, "<object #{}>", id.index()),
        }
    }
}

/// Formats a float the way the runtime prints it: integral values keep a `.0`.
#[must_use]
pub fn float_repr(v: f64) -> String {
    if v.is_nan() {
        "nan".to_owned()
    } else if v.is_infinite() {
        if v > 0.0 { "inf".to_owned() } else { "-inf".to_owned() }
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}
