//! The type bridge: a closed, compile-time registry of host types that can
//! cross into the runtime ([`ToRuntime`]) and back ([`Bridge`]).
//!
//! | host type | runtime type |
//! |-----------|--------------|
//! | `()` | `NoneType` |
//! | `bool` | `bool` |
//! | `i8 i16 i32 i64 u8 u16 u32` | `int` |
//! | `f32 f64` | `float` |
//! | `char`, `String` (`&str` boxes only) | `str` |
//! | `Option<T>` | `None` or `T` |
//! | `Vec<T>` | `list` (unboxing also accepts `tuple`) |
//! | tuples of 1 to 4 elements | `tuple` |
//! | `HashMap`, `BTreeMap`, `IndexMap` | `dict` |
//! | `Handle`, `Proxy` | passed through unchanged |
//!
//! Both traits are sealed. Types outside the table fail to compile.

use std::{
    collections::{BTreeMap, HashMap},
    hash::{BuildHasher, Hash},
};

use indexmap::IndexMap;
use tether_vm::{Runtime, Value};

use crate::{
    error::{Error, Result},
    exception::{Crossing, check},
    proxy::{Handle, Proxy},
    session::{Session, with_session},
};

mod sealed {
    pub trait Sealed {}
}

/// Host types that can be boxed into runtime values.
pub trait ToRuntime: sealed::Sealed {
    /// Runtime type name this host type maps to.
    const RUNTIME_TYPE: &'static str;

    #[doc(hidden)]
    fn to_runtime(self, session: &mut Session) -> Result<Value>;
}

/// Host types that round-trip: they box and unbox.
pub trait Bridge: ToRuntime + Sized {
    #[doc(hidden)]
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self>;
}

/// Boxes a host value and returns a bare handle to it.
///
/// The handle is not a GC root; prefer [`Proxy::from_value`] when the value
/// must survive later evaluations.
pub fn box_value<T: ToRuntime>(value: T) -> Result<Handle> {
    with_session(|session| {
        let value = value.to_runtime(session)?;
        Ok(Handle::new(value, session.epoch))
    })
}

/// Converts the value behind `handle` into a host value.
pub fn unbox_value<T: Bridge>(handle: Handle) -> Result<T> {
    with_session(|session| {
        let value = session.resolve(handle)?;
        T::from_runtime(value, session)
    })
}

fn mismatch(expected: impl Into<String>, value: Value, rt: &Runtime) -> Error {
    Error::TypeMismatch {
        expected: expected.into(),
        actual: rt.type_name(value).to_owned(),
    }
}

impl sealed::Sealed for () {}

impl ToRuntime for () {
    const RUNTIME_TYPE: &'static str = "NoneType";

    fn to_runtime(self, _session: &mut Session) -> Result<Value> {
        Ok(Value::None)
    }
}

impl Bridge for () {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        match value {
            Value::None => Ok(()),
            other => Err(mismatch(Self::RUNTIME_TYPE, other, &session.rt)),
        }
    }
}

impl sealed::Sealed for bool {}

impl ToRuntime for bool {
    const RUNTIME_TYPE: &'static str = "bool";

    fn to_runtime(self, _session: &mut Session) -> Result<Value> {
        Ok(Value::Bool(self))
    }
}

impl Bridge for bool {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(Self::RUNTIME_TYPE, other, &session.rt)),
        }
    }
}

macro_rules! impl_bridge_int {
    ($($ty:ty),*) => {$(
        impl sealed::Sealed for $ty {}

        impl ToRuntime for $ty {
            const RUNTIME_TYPE: &'static str = "int";

            fn to_runtime(self, _session: &mut Session) -> Result<Value> {
                Ok(Value::Int(i64::from(self)))
            }
        }

        impl Bridge for $ty {
            fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|_| Error::TypeMismatch {
                        expected: concat!("int in ", stringify!($ty), " range").to_owned(),
                        actual: format!("int {i}"),
                    }),
                    other => Err(mismatch(Self::RUNTIME_TYPE, other, &session.rt)),
                }
            }
        }
    )*};
}

impl_bridge_int!(i8, i16, i32, i64, u8, u16, u32);

/// Largest magnitude below which every `i64` is exactly representable as `f64`.
const F64_EXACT_INT: u64 = 1 << 53;
const F32_EXACT_INT: u64 = 1 << 24;

impl sealed::Sealed for f64 {}

impl ToRuntime for f64 {
    const RUNTIME_TYPE: &'static str = "float";

    fn to_runtime(self, _session: &mut Session) -> Result<Value> {
        Ok(Value::Float(self))
    }
}

impl Bridge for f64 {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) if i.unsigned_abs() <= F64_EXACT_INT => Ok(i as Self),
            other => Err(mismatch(Self::RUNTIME_TYPE, other, &session.rt)),
        }
    }
}

impl sealed::Sealed for f32 {}

impl ToRuntime for f32 {
    const RUNTIME_TYPE: &'static str = "float";

    fn to_runtime(self, _session: &mut Session) -> Result<Value> {
        Ok(Value::Float(f64::from(self)))
    }
}

impl Bridge for f32 {
    #[expect(clippy::cast_possible_truncation, reason = "narrowing is checked by the round trip")]
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        match value {
            Value::Float(f) => {
                let narrowed = f as Self;
                if f64::from(narrowed).to_bits() == f.to_bits() || f.is_nan() {
                    Ok(narrowed)
                } else {
                    Err(Error::TypeMismatch {
                        expected: "float exactly representable as f32".to_owned(),
                        actual: format!("float {f}"),
                    })
                }
            }
            Value::Int(i) if i.unsigned_abs() <= F32_EXACT_INT => Ok(i as Self),
            other => Err(mismatch(Self::RUNTIME_TYPE, other, &session.rt)),
        }
    }
}

impl sealed::Sealed for char {}

impl ToRuntime for char {
    const RUNTIME_TYPE: &'static str = "str";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        Ok(session.rt.alloc_str(self.to_string()))
    }
}

impl Bridge for char {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        let rt = &session.rt;
        let Some(s) = rt.str_value(value) else {
            return Err(mismatch(Self::RUNTIME_TYPE, value, rt));
        };
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::TypeMismatch {
                expected: "str of length 1".to_owned(),
                actual: format!("str of length {}", s.chars().count()),
            }),
        }
    }
}

impl sealed::Sealed for String {}

impl ToRuntime for String {
    const RUNTIME_TYPE: &'static str = "str";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        Ok(session.rt.alloc_str(self))
    }
}

impl Bridge for String {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        session
            .rt
            .str_value(value)
            .map(str::to_owned)
            .ok_or_else(|| mismatch(Self::RUNTIME_TYPE, value, &session.rt))
    }
}

impl sealed::Sealed for &str {}

impl ToRuntime for &str {
    const RUNTIME_TYPE: &'static str = "str";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        Ok(session.rt.alloc_str(self))
    }
}

impl<T: ToRuntime> sealed::Sealed for Option<T> {}

impl<T: ToRuntime> ToRuntime for Option<T> {
    const RUNTIME_TYPE: &'static str = T::RUNTIME_TYPE;

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        match self {
            Some(inner) => inner.to_runtime(session),
            None => Ok(Value::None),
        }
    }
}

impl<T: Bridge> Bridge for Option<T> {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        match value {
            Value::None => Ok(None),
            other => T::from_runtime(other, session).map(Some),
        }
    }
}

/// Boxes every element; nothing can be collected while a crossing holds the session.
fn box_all<T: ToRuntime>(items: impl IntoIterator<Item = T>, session: &mut Session) -> Result<Vec<Value>> {
    items.into_iter().map(|item| item.to_runtime(session)).collect()
}

impl<T: ToRuntime> sealed::Sealed for Vec<T> {}

impl<T: ToRuntime> ToRuntime for Vec<T> {
    const RUNTIME_TYPE: &'static str = "list";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        let items = box_all(self, session)?;
        Ok(session.rt.alloc_list(items))
    }
}

impl<T: Bridge> Bridge for Vec<T> {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        let Some(items) = session.rt.sequence_items(value).map(<[Value]>::to_vec) else {
            return Err(mismatch(Self::RUNTIME_TYPE, value, &session.rt));
        };
        items.into_iter().map(|item| T::from_runtime(item, session)).collect()
    }
}

macro_rules! impl_bridge_tuple {
    ($len:literal => $($name:ident $index:tt),+) => {
        impl<$($name: ToRuntime),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: ToRuntime),+> ToRuntime for ($($name,)+) {
            const RUNTIME_TYPE: &'static str = "tuple";

            fn to_runtime(self, session: &mut Session) -> Result<Value> {
                let items = vec![$(self.$index.to_runtime(session)?),+];
                Ok(session.rt.alloc_tuple(items))
            }
        }

        impl<$($name: Bridge),+> Bridge for ($($name,)+) {
            fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
                let items = match session.rt.sequence_items(value) {
                    Some(items) if session.rt.type_name(value) == "tuple" => items.to_vec(),
                    _ => return Err(mismatch(Self::RUNTIME_TYPE, value, &session.rt)),
                };
                if items.len() != $len {
                    return Err(Error::TypeMismatch {
                        expected: concat!("tuple of length ", $len).to_owned(),
                        actual: format!("tuple of length {}", items.len()),
                    });
                }
                Ok(($($name::from_runtime(items[$index], session)?,)+))
            }
        }
    };
}

impl_bridge_tuple!(1 => A 0);
impl_bridge_tuple!(2 => A 0, B 1);
impl_bridge_tuple!(3 => A 0, B 1, C 2);
impl_bridge_tuple!(4 => A 0, B 1, C 2, D 3);

/// Boxes key/value pairs into a runtime dict; unhashable keys fault inside the runtime.
fn box_dict<K: ToRuntime, V: ToRuntime>(
    pairs: impl IntoIterator<Item = (K, V)>,
    session: &mut Session,
) -> Result<Value> {
    let pairs = pairs
        .into_iter()
        .map(|(k, v)| Ok((k.to_runtime(session)?, v.to_runtime(session)?)))
        .collect::<Result<Vec<_>>>()?;
    let dict = session.rt.alloc_dict(pairs);
    check(&mut session.rt, Crossing::Box)?;
    Ok(dict)
}

fn dict_pairs<K: Bridge, V: Bridge>(value: Value, session: &mut Session) -> Result<Vec<(K, V)>> {
    let Some(pairs) = session.rt.dict_items(value) else {
        return Err(mismatch("dict", value, &session.rt));
    };
    pairs
        .into_iter()
        .map(|(k, v)| Ok((K::from_runtime(k, session)?, V::from_runtime(v, session)?)))
        .collect()
}

impl<K: ToRuntime, V: ToRuntime, S> sealed::Sealed for HashMap<K, V, S> {}

impl<K: ToRuntime, V: ToRuntime, S> ToRuntime for HashMap<K, V, S> {
    const RUNTIME_TYPE: &'static str = "dict";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        box_dict(self, session)
    }
}

impl<K: Bridge + Eq + Hash, V: Bridge, S: BuildHasher + Default> Bridge for HashMap<K, V, S> {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        dict_pairs(value, session).map(|pairs| pairs.into_iter().collect())
    }
}

impl<K: ToRuntime, V: ToRuntime> sealed::Sealed for BTreeMap<K, V> {}

impl<K: ToRuntime, V: ToRuntime> ToRuntime for BTreeMap<K, V> {
    const RUNTIME_TYPE: &'static str = "dict";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        box_dict(self, session)
    }
}

impl<K: Bridge + Ord, V: Bridge> Bridge for BTreeMap<K, V> {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        dict_pairs(value, session).map(|pairs| pairs.into_iter().collect())
    }
}

impl<K: ToRuntime, V: ToRuntime, S> sealed::Sealed for IndexMap<K, V, S> {}

impl<K: ToRuntime, V: ToRuntime, S> ToRuntime for IndexMap<K, V, S> {
    const RUNTIME_TYPE: &'static str = "dict";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        box_dict(self, session)
    }
}

impl<K: Bridge + Eq + Hash, V: Bridge, S: BuildHasher + Default> Bridge for IndexMap<K, V, S> {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        dict_pairs(value, session).map(|pairs| pairs.into_iter().collect())
    }
}

impl sealed::Sealed for Handle {}

impl ToRuntime for Handle {
    const RUNTIME_TYPE: &'static str = "object";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        session.resolve(self)
    }
}

impl Bridge for Handle {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        Ok(Self::new(value, session.epoch))
    }
}

impl sealed::Sealed for Proxy {}

impl ToRuntime for Proxy {
    const RUNTIME_TYPE: &'static str = "object";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        self.live_value(session)
    }
}

impl Bridge for Proxy {
    fn from_runtime(value: Value, session: &mut Session) -> Result<Self> {
        Ok(Self::detached(session, value, "<unboxed>"))
    }
}

impl sealed::Sealed for &Proxy {}

impl ToRuntime for &Proxy {
    const RUNTIME_TYPE: &'static str = "object";

    fn to_runtime(self, session: &mut Session) -> Result<Value> {
        self.live_value(session)
    }
}
