//! Native functions bound in `Base` and `Core`, and the builtin methods of
//! `list`, `dict` and `str`.

use std::fmt;

use strum::IntoStaticStr;

use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::HeapData,
    ops::MAX_SEQUENCE_LEN,
    runtime::Runtime,
    types::{DictKey, ExceptionObject},
    value::Value,
};

/// A native function value.
///
/// `Exc` variants are exception constructors; the rest serialize to their
/// binding name through `IntoStaticStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Print,
    Len,
    Abs,
    Sqrt,
    Floor,
    Min,
    Max,
    Sum,
    Range,
    Repr,
    Sorted,
    #[strum(serialize = "type_of")]
    TypeOf,
    Int,
    Float,
    Str,
    Bool,
    List,
    Tuple,
    Dict,
    Exc(ExcType),
}

impl Builtin {
    /// Functions bound in the `Base` module.
    pub const BASE: [Self; 12] = [
        Self::Print,
        Self::Len,
        Self::Abs,
        Self::Sqrt,
        Self::Floor,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Range,
        Self::Repr,
        Self::Sorted,
        Self::TypeOf,
    ];

    /// Type constructors bound in the `Core` module (exception types are added separately).
    pub const CORE: [Self; 7] = [
        Self::Int,
        Self::Float,
        Self::Str,
        Self::Bool,
        Self::List,
        Self::Tuple,
        Self::Dict,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Exc(exc_type) => exc_type.into(),
            other => other.into(),
        }
    }

    /// Whether this builtin is a type constructor rather than a plain function.
    #[must_use]
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Float | Self::Str | Self::Bool | Self::List | Self::Tuple | Self::Dict | Self::Exc(_)
        )
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A method of a builtin type, bound to its receiver through `HeapData::Method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ListAppend,
    ListPop,
    ListInsert,
    ListCopy,
    DictGet,
    DictKeys,
    DictValues,
    DictItems,
    DictPop,
    StrUpper,
    StrLower,
    StrStrip,
    StrSplit,
    StrJoin,
}

impl Method {
    /// Finds method `name` on values of type `type_name`.
    #[must_use]
    pub fn resolve(type_name: &str, name: &str) -> Option<Self> {
        Some(match (type_name, name) {
            ("list", "append") => Self::ListAppend,
            ("list", "pop") => Self::ListPop,
            ("list", "insert") => Self::ListInsert,
            ("list", "copy") => Self::ListCopy,
            ("dict", "get") => Self::DictGet,
            ("dict", "keys") => Self::DictKeys,
            ("dict", "values") => Self::DictValues,
            ("dict", "items") => Self::DictItems,
            ("dict", "pop") => Self::DictPop,
            ("str", "upper") => Self::StrUpper,
            ("str", "lower") => Self::StrLower,
            ("str", "strip") => Self::StrStrip,
            ("str", "split") => Self::StrSplit,
            ("str", "join") => Self::StrJoin,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ListAppend => "append",
            Self::ListPop | Self::DictPop => "pop",
            Self::ListInsert => "insert",
            Self::ListCopy => "copy",
            Self::DictGet => "get",
            Self::DictKeys => "keys",
            Self::DictValues => "values",
            Self::DictItems => "items",
            Self::StrUpper => "upper",
            Self::StrLower => "lower",
            Self::StrStrip => "strip",
            Self::StrSplit => "split",
            Self::StrJoin => "join",
        }
    }
}

/// Checks the positional argument count of a native call.
fn arity(name: &str, args: &[Value], min: usize, max: usize) -> RunResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let (qualifier, count) = if min == max {
        ("exactly", min)
    } else if args.len() < min {
        ("at least", min)
    } else {
        ("at most", max)
    };
    let plural = if count == 1 { "" } else { "s" };
    Err(RunError::type_error(format!(
        "{name}() takes {qualifier} {count} argument{plural} ({} given)",
        args.len()
    )))
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> RunResult<()> {
    match kwargs.first() {
        None => Ok(()),
        Some((key, _)) => Err(RunError::type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
    }
}

impl Runtime {
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> RunResult<Value> {
        let name = builtin.name();
        if builtin != Builtin::Dict {
            no_kwargs(name, kwargs)?;
        }
        match builtin {
            Builtin::Print => {
                let line = args.iter().map(|arg| self.str_of(*arg)).collect::<Vec<_>>().join(" ");
                self.print.write_line(&line);
                Ok(Value::None)
            }
            Builtin::Len => {
                arity(name, args, 1, 1)?;
                self.len_of(args[0])
            }
            Builtin::Abs => {
                arity(name, args, 1, 1)?;
                match args[0] {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(RunError::overflow),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(self.fault_type_error("bad operand type for abs():", other)),
                }
            }
            Builtin::Sqrt => {
                arity(name, args, 1, 1)?;
                let x = self.as_float(args[0], name)?;
                if x < 0.0 {
                    return Err(RunError::value_error("math domain error"));
                }
                Ok(Value::Float(x.sqrt()))
            }
            Builtin::Floor => {
                arity(name, args, 1, 1)?;
                match args[0] {
                    Value::Int(i) => Ok(Value::Int(i)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Float(f) => float_to_int(f.floor()),
                    other => self.as_float(other, name).map(Value::Float),
                }
            }
            Builtin::Min | Builtin::Max => {
                if args.is_empty() {
                    return Err(RunError::type_error(format!("{name} expected at least 1 argument, got 0")));
                }
                let candidates = if args.len() == 1 { self.iterate(args[0])? } else { args.to_vec() };
                let mut best: Option<Value> = None;
                for candidate in candidates {
                    best = Some(match best {
                        None => candidate,
                        Some(current) => {
                            let ordering = self.compare(candidate, current)?;
                            let replace = if builtin == Builtin::Min {
                                ordering.is_lt()
                            } else {
                                ordering.is_gt()
                            };
                            if replace { candidate } else { current }
                        }
                    });
                }
                best.ok_or_else(|| RunError::value_error(format!("{name}() arg is an empty sequence")))
            }
            Builtin::Sum => {
                arity(name, args, 1, 2)?;
                let items = self.iterate(args[0])?;
                let mut total = args.get(1).copied().unwrap_or(Value::Int(0));
                for item in items {
                    total = self.binary_op(crate::expressions::Operator::Add, total, item)?;
                }
                Ok(total)
            }
            Builtin::Range => {
                arity(name, args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|arg| self.as_int(*arg, name))
                    .collect::<RunResult<Vec<_>>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => unreachable!("arity checked above"),
                };
                let items = range_items(start, stop, step)?;
                Ok(self.alloc_list(items))
            }
            Builtin::Repr => {
                arity(name, args, 1, 1)?;
                let repr = self.repr_value(args[0]);
                Ok(self.alloc_str(repr))
            }
            Builtin::Sorted => {
                arity(name, args, 1, 1)?;
                let mut items = self.iterate(args[0])?;
                let mut failed = None;
                items.sort_by(|a, b| {
                    self.compare(*a, *b).unwrap_or_else(|err| {
                        failed.get_or_insert(err);
                        std::cmp::Ordering::Equal
                    })
                });
                match failed {
                    Some(err) => Err(err),
                    None => Ok(self.alloc_list(items)),
                }
            }
            Builtin::TypeOf => {
                arity(name, args, 1, 1)?;
                let type_name = self.type_name(args[0]);
                Ok(self.alloc_str(type_name))
            }
            Builtin::Int => {
                arity(name, args, 0, 1)?;
                match args.first().copied().unwrap_or(Value::Int(0)) {
                    Value::Int(i) => Ok(Value::Int(i)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Float(f) => float_to_int(f.trunc()),
                    other => match self.str_value(other) {
                        Some(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                            RunError::value_error(format!("invalid literal for int() with base 10: {}", self.repr_value(other)))
                        }),
                        None => Err(self.fault_type_error("int() argument must be a string or a number, not", other)),
                    },
                }
            }
            Builtin::Float => {
                arity(name, args, 0, 1)?;
                let value = args.first().copied().unwrap_or(Value::Float(0.0));
                match self.str_value(value) {
                    Some(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        RunError::value_error(format!("could not convert string to float: {}", self.repr_value(value)))
                    }),
                    None => self.as_float(value, name).map(Value::Float),
                }
            }
            Builtin::Str => {
                arity(name, args, 0, 1)?;
                let s = args.first().map(|arg| self.str_of(*arg)).unwrap_or_default();
                Ok(self.alloc_str(s))
            }
            Builtin::Bool => {
                arity(name, args, 0, 1)?;
                Ok(Value::Bool(args.first().is_some_and(|arg| self.truthy(*arg))))
            }
            Builtin::List | Builtin::Tuple => {
                arity(name, args, 0, 1)?;
                let items = match args.first() {
                    Some(arg) => self.iterate(*arg)?,
                    None => Vec::new(),
                };
                Ok(if builtin == Builtin::List {
                    self.alloc_list(items)
                } else {
                    self.alloc_tuple(items)
                })
            }
            Builtin::Dict => {
                arity(name, args, 0, 1)?;
                let mut pairs = match args.first() {
                    Some(arg) => self.pairs_of(*arg)?,
                    None => Vec::new(),
                };
                for (key, value) in kwargs {
                    pairs.push((self.alloc_str(key.clone()), *value));
                }
                self.new_dict(pairs)
            }
            Builtin::Exc(exc_type) => {
                arity(name, args, 0, 1)?;
                let message = args.first().map(|arg| self.str_of(*arg)).unwrap_or_default();
                Ok(Value::Ref(
                    self.heap.allocate(HeapData::Exception(ExceptionObject { exc_type, message })),
                ))
            }
        }
    }

    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        method: Method,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> RunResult<Value> {
        let name = method.name();
        no_kwargs(name, kwargs)?;
        let Some(id) = receiver.heap_id() else {
            return Err(self.fault_type_error("method called on", receiver));
        };
        match method {
            Method::ListAppend => {
                arity(name, args, 1, 1)?;
                self.list_mut(id)?.push(args[0]);
                Ok(Value::None)
            }
            Method::ListPop => {
                arity(name, args, 0, 1)?;
                let index = args.first().map(|arg| self.as_int(*arg, name)).transpose()?;
                let items = self.list_mut(id)?;
                if items.is_empty() {
                    return Err(RunError::new(ExcType::IndexError, "pop from empty list"));
                }
                let len = i64::try_from(items.len()).map_err(|_| RunError::overflow())?;
                let raw = index.unwrap_or(-1);
                let resolved = if raw < 0 { raw + len } else { raw };
                match usize::try_from(resolved).ok().filter(|i| *i < items.len()) {
                    Some(i) => Ok(items.remove(i)),
                    None => Err(RunError::new(ExcType::IndexError, "pop index out of range")),
                }
            }
            Method::ListInsert => {
                arity(name, args, 2, 2)?;
                let raw = self.as_int(args[0], name)?;
                let items = self.list_mut(id)?;
                let len = i64::try_from(items.len()).map_err(|_| RunError::overflow())?;
                let resolved = if raw < 0 { (raw + len).max(0) } else { raw.min(len) };
                let position = usize::try_from(resolved).map_err(|_| RunError::overflow())?;
                items.insert(position, args[1]);
                Ok(Value::None)
            }
            Method::ListCopy => {
                arity(name, args, 0, 0)?;
                let items = self.list_mut(id)?.clone();
                Ok(self.alloc_list(items))
            }
            Method::DictGet | Method::DictPop => {
                arity(name, args, 1, 2)?;
                let key = DictKey::from_value(args[0], &self.heap)?;
                let HeapData::Dict(dict) = self.heap.get_mut(id) else {
                    return Err(RunError::type_error("expected a dict"));
                };
                let found = if method == Method::DictPop {
                    dict.remove(&key)
                } else {
                    dict.get(&key)
                };
                match (found, args.get(1)) {
                    (Some(value), _) => Ok(value),
                    (None, Some(default)) => Ok(*default),
                    (None, None) if method == Method::DictGet => Ok(Value::None),
                    (None, None) => Err(RunError::new(ExcType::KeyError, self.repr_value(args[0]))),
                }
            }
            Method::DictKeys | Method::DictValues | Method::DictItems => {
                arity(name, args, 0, 0)?;
                let HeapData::Dict(dict) = self.heap.get(id) else {
                    return Err(RunError::type_error("expected a dict"));
                };
                let pairs: Vec<(Value, Value)> = dict.pairs().collect();
                let items = match method {
                    Method::DictKeys => pairs.into_iter().map(|(k, _)| k).collect(),
                    Method::DictValues => pairs.into_iter().map(|(_, v)| v).collect(),
                    _ => pairs.into_iter().map(|(k, v)| self.alloc_tuple(vec![k, v])).collect(),
                };
                Ok(self.alloc_list(items))
            }
            Method::StrUpper | Method::StrLower | Method::StrStrip => {
                arity(name, args, 0, 0)?;
                let s = self.receiver_str(receiver)?;
                let result = match method {
                    Method::StrUpper => s.to_uppercase(),
                    Method::StrLower => s.to_lowercase(),
                    _ => s.trim().to_owned(),
                };
                Ok(self.alloc_str(result))
            }
            Method::StrSplit => {
                arity(name, args, 0, 1)?;
                let s = self.receiver_str(receiver)?.to_owned();
                let parts: Vec<String> = match args.first() {
                    None | Some(Value::None) => s.split_whitespace().map(str::to_owned).collect(),
                    Some(sep) => {
                        let sep = self.receiver_str(*sep)?;
                        if sep.is_empty() {
                            return Err(RunError::value_error("empty separator"));
                        }
                        s.split(sep).map(str::to_owned).collect()
                    }
                };
                let items = parts.into_iter().map(|part| self.alloc_str(part)).collect();
                Ok(self.alloc_list(items))
            }
            Method::StrJoin => {
                arity(name, args, 1, 1)?;
                let sep = self.receiver_str(receiver)?.to_owned();
                let items = self.iterate(args[0])?;
                let parts = items
                    .into_iter()
                    .map(|item| self.receiver_str(item).map(str::to_owned))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(self.alloc_str(parts.join(&sep)))
            }
        }
    }

    fn len_of(&self, value: Value) -> RunResult<Value> {
        let len = match value.heap_id().map(|id| self.heap.get(id)) {
            Some(HeapData::Str(s)) => s.chars().count(),
            Some(HeapData::List(items) | HeapData::Tuple(items)) => items.len(),
            Some(HeapData::Dict(dict)) => dict.len(),
            _ => {
                return Err(RunError::type_error(format!(
                    "object of type '{}' has no len()",
                    self.type_name(value)
                )));
            }
        };
        i64::try_from(len).map(Value::Int).map_err(|_| RunError::overflow())
    }

    fn list_mut(&mut self, id: crate::heap::HeapId) -> RunResult<&mut Vec<Value>> {
        match self.heap.get_mut(id) {
            HeapData::List(items) => Ok(items),
            _ => Err(RunError::type_error("expected a list")),
        }
    }

    fn receiver_str(&self, value: Value) -> RunResult<&str> {
        self.str_value(value)
            .ok_or_else(|| self.fault_type_error("expected str instance, got", value))
    }

    /// Key/value pairs from a dict or an iterable of 2-item sequences.
    fn pairs_of(&mut self, value: Value) -> RunResult<Vec<(Value, Value)>> {
        if let Some(pairs) = self.dict_items(value) {
            return Ok(pairs);
        }
        self.iterate(value)?
            .into_iter()
            .map(|item| match self.sequence_items(item) {
                Some([k, v]) => Ok((*k, *v)),
                _ => Err(RunError::value_error(
                    "dictionary update sequence element has wrong length; 2 is required",
                )),
            })
            .collect()
    }

    fn as_float(&self, value: Value, name: &str) -> RunResult<f64> {
        match value {
            Value::Int(i) => Ok(i as f64),
            Value::Bool(b) => Ok(f64::from(u8::from(b))),
            Value::Float(f) => Ok(f),
            other => Err(RunError::type_error(format!(
                "{name}() argument must be a real number, not '{}'",
                self.type_name(other)
            ))),
        }
    }

    fn as_int(&self, value: Value, name: &str) -> RunResult<i64> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            other => Err(RunError::type_error(format!(
                "{name}() argument must be an integer, not '{}'",
                self.type_name(other)
            ))),
        }
    }
}

#[expect(clippy::cast_possible_truncation)]
fn float_to_int(f: f64) -> RunResult<Value> {
    if f.is_nan() {
        return Err(RunError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(RunError::new(ExcType::OverflowError, "cannot convert float to integer"));
    }
    Ok(Value::Int(f as i64))
}

fn range_items(start: i64, stop: i64, step: i64) -> RunResult<Vec<Value>> {
    if step == 0 {
        return Err(RunError::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        let step_abs = i128::from(step).abs();
        (span + step_abs - 1) / step_abs
    };
    let count = usize::try_from(count)
        .ok()
        .filter(|count| *count <= MAX_SEQUENCE_LEN)
        .ok_or_else(|| RunError::value_error("range too large"))?;
    let mut items = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        items.push(Value::Int(current));
        // the final step may leave the i64 range; it is never read
        current = current.wrapping_add(step);
    }
    Ok(items)
}
