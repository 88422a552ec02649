//! Value semantics shared by the evaluator, the builtins and the embedding API:
//! formatting, equality, ordering, arithmetic, iteration and container access.

use std::{cmp::Ordering, fmt::Write};

use num_integer::Integer;

use crate::{
    builtins::Method,
    exception::{ExcType, RunError, RunResult},
    expressions::{CmpOperator, Operator},
    heap::HeapData,
    runtime::{Key, RootModule, Runtime},
    types::{BoundMethod, DictKey},
    value::Value,
};

/// Containers nested deeper than this print as `...` and compare unequal.
const MAX_DATA_DEPTH: usize = 100;

/// Upper bound on sequences built by repetition or `range()`.
pub(crate) const MAX_SEQUENCE_LEN: usize = 10_000_000;

impl Runtime {
    pub(crate) fn repr_value(&self, value: Value) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, value, 0);
        out
    }

    pub(crate) fn str_of(&self, value: Value) -> String {
        match self.str_value(value) {
            Some(s) => s.to_owned(),
            None => self.repr_value(value),
        }
    }

    fn write_repr(&self, out: &mut String, value: Value, depth: usize) {
        if depth > MAX_DATA_DEPTH {
            out.push_str("...");
            return;
        }
        let Value::Ref(id) = value else {
            let _ = write!(out, "{value}");
            return;
        };
        match self.heap.get(id) {
            HeapData::Str(s) => write_str_repr(out, s),
            HeapData::List(items) => {
                out.push('[');
                self.write_items(out, items, depth);
                out.push(']');
            }
            HeapData::Tuple(items) => {
                out.push('(');
                self.write_items(out, items, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            HeapData::Dict(dict) => {
                out.push('{');
                for (i, (k, v)) in dict.pairs().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_repr(out, k, depth + 1);
                    out.push_str(": ");
                    self.write_repr(out, v, depth + 1);
                }
                out.push('}');
            }
            HeapData::Function(f) => {
                let _ = write!(out, "<function {}>", f.def.name);
            }
            HeapData::Method(m) => {
                let _ = write!(out, "<bound method {}.{}>", self.type_name(m.receiver), m.method.name());
            }
            HeapData::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name);
            }
            HeapData::Exception(e) => {
                let _ = write!(out, "{}(", e.exc_type);
                if !e.message.is_empty() {
                    write_str_repr(out, &e.message);
                }
                out.push(')');
            }
        }
    }

    fn write_items(&self, out: &mut String, items: &[Value], depth: usize) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_repr(out, *item, depth + 1);
        }
    }

    pub(crate) fn truthy(&self, value: Value) -> bool {
        match value {
            Value::None => false,
            Value::Bool(b) => b,
            Value::Int(i) => i != 0,
            Value::Float(f) => f != 0.0,
            Value::Builtin(_) => true,
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => !s.is_empty(),
                HeapData::List(items) | HeapData::Tuple(items) => !items.is_empty(),
                HeapData::Dict(dict) => !dict.is_empty(),
                _ => true,
            },
        }
    }

    pub(crate) fn eq_values(&self, a: Value, b: Value) -> bool {
        self.eq_depth(a, b, 0)
    }

    fn eq_depth(&self, a: Value, b: Value, depth: usize) -> bool {
        if depth > MAX_DATA_DEPTH {
            return false;
        }
        match (a, b) {
            (Value::Ref(x), Value::Ref(y)) => {
                if x == y {
                    return true;
                }
                match (self.heap.get(x), self.heap.get(y)) {
                    (HeapData::Str(l), HeapData::Str(r)) => l == r,
                    (HeapData::List(l), HeapData::List(r)) | (HeapData::Tuple(l), HeapData::Tuple(r)) => {
                        l.len() == r.len() && l.iter().zip(r).all(|(l, r)| self.eq_depth(*l, *r, depth + 1))
                    }
                    (HeapData::Dict(l), HeapData::Dict(r)) => {
                        l.len() == r.len()
                            && l.pairs().all(|(k, v)| {
                                DictKey::from_value(k, &self.heap)
                                    .ok()
                                    .and_then(|key| r.get(&key))
                                    .is_some_and(|other| self.eq_depth(v, other, depth + 1))
                            })
                    }
                    _ => false,
                }
            }
            (Value::Ref(_), _) | (_, Value::Ref(_)) => false,
            _ => match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x.num_eq(y),
                _ => a == b,
            },
        }
    }

    /// Ordering for `<`, `min()`, `sorted()`. Numbers, strings and same-kind sequences only.
    pub(crate) fn compare(&self, a: Value, b: Value) -> RunResult<Ordering> {
        self.compare_depth(a, b, 0)
    }

    fn compare_depth(&self, a: Value, b: Value, depth: usize) -> RunResult<Ordering> {
        if depth > MAX_DATA_DEPTH {
            return Err(RunError::new(ExcType::RecursionError, "maximum comparison depth exceeded"));
        }
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            return x
                .cmp_num(y)
                .ok_or_else(|| RunError::value_error("cannot order nan"));
        }
        if let (Value::Ref(x), Value::Ref(y)) = (a, b) {
            match (self.heap.get(x), self.heap.get(y)) {
                (HeapData::Str(l), HeapData::Str(r)) => return Ok(l.cmp(r)),
                (HeapData::List(l), HeapData::List(r)) | (HeapData::Tuple(l), HeapData::Tuple(r)) => {
                    for (l, r) in l.iter().zip(r) {
                        let ordering = self.compare_depth(*l, *r, depth + 1)?;
                        if ordering != Ordering::Equal {
                            return Ok(ordering);
                        }
                    }
                    return Ok(l.len().cmp(&r.len()));
                }
                _ => {}
            }
        }
        Err(RunError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            self.type_name(a),
            self.type_name(b)
        )))
    }

    pub(crate) fn compare_op(&self, op: CmpOperator, a: Value, b: Value) -> RunResult<bool> {
        // nan is unordered: every ordering comparison against it is false
        if let (Some(x), Some(y)) = (as_number(a), as_number(b))
            && x.cmp_num(y).is_none()
            && !matches!(op, CmpOperator::Is | CmpOperator::IsNot)
        {
            return Ok(op == CmpOperator::NotEq);
        }
        Ok(match op {
            CmpOperator::Eq => self.eq_values(a, b),
            CmpOperator::NotEq => !self.eq_values(a, b),
            CmpOperator::Is => a.is(b),
            CmpOperator::IsNot => !a.is(b),
            CmpOperator::Lt => self.compare(a, b)? == Ordering::Less,
            CmpOperator::LtE => self.compare(a, b)? != Ordering::Greater,
            CmpOperator::Gt => self.compare(a, b)? == Ordering::Greater,
            CmpOperator::GtE => self.compare(a, b)? != Ordering::Less,
            CmpOperator::In => self.contains(b, a)?,
            CmpOperator::NotIn => !self.contains(b, a)?,
        })
    }

    /// `needle in container`.
    pub(crate) fn contains(&self, container: Value, needle: Value) -> RunResult<bool> {
        if let Value::Ref(id) = container {
            match self.heap.get(id) {
                HeapData::Str(haystack) => {
                    return match self.str_value(needle) {
                        Some(s) => Ok(haystack.contains(s)),
                        None => Err(RunError::type_error(format!(
                            "'in <string>' requires string as left operand, not {}",
                            self.type_name(needle)
                        ))),
                    };
                }
                HeapData::List(items) | HeapData::Tuple(items) => {
                    return Ok(items.iter().any(|item| self.eq_values(*item, needle)));
                }
                HeapData::Dict(dict) => {
                    let key = DictKey::from_value(needle, &self.heap)?;
                    return Ok(dict.contains(&key));
                }
                _ => {}
            }
        }
        Err(RunError::type_error(format!(
            "argument of type '{}' is not iterable",
            self.type_name(container)
        )))
    }

    pub(crate) fn binary_op(&mut self, op: Operator, a: Value, b: Value) -> RunResult<Value> {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            return number_op(op, x, y);
        }
        match (op, a, b) {
            (Operator::Add, Value::Ref(x), Value::Ref(y)) => {
                let joined = match (self.heap.get(x), self.heap.get(y)) {
                    (HeapData::Str(l), HeapData::Str(r)) => Some(HeapData::Str(format!("{l}{r}"))),
                    (HeapData::List(l), HeapData::List(r)) => Some(HeapData::List([l.as_slice(), r].concat())),
                    (HeapData::Tuple(l), HeapData::Tuple(r)) => Some(HeapData::Tuple([l.as_slice(), r].concat())),
                    _ => None,
                };
                if let Some(data) = joined {
                    return Ok(Value::Ref(self.heap.allocate(data)));
                }
            }
            (Operator::Mult, Value::Ref(id), Value::Int(n)) | (Operator::Mult, Value::Int(n), Value::Ref(id)) => {
                let count = usize::try_from(n.max(0)).unwrap_or(0);
                let repeated = match self.heap.get(id) {
                    HeapData::Str(s) => {
                        check_len(s.len().saturating_mul(count))?;
                        Some(HeapData::Str(s.repeat(count)))
                    }
                    HeapData::List(items) => {
                        check_len(items.len().saturating_mul(count))?;
                        Some(HeapData::List(items.repeat(count)))
                    }
                    HeapData::Tuple(items) => {
                        check_len(items.len().saturating_mul(count))?;
                        Some(HeapData::Tuple(items.repeat(count)))
                    }
                    _ => None,
                };
                if let Some(data) = repeated {
                    return Ok(Value::Ref(self.heap.allocate(data)));
                }
            }
            _ => {}
        }
        Err(RunError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            self.type_name(a),
            self.type_name(b)
        )))
    }

    pub(crate) fn negate(&self, value: Value) -> RunResult<Value> {
        match value {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(RunError::overflow),
            Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(RunError::type_error(format!(
                "bad operand type for unary -: '{}'",
                self.type_name(other)
            ))),
        }
    }

    /// Materializes the elements of an iterable.
    pub(crate) fn iterate(&mut self, value: Value) -> RunResult<Vec<Value>> {
        if let Value::Ref(id) = value {
            let chars: Vec<String> = match self.heap.get(id) {
                HeapData::List(items) | HeapData::Tuple(items) => return Ok(items.clone()),
                HeapData::Dict(dict) => return Ok(dict.keys().collect()),
                HeapData::Str(s) => s.chars().map(String::from).collect(),
                _ => return Err(self.not_iterable(value)),
            };
            return Ok(chars.into_iter().map(|c| self.alloc_str(c)).collect());
        }
        Err(self.not_iterable(value))
    }

    fn not_iterable(&self, value: Value) -> RunError {
        RunError::type_error(format!("'{}' object is not iterable", self.type_name(value)))
    }

    /// `container[key]` / `container.key`, as used by the host's navigation.
    pub(crate) fn lookup_key(&mut self, container: Value, key: &Key) -> RunResult<Value> {
        match key {
            Key::Name(name) => {
                if let Value::Ref(id) = container {
                    match self.heap.get(id) {
                        HeapData::Module(_) => return self.module_get(container, name),
                        HeapData::Dict(dict) => {
                            if let Some(found) = dict.get(&DictKey::Str(name.clone())) {
                                return Ok(found);
                            }
                            if Method::resolve("dict", name).is_none() {
                                return Err(RunError::new(ExcType::KeyError, format!("'{name}'")));
                            }
                        }
                        _ => {}
                    }
                }
                self.get_attr(container, name)
            }
            Key::Index(index) => {
                if let Some(HeapData::Module(m)) = container.heap_id().map(|id| self.heap.get(id)) {
                    return Err(RunError::type_error(format!(
                        "module '{}' is indexed by name, not by position",
                        m.name
                    )));
                }
                self.subscript(container, Value::Int(*index))
            }
        }
    }

    /// `container[key] = value` / `container.key = value`.
    pub(crate) fn store_key(&mut self, container: Value, key: &Key, value: Value) -> RunResult<()> {
        match key {
            Key::Name(name) => {
                if let Some(HeapData::Dict(_)) = container.heap_id().map(|id| self.heap.get(id)) {
                    let key = self.alloc_str(name.clone());
                    return self.store_subscript(container, key, value);
                }
                self.set_attr(container, name, value)
            }
            Key::Index(index) => self.store_subscript(container, Value::Int(*index), value),
        }
    }

    /// Reads a binding of a module. `Main` falls back to `Base` and `Core`, like name resolution.
    fn module_get(&self, module: Value, name: &str) -> RunResult<Value> {
        let Some(HeapData::Module(m)) = module.heap_id().map(|id| self.heap.get(id)) else {
            return Err(RunError::type_error("expected a module"));
        };
        if let Some(found) = m.namespace.get(name) {
            return Ok(*found);
        }
        if module == self.module(RootModule::Main)
            && let Some(found) = self.resolve_global(name)
        {
            return Ok(found);
        }
        Err(RunError::new(
            ExcType::AttributeError,
            format!("module '{}' has no attribute '{name}'", m.name),
        ))
    }

    /// Looks `name` up in `Main`, then `Base`, then `Core`.
    pub(crate) fn resolve_global(&self, name: &str) -> Option<Value> {
        RootModule::ALL.into_iter().find_map(|which| {
            let HeapData::Module(m) = self.heap.get(self.module_id(which)) else {
                return None;
            };
            m.namespace.get(name).copied()
        })
    }

    pub(crate) fn get_attr(&mut self, object: Value, name: &str) -> RunResult<Value> {
        if let Some(id) = object.heap_id() {
            match self.heap.get(id) {
                HeapData::Module(_) => return self.module_get(object, name),
                HeapData::Exception(e) => match name {
                    "message" => {
                        let message = e.message.clone();
                        return Ok(self.alloc_str(message));
                    }
                    "kind" => {
                        let kind: &'static str = e.exc_type.into();
                        return Ok(self.alloc_str(kind));
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        match Method::resolve(self.type_name(object), name) {
            Some(method) => Ok(Value::Ref(self.heap.allocate(HeapData::Method(BoundMethod {
                receiver: object,
                method,
            })))),
            None => Err(RunError::new(
                ExcType::AttributeError,
                format!("'{}' object has no attribute '{name}'", self.type_name(object)),
            )),
        }
    }

    pub(crate) fn set_attr(&mut self, object: Value, name: &str, value: Value) -> RunResult<()> {
        if let Some(id) = object.heap_id()
            && let HeapData::Module(m) = self.heap.get_mut(id)
        {
            if m.frozen {
                return Err(RunError::type_error(format!("module '{}' is read-only", m.name)));
            }
            m.namespace.insert(name.to_owned(), value);
            return Ok(());
        }
        Err(RunError::new(
            ExcType::AttributeError,
            format!("'{}' object attribute '{name}' is read-only", self.type_name(object)),
        ))
    }

    pub(crate) fn subscript(&mut self, object: Value, index: Value) -> RunResult<Value> {
        let Some(id) = object.heap_id() else {
            return Err(self.not_subscriptable(object));
        };
        let ch = match self.heap.get(id) {
            HeapData::List(items) | HeapData::Tuple(items) => {
                let i = self.sequence_index(index, items.len(), object)?;
                return Ok(items[i]);
            }
            HeapData::Dict(dict) => {
                let key = DictKey::from_value(index, &self.heap)?;
                return dict
                    .get(&key)
                    .ok_or_else(|| RunError::new(ExcType::KeyError, self.repr_value(index)));
            }
            HeapData::Str(s) => {
                let len = s.chars().count();
                let i = self.sequence_index(index, len, object)?;
                s.chars().nth(i).map(String::from).unwrap_or_default()
            }
            _ => return Err(self.not_subscriptable(object)),
        };
        Ok(self.alloc_str(ch))
    }

    pub(crate) fn store_subscript(&mut self, object: Value, index: Value, value: Value) -> RunResult<()> {
        let Some(id) = object.heap_id() else {
            return Err(self.no_item_assignment(object));
        };
        match self.heap.get(id) {
            HeapData::List(items) => {
                let i = self.sequence_index(index, items.len(), object)?;
                if let HeapData::List(items) = self.heap.get_mut(id) {
                    items[i] = value;
                }
                Ok(())
            }
            HeapData::Dict(_) => {
                let key = DictKey::from_value(index, &self.heap)?;
                if let HeapData::Dict(dict) = self.heap.get_mut(id) {
                    dict.insert(key, index, value);
                }
                Ok(())
            }
            HeapData::Module(_) => match self.str_value(index).map(str::to_owned) {
                Some(name) => self.set_attr(object, &name, value),
                None => Err(RunError::type_error("module bindings are assigned by name")),
            },
            _ => Err(self.no_item_assignment(object)),
        }
    }

    /// Resolves a possibly negative index against `len`.
    fn sequence_index(&self, index: Value, len: usize, object: Value) -> RunResult<usize> {
        let type_name = self.type_name(object);
        let raw = match index {
            Value::Int(i) => i,
            Value::Bool(b) => i64::from(b),
            other => {
                return Err(RunError::type_error(format!(
                    "{type_name} indices must be integers, not {}",
                    self.type_name(other)
                )));
            }
        };
        let len_i = i64::try_from(len).map_err(|_| RunError::overflow())?;
        let resolved = if raw < 0 { raw + len_i } else { raw };
        if (0..len_i).contains(&resolved) {
            usize::try_from(resolved).map_err(|_| RunError::overflow())
        } else {
            Err(RunError::new(ExcType::IndexError, format!("{type_name} index out of range")))
        }
    }

    fn not_subscriptable(&self, object: Value) -> RunError {
        RunError::type_error(format!("'{}' object is not subscriptable", self.type_name(object)))
    }

    fn no_item_assignment(&self, object: Value) -> RunError {
        RunError::type_error(format!(
            "'{}' object does not support item assignment",
            self.type_name(object)
        ))
    }
}

fn write_str_repr(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn check_len(len: usize) -> RunResult<()> {
    if len > MAX_SEQUENCE_LEN {
        Err(RunError::value_error("sequence too large"))
    } else {
        Ok(())
    }
}

fn op_symbol(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::Div => "/",
        Operator::FloorDiv => "//",
        Operator::Mod => "%",
        Operator::Pow => "**",
    }
}

/// Numeric view of a value; `bool` counts as an int.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn num_eq(self, other: Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }

    fn cmp_num(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn as_number(value: Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(i)),
        Value::Bool(b) => Some(Number::Int(i64::from(b))),
        Value::Float(f) => Some(Number::Float(f)),
        _ => None,
    }
}

fn number_op(op: Operator, a: Number, b: Number) -> RunResult<Value> {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        return int_op(op, x, y);
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        Operator::Add => x + y,
        Operator::Sub => x - y,
        Operator::Mult => x * y,
        Operator::Div => {
            zero_check(y == 0.0, "float division by zero")?;
            x / y
        }
        Operator::FloorDiv => {
            zero_check(y == 0.0, "float floor division by zero")?;
            (x / y).floor()
        }
        Operator::Mod => {
            zero_check(y == 0.0, "float modulo")?;
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        Operator::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(RunError::new(
                    ExcType::ZeroDivisionError,
                    "0.0 cannot be raised to a negative power",
                ));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(result))
}

fn int_op(op: Operator, x: i64, y: i64) -> RunResult<Value> {
    let checked = match op {
        Operator::Add => x.checked_add(y),
        Operator::Sub => x.checked_sub(y),
        Operator::Mult => x.checked_mul(y),
        Operator::Div => {
            zero_check(y == 0, "division by zero")?;
            return number_op(op, Number::Float(Number::Int(x).as_f64()), Number::Int(y));
        }
        Operator::FloorDiv => {
            zero_check(y == 0, "integer division or modulo by zero")?;
            (x != i64::MIN || y != -1).then(|| x.div_floor(&y))
        }
        Operator::Mod => {
            zero_check(y == 0, "integer division or modulo by zero")?;
            Some(if y == -1 { 0 } else { x.mod_floor(&y) })
        }
        Operator::Pow => {
            if y < 0 {
                return number_op(op, Number::Float(Number::Int(x).as_f64()), Number::Int(y));
            }
            u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp))
        }
    };
    checked.map(Value::Int).ok_or_else(RunError::overflow)
}

fn zero_check(is_zero: bool, message: &str) -> RunResult<()> {
    if is_zero {
        Err(RunError::new(ExcType::ZeroDivisionError, message))
    } else {
        Ok(())
    }
}
