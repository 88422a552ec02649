//! The embedding surface of the runtime.
//!
//! [`Runtime`] behaves like a classic embedding C API: crossing operations
//! (`evaluate`, `lookup`, `store`, `call`, `alloc_dict`) never return a
//! `Result`. On failure they store a [`Fault`] in the fault indicator and
//! return a `Value::None` placeholder; the host must check
//! [`Runtime::has_fault`] / [`Runtime::take_fault`] after every crossing.

use std::fmt;

use crate::{
    builtins::Builtin,
    eval::Interp,
    exception::{ExcType, Fault, RunError, RunResult},
    heap::{Heap, HeapData, HeapId, HeapStats},
    io::{PrintWriter, StdPrint},
    parse::parse,
    roots::{RootId, RootTable},
    tracer::{NoopTracer, VmTracer},
    types::{DictKey, Module},
    value::Value,
};

/// Recommended maximum call depth if not otherwise specified.
///
/// The evaluator recurses on the host stack, so this stays well below what a
/// 2 MiB thread stack can hold in debug builds.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Allocations between automatic collections if not otherwise specified.
pub const DEFAULT_GC_INTERVAL: usize = 10_000;

/// Construction-time settings for a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Name used as the filename of top-level frames in tracebacks.
    pub script_name: String,
    /// Maximum number of nested function activations.
    pub max_recursion_depth: usize,
    /// Run garbage collection after this many allocations (checked by [`Runtime::maybe_collect`]).
    pub gc_interval: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            script_name: "<eval>".to_owned(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}

/// Path key for [`Runtime::lookup`] and [`Runtime::store`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Module binding, dict string key, attribute or method name.
    Name(String),
    /// Sequence position (negative counts from the end) or dict integer key.
    Index(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Self::Index(i64::from(index))
    }
}

/// Fails for positions beyond `i64::MAX`, which no sequence can reach.
impl TryFrom<usize> for Key {
    type Error = std::num::TryFromIntError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        i64::try_from(index).map(Self::Index)
    }
}

/// The three well-known top-level scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootModule {
    /// User globals; target of top-level bindings.
    Main,
    /// Builtin functions and constants.
    Base,
    /// Type and exception constructors. Frozen.
    Core,
}

impl RootModule {
    pub const ALL: [Self; 3] = [Self::Main, Self::Base, Self::Core];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Base => "Base",
            Self::Core => "Core",
        }
    }
}

pub struct Runtime {
    pub(crate) heap: Heap,
    roots: RootTable,
    main: HeapId,
    base: HeapId,
    core: HeapId,
    fault: Option<Fault>,
    pub(crate) config: RuntimeConfig,
    pub(crate) print: Box<dyn PrintWriter>,
    pub(crate) tracer: Box<dyn VmTracer>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("roots", &self.roots.len())
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// Starts a runtime printing to stdout with no tracing.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_io(config, Box::new(StdPrint), Box::new(NoopTracer))
    }

    /// Starts a runtime with explicit output and tracing hooks.
    #[must_use]
    pub fn with_io(config: RuntimeConfig, print: Box<dyn PrintWriter>, tracer: Box<dyn VmTracer>) -> Self {
        let mut heap = Heap::default();

        let mut base = Module::new(RootModule::Base.name(), false);
        for builtin in Builtin::BASE {
            base.namespace.insert(builtin.name().to_owned(), Value::Builtin(builtin));
        }
        base.namespace.insert("pi".to_owned(), Value::Float(std::f64::consts::PI));
        base.namespace.insert("e".to_owned(), Value::Float(std::f64::consts::E));
        base.namespace.insert("inf".to_owned(), Value::Float(f64::INFINITY));
        base.namespace.insert("nan".to_owned(), Value::Float(f64::NAN));
        let base = heap.allocate(HeapData::Module(base));

        let main = heap.allocate(HeapData::Module(Module::new(RootModule::Main.name(), false)));

        let mut core = Module::new(RootModule::Core.name(), true);
        for builtin in Builtin::CORE {
            core.namespace.insert(builtin.name().to_owned(), Value::Builtin(builtin));
        }
        for exc_type in ExcType::ALL {
            let builtin = Builtin::Exc(exc_type);
            core.namespace.insert(builtin.name().to_owned(), Value::Builtin(builtin));
        }
        core.namespace.insert("Main".to_owned(), Value::Ref(main));
        core.namespace.insert("Base".to_owned(), Value::Ref(base));
        let core = heap.allocate(HeapData::Module(core));
        if let HeapData::Module(m) = heap.get_mut(core) {
            m.namespace.insert("Core".to_owned(), Value::Ref(core));
        }

        Self {
            heap,
            roots: RootTable::default(),
            main,
            base,
            core,
            fault: None,
            config,
            print,
            tracer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn module(&self, which: RootModule) -> Value {
        Value::Ref(self.module_id(which))
    }

    pub(crate) fn module_id(&self, which: RootModule) -> HeapId {
        match which {
            RootModule::Main => self.main,
            RootModule::Base => self.base,
            RootModule::Core => self.core,
        }
    }

    // --- fault indicator ---

    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.fault.is_some()
    }

    /// Returns and clears the pending fault.
    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    fn settle(&mut self, result: RunResult<Value>) -> Value {
        match result {
            Ok(value) => value,
            Err(error) => {
                let fault = error.into_fault();
                self.tracer.on_fault(&fault);
                self.fault = Some(fault);
                Value::None
            }
        }
    }

    // --- crossings ---

    /// Parses and runs `code` at top level.
    ///
    /// The result is the argument of a top-level `return`, otherwise the value
    /// of a trailing expression statement, otherwise `None`.
    pub fn evaluate(&mut self, code: &str) -> Value {
        let result = parse(code, &self.config.script_name).and_then(|nodes| Interp::new(self).run_module(&nodes));
        self.settle(result)
    }

    /// Reads `container[key]` with navigation semantics (see [`Key`]).
    pub fn lookup(&mut self, container: Value, key: &Key) -> Value {
        let result = self.lookup_key(container, key);
        self.settle(result)
    }

    /// Writes `container[key] = value`.
    pub fn store(&mut self, container: Value, key: &Key, value: Value) {
        let result = self.store_key(container, key, value).map(|()| Value::None);
        self.settle(result);
    }

    /// Invokes `callable` with positional and keyword arguments.
    pub fn call(&mut self, callable: Value, args: &[Value], kwargs: &[(String, Value)]) -> Value {
        let result = Interp::new(self).call_value(callable, args, kwargs);
        self.settle(result)
    }

    /// Builds a dict from `pairs`; faults with `TypeError` on an unhashable key.
    pub fn alloc_dict(&mut self, pairs: Vec<(Value, Value)>) -> Value {
        let result = self.new_dict(pairs);
        self.settle(result)
    }

    // --- allocation (cannot fault) ---

    pub fn alloc_str(&mut self, s: impl Into<String>) -> Value {
        Value::Ref(self.heap.allocate(HeapData::Str(s.into())))
    }

    pub fn alloc_list(&mut self, items: Vec<Value>) -> Value {
        Value::Ref(self.heap.allocate(HeapData::List(items)))
    }

    pub fn alloc_tuple(&mut self, items: Vec<Value>) -> Value {
        Value::Ref(self.heap.allocate(HeapData::Tuple(items)))
    }

    // --- inspection (never crosses into evaluation) ---

    /// Runtime type name of `value`.
    #[must_use]
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Builtin(b) if b.is_type() => "type",
            Value::Builtin(_) => "builtin_function",
            Value::Ref(id) => self.heap.get(id).type_name(),
        }
    }

    #[must_use]
    pub fn str_value(&self, value: Value) -> Option<&str> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    #[must_use]
    pub fn sequence_items(&self, value: Value) -> Option<&[Value]> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::List(items) | HeapData::Tuple(items) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    /// Key/value pairs of a dict, in insertion order.
    #[must_use]
    pub fn dict_items(&self, value: Value) -> Option<Vec<(Value, Value)>> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Dict(dict) => Some(dict.pairs().collect()),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn is_callable(&self, value: Value) -> bool {
        match value {
            Value::Builtin(_) => true,
            Value::Ref(id) => matches!(self.heap.get(id), HeapData::Function(_) | HeapData::Method(_)),
            _ => false,
        }
    }

    /// Whether `store` on this container can succeed for some key.
    #[must_use]
    pub fn is_mutable_container(&self, value: Value) -> bool {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::List(_) | HeapData::Dict(_) => true,
                HeapData::Module(m) => !m.frozen,
                _ => false,
            },
            _ => false,
        }
    }

    #[must_use]
    pub fn repr(&self, value: Value) -> String {
        self.repr_value(value)
    }

    /// `str()` conversion: strings unquoted, everything else as `repr`.
    #[must_use]
    pub fn display(&self, value: Value) -> String {
        self.str_of(value)
    }

    /// Structural equality (`==`).
    #[must_use]
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        self.eq_values(a, b)
    }

    // --- GC roots ---

    /// Pins `value` (and optionally the container it was read from) as one GC root.
    pub fn root(&mut self, value: Value, anchor: Option<Value>) -> RootId {
        self.roots.insert(value, anchor)
    }

    /// Releases a registration; `false` if it was stale or already released.
    pub fn unroot(&mut self, id: RootId) -> bool {
        self.roots.remove(id)
    }

    #[must_use]
    pub fn rooted_value(&self, id: RootId) -> Option<Value> {
        self.roots.get(id).map(|pinned| pinned.value)
    }

    #[must_use]
    pub fn rooted_anchor(&self, id: RootId) -> Option<Value> {
        self.roots.get(id).and_then(|pinned| pinned.anchor)
    }

    /// Re-points an existing registration at a new value.
    pub fn reroot(&mut self, id: RootId, value: Value) -> bool {
        self.roots.set_value(id, value)
    }

    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    // --- garbage collection ---

    /// Runs a full collection. Returns the number of freed objects.
    ///
    /// Only values reachable from the root table or the three root modules
    /// survive, so this must never run while an evaluation is in flight.
    pub fn collect(&mut self) -> usize {
        let modules = [Value::Ref(self.main), Value::Ref(self.base), Value::Ref(self.core)];
        let freed = self.heap.collect(self.roots.values().chain(modules));
        self.tracer.on_collect(freed);
        freed
    }

    /// Collects if at least `gc_interval` allocations happened since the last cycle.
    pub fn maybe_collect(&mut self) -> Option<usize> {
        (self.heap.allocations_since_gc() >= self.config.gc_interval).then(|| self.collect())
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats(self.roots.len())
    }

    /// Whether `value` still refers to a live object (immediates always do).
    #[must_use]
    pub fn is_live(&self, value: Value) -> bool {
        value.heap_id().is_none_or(|id| self.heap.is_live(id))
    }

    /// Returns and clears output captured by the print writer.
    pub fn take_output(&mut self) -> Option<String> {
        self.print.take_output()
    }

    #[must_use]
    pub fn tracer(&self) -> &dyn VmTracer {
        self.tracer.as_ref()
    }

    pub(crate) fn new_dict(&mut self, pairs: Vec<(Value, Value)>) -> RunResult<Value> {
        let mut dict = crate::types::Dict::default();
        for (k, v) in pairs {
            let key = DictKey::from_value(k, &self.heap)?;
            dict.insert(key, k, v);
        }
        Ok(Value::Ref(self.heap.allocate(HeapData::Dict(dict))))
    }

    pub(crate) fn fault_type_error(&self, what: &str, value: Value) -> RunError {
        RunError::type_error(format!("{what} '{}'", self.type_name(value)))
    }
}
