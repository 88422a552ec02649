//! The process-wide runtime session.
//!
//! Exactly one [`Runtime`] exists per process, behind a `parking_lot` mutex.
//! Every crossing holds that lock for its whole duration. The session epoch
//! distinguishes registrations of one session from those of a later one.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use tether_vm::{
    CollectStringPrint, HeapStats, NoPrint, NoopTracer, PrintWriter, RootId, RootModule, Runtime, RuntimeConfig,
    StderrTracer, StdPrint, Value, VmTracer,
};

use crate::{
    error::{Error, Result},
    exception::{Crossing, check},
    proxy::{Handle, Proxy},
};

static SESSION: Mutex<Option<Session>> = Mutex::new(None);

/// Root releases from proxies dropped while the session lock was busy.
///
/// Lock order is always `SESSION` then `PENDING_RELEASES`; `Drop` only ever
/// takes `SESSION` with `try_lock`, so releasing a root can never deadlock.
static PENDING_RELEASES: Mutex<Vec<(u64, RootId)>> = Mutex::new(Vec::new());

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Where `print()` output of runtime code goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintMode {
    #[default]
    Stdout,
    Silent,
    /// Buffer output; read it with [`collected_output`].
    Collect,
}

/// Settings applied by [`initialize_with`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Filename shown in runtime tracebacks.
    pub script_name: String,
    pub max_recursion_depth: usize,
    /// Allocations between automatic collections.
    pub gc_interval: usize,
    pub print: PrintMode,
    /// Log runtime calls, faults and collections to stderr.
    pub trace_vm: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let vm = RuntimeConfig::default();
        Self {
            script_name: vm.script_name,
            max_recursion_depth: vm.max_recursion_depth,
            gc_interval: vm.gc_interval,
            print: PrintMode::default(),
            trace_vm: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_script_name(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = script_name.into();
        self
    }

    #[must_use]
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    #[must_use]
    pub fn with_gc_interval(mut self, interval: usize) -> Self {
        self.gc_interval = interval;
        self
    }

    #[must_use]
    pub fn with_print(mut self, print: PrintMode) -> Self {
        self.print = print;
        self
    }

    #[must_use]
    pub fn with_trace_vm(mut self, trace_vm: bool) -> Self {
        self.trace_vm = trace_vm;
        self
    }

    fn build_runtime(self) -> Runtime {
        let print: Box<dyn PrintWriter> = match self.print {
            PrintMode::Stdout => Box::new(StdPrint),
            PrintMode::Silent => Box::new(NoPrint),
            PrintMode::Collect => Box::new(CollectStringPrint::new()),
        };
        let tracer: Box<dyn VmTracer> = if self.trace_vm {
            Box::new(StderrTracer::new())
        } else {
            Box::new(NoopTracer)
        };
        let config = RuntimeConfig {
            script_name: self.script_name,
            max_recursion_depth: self.max_recursion_depth,
            gc_interval: self.gc_interval,
        };
        Runtime::with_io(config, print, tracer)
    }
}

/// Live session state. Only reachable while holding the session lock.
pub struct Session {
    pub(crate) rt: Runtime,
    pub(crate) epoch: u64,
    /// `Main`, `Base`, `Core`, in [`RootModule::ALL`] order.
    roots: Vec<Proxy>,
}

impl Session {
    /// Validates a host-held handle against this session and the heap.
    pub(crate) fn resolve(&self, handle: Handle) -> Result<Value> {
        if handle.epoch() != self.epoch || !self.rt.is_live(handle.value()) {
            return Err(Error::StaleHandle);
        }
        Ok(handle.value())
    }

    fn release_pending(&mut self) {
        let pending = std::mem::take(&mut *PENDING_RELEASES.lock());
        for (epoch, root) in pending {
            if epoch == self.epoch {
                self.rt.unroot(root);
            }
        }
    }

    fn root_proxy(&self, which: RootModule) -> Proxy {
        let index = match which {
            RootModule::Main => 0,
            RootModule::Base => 1,
            RootModule::Core => 2,
        };
        self.roots[index].clone()
    }
}

/// Runs `f` inside the session's critical section.
pub(crate) fn with_session<T>(f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
    let mut guard = SESSION.lock();
    let session = guard.as_mut().ok_or(Error::NotInitialized)?;
    session.release_pending();
    f(session)
}

/// Releases a proxy's root registration without ever blocking.
pub(crate) fn release_root(epoch: u64, root: RootId) {
    if let Some(mut guard) = SESSION.try_lock() {
        if let Some(session) = guard.as_mut()
            && session.epoch == epoch
        {
            session.rt.unroot(root);
        }
        return;
    }
    PENDING_RELEASES.lock().push((epoch, root));
}

/// Starts the runtime with default settings.
pub fn initialize() -> Result<()> {
    initialize_with(SessionConfig::default())
}

/// Starts the runtime and creates the `Main`, `Base` and `Core` root proxies.
pub fn initialize_with(config: SessionConfig) -> Result<()> {
    let mut guard = SESSION.lock();
    if guard.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
    tracing::info!(epoch, script_name = %config.script_name, "initializing runtime session");
    let mut session = Session {
        rt: config.build_runtime(),
        epoch,
        roots: Vec::with_capacity(RootModule::ALL.len()),
    };
    for which in RootModule::ALL {
        let module = session.rt.module(which);
        let proxy = Proxy::root_module(&mut session, module, which.name());
        session.roots.push(proxy);
    }
    *guard = Some(session);
    Ok(())
}

/// Shuts the runtime down. Proxies that outlive the session must not be used again.
pub fn teardown() -> Result<()> {
    let session = SESSION.lock().take().ok_or(Error::NotInitialized)?;
    tracing::info!(epoch = session.epoch, "tearing down runtime session");
    PENDING_RELEASES.lock().retain(|(epoch, _)| *epoch != session.epoch);
    // dropped outside the lock: the root proxies release through `release_root`
    drop(session);
    Ok(())
}

#[must_use]
pub fn is_initialized() -> bool {
    SESSION.lock().is_some()
}

/// Evaluates `code` in `Main` and returns a proxy over the produced value.
pub fn evaluate(code: &str) -> Result<Proxy> {
    with_session(|session| {
        tracing::trace!(bytes = code.len(), "evaluate");
        let value = session.rt.evaluate(code);
        check(&mut session.rt, Crossing::Evaluate)?;
        let proxy = Proxy::detached(session, value, "<eval>");
        session.rt.maybe_collect();
        Ok(proxy)
    })
}

pub fn main_module() -> Result<Proxy> {
    with_session(|session| Ok(session.root_proxy(RootModule::Main)))
}

pub fn base_module() -> Result<Proxy> {
    with_session(|session| Ok(session.root_proxy(RootModule::Base)))
}

pub fn core_module() -> Result<Proxy> {
    with_session(|session| Ok(session.root_proxy(RootModule::Core)))
}

/// Forces a full collection; returns the number of freed objects.
pub fn collect_garbage() -> Result<usize> {
    with_session(|session| {
        let freed = session.rt.collect();
        tracing::debug!(freed, "collected garbage");
        Ok(freed)
    })
}

pub fn heap_stats() -> Result<HeapStats> {
    with_session(|session| Ok(session.rt.heap_stats()))
}

/// Returns and clears `print()` output captured under [`PrintMode::Collect`].
pub fn collected_output() -> Result<Option<String>> {
    with_session(|session| Ok(session.rt.take_output()))
}
