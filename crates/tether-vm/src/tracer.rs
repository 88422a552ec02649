//! Execution tracing hooks.
//!
//! The runtime calls into a [`VmTracer`] at function entry/exit, when a fault
//! reaches the fault indicator and after each garbage collection. All hooks
//! default to no-ops so [`NoopTracer`] costs nothing.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`RecordingTracer`] | Full event recording for assertions in tests |

use crate::exception::Fault;

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Call { function: String, depth: usize },
    Return { depth: usize },
    Fault { summary: String },
    Collect { freed: usize },
}

/// Hooks invoked by the runtime at key execution events.
pub trait VmTracer: std::fmt::Debug + Send {
    /// A function activation was pushed; `depth` counts the new frame.
    fn on_call(&mut self, _function: &str, _depth: usize) {}

    /// A function activation was popped; `depth` is the remaining depth.
    fn on_return(&mut self, _depth: usize) {}

    /// A fault was stored in the fault indicator.
    fn on_fault(&mut self, _fault: &Fault) {}

    /// A collection cycle finished.
    fn on_collect(&mut self, _freed: usize) {}

    /// Recorded events, for tracers that keep them.
    fn events(&self) -> &[TraceEvent] {
        &[]
    }
}

#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Writes one line per event to stderr, indented by call depth.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VmTracer for StderrTracer {
    fn on_call(&mut self, function: &str, depth: usize) {
        eprintln!("{:indent$}-> {function}", "", indent = depth * 2);
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("{:indent$}<-", "", indent = (depth + 1) * 2);
    }

    fn on_fault(&mut self, fault: &Fault) {
        eprintln!("!! {}", fault.summary());
    }

    fn on_collect(&mut self, freed: usize) {
        eprintln!("gc: freed {freed} objects");
    }
}

#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VmTracer for RecordingTracer {
    fn on_call(&mut self, function: &str, depth: usize) {
        self.events.push(TraceEvent::Call {
            function: function.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }

    fn on_fault(&mut self, fault: &Fault) {
        self.events.push(TraceEvent::Fault {
            summary: fault.summary(),
        });
    }

    fn on_collect(&mut self, freed: usize) {
        self.events.push(TraceEvent::Collect { freed });
    }

    fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}
