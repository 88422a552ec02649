//! The embedded runtime behind `tether`.
//!
//! A small dynamic language with a mark/sweep heap, a root table for values
//! pinned by the host, three root modules (`Main`, `Base`, `Core`) and a fault
//! indicator: crossings never return errors, they record a [`Fault`] that the
//! caller must take with [`Runtime::take_fault`].

mod builtins;
mod eval;
mod exception;
mod expressions;
mod heap;
mod io;
mod ops;
mod parse;
mod roots;
mod runtime;
mod tracer;
mod types;
mod value;

pub use crate::{
    builtins::{Builtin, Method},
    exception::{ExcType, Fault, RunError, RunResult, StackFrame},
    heap::{HeapId, HeapStats},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    parse::MAX_NESTING_DEPTH,
    roots::RootId,
    runtime::{DEFAULT_GC_INTERVAL, DEFAULT_MAX_RECURSION_DEPTH, Key, RootModule, Runtime, RuntimeConfig},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    value::Value,
};
