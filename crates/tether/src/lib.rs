#![doc = include_str!("../../../README.md")]

mod bridge;
mod call;
mod error;
mod exception;
mod proxy;
mod session;

pub use tether_vm::{ExcType, HeapStats, StackFrame};

pub use crate::{
    bridge::{Bridge, ToRuntime, box_value, unbox_value},
    call::{Arg, NativeValue},
    error::{Error, Result},
    exception::ExceptionRecord,
    proxy::{Handle, PathKey, Proxy},
    session::{
        PrintMode, SessionConfig, base_module, collect_garbage, collected_output, core_module, evaluate, heap_stats,
        initialize, initialize_with, is_initialized, main_module, teardown,
    },
};
