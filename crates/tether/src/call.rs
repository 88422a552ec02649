//! Call adapter: argument lists that mix host values and runtime proxies.
//!
//! Arguments are boxed left to right inside the call's critical section, so
//! nothing is collected between boxing the first argument and the call itself.

use std::{fmt, sync::Arc};

use tether_vm::Value;

use crate::{
    bridge::{Bridge, ToRuntime},
    error::Result,
    exception::{Crossing, check},
    proxy::{Handle, Proxy},
    session::Session,
};

type BoxFn = dyn Fn(&mut Session) -> Result<Value> + Send + Sync;

/// A host value that is boxed when the call happens.
#[derive(Clone)]
pub struct NativeValue {
    runtime_type: &'static str,
    boxer: Arc<BoxFn>,
}

impl NativeValue {
    fn new<T: ToRuntime + Clone + Send + Sync + 'static>(value: T) -> Self {
        Self {
            runtime_type: T::RUNTIME_TYPE,
            boxer: Arc::new(move |session| value.clone().to_runtime(session)),
        }
    }

    /// Runtime type the value will box to.
    #[must_use]
    pub fn runtime_type(&self) -> &'static str {
        self.runtime_type
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeValue")
            .field("runtime_type", &self.runtime_type)
            .finish_non_exhaustive()
    }
}

/// One call argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A value already inside the runtime, passed unchanged.
    Runtime(Handle),
    /// A host value, boxed at call time.
    Native(NativeValue),
}

impl<T: Bridge + Clone + Send + Sync + 'static> From<T> for Arg {
    fn from(value: T) -> Self {
        Self::Native(NativeValue::new(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Native(NativeValue::new(value.to_owned()))
    }
}

/// Builds an argument array from host values and `&Proxy` references.
///
/// ```ignore
/// let sum = add.call(&args![1, &y])?;
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::Arg::from($arg)),*]
    };
}

impl Arg {
    fn to_runtime(&self, session: &mut Session) -> Result<Value> {
        match self {
            Self::Runtime(handle) => session.resolve(*handle),
            Self::Native(native) => (native.boxer)(session),
        }
    }
}

/// Boxes `args` in order, calls `callee` and roots the result.
pub(crate) fn invoke(
    session: &mut Session,
    callee: Value,
    path: &str,
    args: &[Arg],
    kwargs: &[(&str, Arg)],
) -> Result<Proxy> {
    let positional = args
        .iter()
        .map(|arg| arg.to_runtime(session))
        .collect::<Result<Vec<_>>>()?;
    let keywords = kwargs
        .iter()
        .map(|(name, arg)| Ok(((*name).to_owned(), arg.to_runtime(session)?)))
        .collect::<Result<Vec<_>>>()?;
    tracing::trace!(path, args = positional.len(), kwargs = keywords.len(), "call");
    let result = session.rt.call(callee, &positional, &keywords);
    check(&mut session.rt, Crossing::Call { path })?;
    let proxy = Proxy::detached(session, result, format!("{path}(...)"));
    session.rt.maybe_collect();
    Ok(proxy)
}
