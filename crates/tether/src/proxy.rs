//! Proxies over runtime-resident values.
//!
//! A [`Proxy`] is a cheap `Arc` handle to one proxy state. Each state owns
//! exactly one GC-root registration, taken when the state is created and
//! released when the last clone drops. For navigated proxies the same
//! registration also pins the container the value was read from, so the
//! location stays assignable even after the parent proxy is gone.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tether_vm::{RootId, Value};

use crate::{
    bridge::{Bridge, ToRuntime},
    call::{Arg, invoke},
    error::{Error, Result},
    exception::{Crossing, check},
    session::{Session, release_root, with_session},
};

/// One step of a navigation path: a binding/key/attribute name or a position.
pub use tether_vm::Key as PathKey;

/// Opaque, copyable reference to a runtime value.
///
/// A handle does not keep its value alive. It stays valid while some proxy
/// pins the value; a bare handle from [`box_value`](crate::box_value) is valid
/// until the next evaluation or call that triggers a collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    value: Value,
    epoch: u64,
}

impl Handle {
    pub(crate) fn new(value: Value, epoch: u64) -> Self {
        Self { value, epoch }
    }

    pub(crate) fn value(self) -> Value {
        self.value
    }

    pub(crate) fn epoch(self) -> u64 {
        self.epoch
    }
}

struct ProxyState {
    epoch: u64,
    root: RootId,
    /// Last value seen through this proxy; refreshed by `assign`.
    handle: Mutex<Value>,
    /// Key under which the value was found in its anchor container.
    key: Option<PathKey>,
    parent: Option<Weak<ProxyState>>,
    path: String,
    mutable: bool,
}

impl Drop for ProxyState {
    fn drop(&mut self) {
        release_root(self.epoch, self.root);
    }
}

/// Host-side handle to a value living inside the runtime.
#[derive(Clone)]
pub struct Proxy(Arc<ProxyState>);

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("path", &self.0.path)
            .field("handle", &*self.0.handle.lock())
            .field("mutable", &self.0.mutable)
            .finish()
    }
}

impl Proxy {
    fn with_state(session: &mut Session, value: Value, anchor: Option<Value>, build: impl FnOnce(RootId) -> ProxyState) -> Self {
        let root = session.rt.root(value, anchor);
        Self(Arc::new(build(root)))
    }

    pub(crate) fn root_module(session: &mut Session, module: Value, name: &str) -> Self {
        Self::detached(session, module, name)
    }

    /// A proxy without a location: evaluation and call results, unboxed values.
    pub(crate) fn detached(session: &mut Session, value: Value, path: impl Into<String>) -> Self {
        let epoch = session.epoch;
        let path = path.into();
        Self::with_state(session, value, None, |root| ProxyState {
            epoch,
            root,
            handle: Mutex::new(value),
            key: None,
            parent: None,
            path,
            mutable: false,
        })
    }

    fn child(session: &mut Session, parent: &Self, key: PathKey, container: Value, value: Value) -> Self {
        let epoch = session.epoch;
        let path = child_path(session, &parent.0.path, container, &key);
        let mutable = session.rt.is_mutable_container(container);
        Self::with_state(session, value, Some(container), |root| ProxyState {
            epoch,
            root,
            handle: Mutex::new(value),
            key: Some(key),
            parent: Some(Arc::downgrade(&parent.0)),
            path,
            mutable,
        })
    }

    /// Boxes a host value and pins it behind a new proxy.
    pub fn from_value<T: ToRuntime>(value: T) -> Result<Self> {
        with_session(|session| {
            let value = value.to_runtime(session)?;
            Ok(Self::detached(session, value, "<boxed>"))
        })
    }

    /// The proxied value, validated against the current session.
    pub(crate) fn live_value(&self, session: &Session) -> Result<Value> {
        if self.0.epoch != session.epoch {
            return Err(Error::StaleHandle);
        }
        session.rt.rooted_value(self.0.root).ok_or(Error::StaleHandle)
    }

    /// Navigates one step: performs exactly one runtime lookup of `self[key]`.
    pub fn get(&self, key: impl Into<PathKey>) -> Result<Self> {
        let key = key.into();
        with_session(|session| {
            let container = self.live_value(session)?;
            tracing::trace!(path = %self.0.path, key = %key, "navigate");
            let value = session.rt.lookup(container, &key);
            check(
                &mut session.rt,
                Crossing::Navigate {
                    path: &self.0.path,
                    key: &key,
                },
            )?;
            Ok(Self::child(session, self, key, container, value))
        })
    }

    /// Navigates several steps, one lookup per step.
    pub fn path<K: Into<PathKey>>(&self, keys: impl IntoIterator<Item = K>) -> Result<Self> {
        keys.into_iter().try_fold(self.clone(), |proxy, key| proxy.get(key))
    }

    /// Converts the proxied value into a host value.
    pub fn cast<T: Bridge>(&self) -> Result<T> {
        with_session(|session| {
            let value = self.live_value(session)?;
            T::from_runtime(value, session)
        })
    }

    /// Calls the proxied value with positional arguments.
    pub fn call(&self, args: &[Arg]) -> Result<Self> {
        self.call_with_kwargs(args, &[])
    }

    /// Calls the proxied value with positional and keyword arguments.
    pub fn call_with_kwargs(&self, args: &[Arg], kwargs: &[(&str, Arg)]) -> Result<Self> {
        with_session(|session| {
            let callee = self.live_value(session)?;
            if !session.rt.is_callable(callee) {
                return Err(Error::NotCallable {
                    path: self.0.path.clone(),
                    type_name: session.rt.type_name(callee).to_owned(),
                });
            }
            invoke(session, callee, &self.0.path, args, kwargs)
        })
    }

    /// `self.name(args...)`: navigation followed by a call.
    pub fn call_method(&self, name: &str, args: &[Arg]) -> Result<Self> {
        self.get(name)?.call(args)
    }

    /// Rebinds the location this proxy was navigated from.
    ///
    /// The cached handle of this proxy is updated; other proxies that cached the
    /// old value keep it until they navigate again.
    pub fn assign<T: ToRuntime>(&self, value: T) -> Result<()> {
        with_session(|session| {
            self.live_value(session)?;
            let (Some(key), Some(anchor), true) = (&self.0.key, session.rt.rooted_anchor(self.0.root), self.0.mutable)
            else {
                return Err(Error::Immutable {
                    path: self.0.path.clone(),
                });
            };
            let value = value.to_runtime(session)?;
            tracing::trace!(path = %self.0.path, "assign");
            session.rt.store(anchor, key, value);
            check(&mut session.rt, Crossing::Assign { path: &self.0.path })?;
            session.rt.reroot(self.0.root, value);
            *self.0.handle.lock() = value;
            Ok(())
        })
    }

    /// Stores `value` under `key` inside the proxied container.
    ///
    /// Unlike [`Proxy::assign`] this can create new bindings, e.g. a new name in `Main`.
    pub fn set<T: ToRuntime>(&self, key: impl Into<PathKey>, value: T) -> Result<()> {
        let key = key.into();
        with_session(|session| {
            let container = self.live_value(session)?;
            if !session.rt.is_mutable_container(container) {
                return Err(Error::Immutable {
                    path: child_path(session, &self.0.path, container, &key),
                });
            }
            let value = value.to_runtime(session)?;
            session.rt.store(container, &key, value);
            check(&mut session.rt, Crossing::Assign { path: &self.0.path })
        })
    }

    /// Runtime type name of the proxied value.
    pub fn type_name(&self) -> Result<String> {
        with_session(|session| {
            let value = self.live_value(session)?;
            Ok(session.rt.type_name(value).to_owned())
        })
    }

    /// Runtime `repr()` of the proxied value.
    pub fn repr(&self) -> Result<String> {
        with_session(|session| {
            let value = self.live_value(session)?;
            Ok(session.rt.repr(value))
        })
    }

    pub fn is_callable(&self) -> Result<bool> {
        with_session(|session| {
            let value = self.live_value(session)?;
            Ok(session.rt.is_callable(value))
        })
    }

    /// Cached handle; does not cross into the runtime.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle::new(*self.0.handle.lock(), self.0.epoch)
    }

    /// Key this proxy was navigated through, if any.
    #[must_use]
    pub fn key(&self) -> Option<&PathKey> {
        self.0.key.as_ref()
    }

    /// Human-readable origin path, e.g. `Main.config["items"][2]`.
    #[must_use]
    pub fn path_string(&self) -> &str {
        &self.0.path
    }

    /// The proxy this one was navigated from, while it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Self)
    }

    /// Whether [`Proxy::assign`] can succeed.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.0.mutable
    }

    /// Whether both proxies share one registration (are clones of each other).
    #[must_use]
    pub fn same_state(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn child_path(session: &Session, parent: &str, container: Value, key: &PathKey) -> String {
    match key {
        PathKey::Name(name) if session.rt.type_name(container) == "module" => format!("{parent}.{name}"),
        PathKey::Name(name) => format!("{parent}[{name:?}]"),
        PathKey::Index(index) => format!("{parent}[{index}]"),
    }
}

impl From<&Proxy> for Arg {
    fn from(proxy: &Proxy) -> Self {
        Self::Runtime(proxy.handle())
    }
}
