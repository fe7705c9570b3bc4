//! Reactive Objects
//!
//! `Reactive` is the explicit replacement for a property-intercepting
//! proxy. Instead of trapping arbitrary field access it offers accessor
//! methods that do the tracking and triggering:
//!
//! - [`Reactive::get`] tracks the property's dependency set and wraps
//!   nested objects (as reactive objects) and arrays (by patching them in
//!   place) on the way out, so deep chains become reactive on first
//!   traversal.
//! - [`Reactive::set`] writes through to the target and triggers the
//!   property's set, unless the value is the same value as before.
//! - [`Reactive::keys`] tracks the key list, which additions and removals
//!   trigger.
//!
//! # Identity
//!
//! Each runtime keeps a cache from target object to proxy, so wrapping the
//! same object twice yields the same proxy for as long as one is alive. The
//! cache only holds weak references; dead entries are swept once the cache
//! grows past `RuntimeConfig::proxy_cache_prune_threshold`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::clone;
use super::{Data, FromData, Object};
use crate::reactive::{Runtime, RuntimeInner};

/// A tracked view of an [`Object`].
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

pub(crate) struct ReactiveInner {
    target: Object,
    runtime: Weak<RuntimeInner>,
}

impl Reactive {
    /// The proxy for `target` in the current runtime.
    pub fn new(target: &Object) -> Self {
        Self::in_runtime(target, &Runtime::current())
    }

    /// The proxy for `target` in `runtime`.
    pub fn in_runtime(target: &Object, runtime: &Runtime) -> Self {
        runtime.inner().proxies.get_or_create(target, runtime)
    }

    /// The wrapped object. Reads and writes through it are untracked.
    pub fn target(&self) -> &Object {
        &self.inner.target
    }

    /// Read a property, tracking it.
    pub fn get(&self, key: &str) -> Option<Data> {
        let runtime = self.runtime();
        if let Some(runtime) = &runtime {
            self.inner.target.property_dep(key, runtime).track();
        }

        let value = self.inner.target.get(key)?;
        Some(match runtime {
            Some(runtime) => wrap_nested(value, &runtime),
            None => value,
        })
    }

    /// Read a property as a concrete type, tracking it.
    pub fn get_as<V: FromData>(&self, key: &str) -> Option<V> {
        self.get(key).as_ref().and_then(V::from_data)
    }

    /// Whether the property exists, tracking it.
    pub fn contains_key(&self, key: &str) -> bool {
        if let Some(runtime) = self.runtime() {
            self.inner.target.property_dep(key, &runtime).track();
        }
        self.inner.target.contains_key(key)
    }

    /// Write a property and notify its subscribers.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Data>) {
        let key = key.into();
        let value = value.into().into_raw();

        let existed = match self.inner.target.get(&key) {
            Some(current) if current.same_value(&value) => return,
            Some(_) => true,
            None => false,
        };

        let previous = self.inner.target.insert(key.clone(), value);
        drop(previous);

        if let Some(dep) = self.inner.target.existing_dep(&key) {
            dep.trigger();
        }
        if !existed {
            if let Some(dep) = self.inner.target.existing_keys_dep() {
                dep.trigger();
            }
        }
    }

    /// Remove a property and notify its subscribers.
    pub fn remove(&self, key: &str) -> Option<Data> {
        let removed = self.inner.target.remove(key)?;

        if let Some(dep) = self.inner.target.existing_dep(key) {
            dep.trigger();
        }
        if let Some(dep) = self.inner.target.existing_keys_dep() {
            dep.trigger();
        }
        Some(removed)
    }

    /// The property names, tracking the key list.
    pub fn keys(&self) -> Vec<String> {
        if let Some(runtime) = self.runtime() {
            self.inner.target.keys_dep(&runtime).track();
        }
        self.inner.target.keys()
    }

    /// Number of properties, tracking the key list.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every property reachable from this object, tracking all of them,
    /// and return a plain deep copy. Cycles are cut.
    pub fn traverse(&self) -> Data {
        clone::traverse(self)
    }

    /// Whether two handles are the same proxy.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Data::Reactive(self.clone()))
    }
}

/// Prepare a value read out of a reactive container.
fn wrap_nested(value: Data, runtime: &Runtime) -> Data {
    match value {
        Data::Object(object) => Data::Reactive(Reactive::in_runtime(&object, runtime)),
        Data::Array(array) => {
            array.ensure_dep(runtime);
            Data::Array(array)
        }
        other => other,
    }
}

/// Make a value reactive.
///
/// Objects come back as their (cached) [`Reactive`] proxy and arrays are
/// patched in place. Reactive objects are returned as they are. Anything
/// else is a misuse: it is logged and returned unchanged.
pub fn reactive(value: impl Into<Data>) -> Data {
    match value.into() {
        Data::Object(object) => Data::Reactive(Reactive::new(&object)),
        Data::Array(array) => {
            array.ensure_dep(&Runtime::current());
            Data::Array(array)
        }
        proxy @ Data::Reactive(_) => proxy,
        other => {
            tracing::warn!(
                kind = other.kind(),
                "reactive() expects an object or array, returning the value unchanged"
            );
            other
        }
    }
}

/// Target-to-proxy identity cache for one runtime.
pub(crate) struct ProxyCache {
    entries: RefCell<HashMap<usize, Weak<ReactiveInner>>>,
    base_threshold: usize,
    prune_at: Cell<usize>,
}

impl ProxyCache {
    pub(crate) fn new(prune_threshold: usize) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            base_threshold: prune_threshold,
            prune_at: Cell::new(prune_threshold),
        }
    }

    fn get_or_create(&self, target: &Object, runtime: &Runtime) -> Reactive {
        let key = target.addr();

        // A live proxy keeps its target alive, so a hit is always the same
        // object rather than a new one at a recycled address.
        let cached = self.entries.borrow().get(&key).and_then(Weak::upgrade);
        if let Some(inner) = cached {
            return Reactive { inner };
        }

        let proxy = Reactive {
            inner: Rc::new(ReactiveInner {
                target: target.clone(),
                runtime: Rc::downgrade(runtime.inner()),
            }),
        };

        let mut entries = self.entries.borrow_mut();
        entries.insert(key, Rc::downgrade(&proxy.inner));
        if entries.len() >= self.prune_at.get() {
            entries.retain(|_, proxy| proxy.strong_count() > 0);
            let next = (entries.len() * 2).max(self.base_threshold);
            tracing::debug!(live = entries.len(), next, "swept reactive proxy cache");
            self.prune_at.set(next);
        }

        proxy
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}
