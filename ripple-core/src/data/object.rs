//! Shared plain objects.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::Data;
use crate::reactive::{Dep, Runtime};

/// A shared, mutable, insertion-ordered map of named fields.
///
/// Cloning the handle does not copy the fields. Reads and writes through a
/// plain `Object` are untracked; wrap it in a
/// [`Reactive`](super::Reactive) to observe it.
#[derive(Clone, Default)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

#[derive(Default)]
pub(crate) struct ObjectInner {
    fields: RefCell<IndexMap<String, Data>>,
    /// Per-property dependency sets, created by reactive reads.
    deps: RefCell<IndexMap<String, Dep>>,
    /// Dependency set for the key list itself.
    keys_dep: RefCell<Option<Dep>>,
}

/// A non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Data>) -> Option<Data> {
        let value = value.into().into_raw();
        self.inner.fields.borrow_mut().insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<Data> {
        self.inner.fields.borrow().get(key).cloned()
    }

    /// Remove a field, keeping the order of the others.
    pub fn remove(&self, key: &str) -> Option<Data> {
        self.inner.fields.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Snapshot of every field, in insertion order.
    pub fn entries(&self) -> Vec<(String, Data)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Identity key for caches and cycle detection.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// The dependency set for `key`, created on first use.
    pub(crate) fn property_dep(&self, key: &str, runtime: &Runtime) -> Dep {
        if let Some(dep) = self.existing_dep(key) {
            return dep;
        }
        let dep = Dep::in_runtime(runtime);
        self.inner
            .deps
            .borrow_mut()
            .insert(key.to_string(), dep.clone());
        dep
    }

    pub(crate) fn existing_dep(&self, key: &str) -> Option<Dep> {
        self.inner.deps.borrow().get(key).cloned()
    }

    pub(crate) fn keys_dep(&self, runtime: &Runtime) -> Dep {
        self.inner
            .keys_dep
            .borrow_mut()
            .get_or_insert_with(|| Dep::in_runtime(runtime))
            .clone()
    }

    pub(crate) fn existing_keys_dep(&self) -> Option<Dep> {
        self.inner.keys_dep.borrow().clone()
    }
}

impl<K: Into<String>, V: Into<Data>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Data::Object(self.clone()))
    }
}
