//! Shared arrays with in-place change notification.
//!
//! An array starts out plain. Once a dependency set is attached (a ref
//! adopting it, or a reactive object handing it out) the array is
//! *patched*: its reads track that set and its mutators trigger it. The set
//! lives on the array itself, so every handle to the array sees the same
//! behavior.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::{Data, Reactive};
use crate::reactive::{Dep, Runtime};

/// Largest run of null padding a single out-of-bounds write may create.
pub const MAX_PADDING: usize = 4096;

/// A shared, mutable list of [`Data`] values.
#[derive(Clone, Default)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

#[derive(Default)]
struct ArrayInner {
    items: RefCell<Vec<Data>>,
    dep: RefCell<Option<Dep>>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`. Objects in a patched array come back wrapped
    /// as reactive objects.
    pub fn get(&self, index: usize) -> Option<Data> {
        self.track();
        let item = self.inner.items.borrow().get(index).cloned()?;
        Some(self.wrap(item))
    }

    /// Every element, wrapped like [`Array::get`].
    pub fn to_vec(&self) -> Vec<Data> {
        self.track();
        let items = self.inner.items.borrow().clone();
        items.into_iter().map(|item| self.wrap(item)).collect()
    }

    /// Every element as stored, without tracking or wrapping.
    pub fn to_vec_untracked(&self) -> Vec<Data> {
        self.inner.items.borrow().clone()
    }

    pub fn push(&self, item: impl Into<Data>) {
        let item = item.into().into_raw();
        self.mutate(|items| items.push(item));
    }

    pub fn pop(&self) -> Option<Data> {
        self.mutate(Vec::pop)
    }

    pub fn shift(&self) -> Option<Data> {
        self.mutate(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    pub fn unshift(&self, item: impl Into<Data>) {
        let item = item.into().into_raw();
        self.mutate(|items| items.insert(0, item));
    }

    /// Remove `delete_count` elements at `start` and insert `items` in their
    /// place. Out-of-range arguments are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Data>) -> Vec<Data> {
        let items: Vec<Data> = items.into_iter().map(Data::into_raw).collect();
        self.mutate(|current| {
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            current.splice(start..end, items).collect()
        })
    }

    pub fn sort_by(&self, compare: impl FnMut(&Data, &Data) -> Ordering) {
        self.mutate(|items| items.sort_by(compare));
    }

    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    /// Assign to an index, padding with nulls when writing past the end.
    ///
    /// Returns `false` and leaves the array untouched if the write would
    /// need more than [`MAX_PADDING`] nulls.
    pub fn set(&self, index: usize, item: impl Into<Data>) -> bool {
        let len = self.inner.items.borrow().len();
        let new_len = match index.checked_add(1) {
            Some(new_len) if index <= len.saturating_add(MAX_PADDING) => new_len,
            _ => {
                tracing::warn!(index, len, "array write too far out of bounds, ignored");
                return false;
            }
        };

        let item = item.into().into_raw();
        self.mutate(|items| {
            if new_len > items.len() {
                items.resize(new_len, Data::Null);
            }
            items[index] = item;
        });
        true
    }

    /// The attached dependency set, if the array has been patched.
    pub fn dep(&self) -> Option<Dep> {
        self.inner.dep.borrow().clone()
    }

    pub fn is_reactive(&self) -> bool {
        self.inner.dep.borrow().is_some()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// Replace the attached dependency set.
    pub(crate) fn attach_dep(&self, dep: Dep) {
        *self.inner.dep.borrow_mut() = Some(dep);
    }

    /// Attach a fresh dependency set unless one is present.
    pub(crate) fn ensure_dep(&self, runtime: &Runtime) {
        let mut dep = self.inner.dep.borrow_mut();
        if dep.is_none() {
            *dep = Some(Dep::in_runtime(runtime));
        }
    }

    fn track(&self) {
        if let Some(dep) = self.dep() {
            dep.track();
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Data>) -> R) -> R {
        let result = f(&mut self.inner.items.borrow_mut());
        if let Some(dep) = self.dep() {
            dep.trigger();
        }
        result
    }

    fn wrap(&self, item: Data) -> Data {
        let Data::Object(object) = item else {
            return item;
        };
        match self.dep().and_then(|dep| dep.runtime()) {
            Some(runtime) => Data::Reactive(Reactive::in_runtime(&object, &runtime)),
            None => Data::Object(object),
        }
    }
}

impl From<Vec<Data>> for Array {
    fn from(items: Vec<Data>) -> Self {
        items.into_iter().collect()
    }
}

impl<T: Into<Data>> FromIterator<T> for Array {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items = iter.into_iter().map(|item| item.into().into_raw()).collect();
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                dep: RefCell::new(None),
            }),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Data::Array(self.clone()))
    }
}
