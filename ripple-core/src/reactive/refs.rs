//! Ref Implementation
//!
//! A `Ref` is a boxed mutable cell. It owns exactly one dependency set for
//! the whole box: every read tracks it and every write triggers it.
//!
//! # How Refs Work
//!
//! 1. Reading with [`Ref::get`] or [`Ref::with`] inside an effect subscribes
//!    the effect.
//!
//! 2. [`Ref::set`] compares the new value with the old one through
//!    [`RefValue::same_value`] and skips the trigger when nothing changed.
//!
//! 3. [`Ref::update`] mutates in place and always triggers.
//!
//! # Arrays
//!
//! A `Ref<Vec<T>>` gets the seven classic mutators (`push`, `pop`, `shift`,
//! `unshift`, `splice`, `sort`, `reverse`) plus index assignment, all of
//! which trigger the ref's set.
//!
//! A `Ref<Data>` holding a [`Data::Array`] attaches its own dependency set
//! to the array, so mutating the array through any handle triggers the
//! ref's subscribers. Assigning a new array re-attaches the same set, and
//! array assignments are never elided.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::dep::Dep;
use crate::data::Data;

/// Values that can live in a [`Ref`].
///
/// Anything `PartialEq` qualifies. [`Data`] has its own implementation with
/// identity semantics for objects and arrays.
pub trait RefValue: 'static {
    /// Whether writing `other` over `self` would be a no-op.
    fn same_value(&self, other: &Self) -> bool;

    /// Called whenever the value is stored in a ref, with the ref's
    /// dependency set.
    fn adopt(&self, _dep: &Dep) {}
}

impl<T> RefValue for T
where
    T: PartialEq + 'static,
{
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefValue for Data {
    fn same_value(&self, other: &Self) -> bool {
        // Arrays must always propagate, even when re-assigned.
        if matches!(other, Data::Array(_)) {
            return false;
        }
        Data::same_value(self, other)
    }

    fn adopt(&self, dep: &Dep) {
        if let Data::Array(array) = self {
            array.attach_dep(dep.clone());
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Ref<T: 'static> {
    value: Rc<RefCell<T>>,
    dep: Dep,
}

impl<T: RefValue> Ref<T> {
    /// Create a new ref in the current runtime.
    pub fn new(value: T) -> Self {
        let dep = Dep::new();
        value.adopt(&dep);
        Self {
            value: Rc::new(RefCell::new(value)),
            dep,
        }
    }

    /// Replace the value and notify subscribers, unless it is the same value.
    pub fn set(&self, value: T) {
        if self.value.borrow().same_value(&value) {
            return;
        }

        value.adopt(&self.dep);
        let previous = std::mem::replace(&mut *self.value.borrow_mut(), value);
        drop(previous);

        self.dep.trigger();
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.value.borrow_mut());
        self.value.borrow().adopt(&self.dep);
        self.dep.trigger();
        result
    }
}

impl<T: 'static> Ref<T> {
    /// Borrow the value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.dep.track();
        f(&self.value.borrow())
    }

    /// Borrow the value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// The dependency set of this ref.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.value.borrow_mut());
        self.dep.trigger();
        result
    }
}

impl<T: Clone + 'static> Ref<T> {
    /// Get a copy of the value, tracking the read.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get a copy of the value without tracking.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: 'static> Ref<Vec<T>> {
    /// Number of elements, tracking the read.
    pub fn len(&self) -> usize {
        self.with(Vec::len)
    }

    /// Whether the vector is empty, tracking the read.
    pub fn is_empty(&self) -> bool {
        self.with(Vec::is_empty)
    }

    /// Append an element.
    pub fn push(&self, item: T) {
        self.mutate(|items| items.push(item));
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<T> {
        self.mutate(Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<T> {
        self.mutate(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Insert an element at the front.
    pub fn unshift(&self, item: T) {
        self.mutate(|items| items.insert(0, item));
    }

    /// Remove `delete_count` elements at `start` and insert `items` in their
    /// place. Out-of-range arguments are clamped. Returns the removed
    /// elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
        self.mutate(|current| {
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            current.splice(start..end, items).collect()
        })
    }

    /// Sort with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.mutate(|items| items.sort_by(compare));
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    /// Assign to an index. Returns `false` if the index is out of bounds.
    pub fn set_index(&self, index: usize, item: T) -> bool {
        if index >= self.value.borrow().len() {
            return false;
        }
        self.mutate(|items| items[index] = item);
        true
    }
}

impl<T: Ord + 'static> Ref<Vec<T>> {
    /// Sort in ascending order.
    pub fn sort(&self) {
        self.mutate(|items| items.sort());
    }
}

impl<T: Clone + 'static> Ref<Vec<T>> {
    /// Get a copy of the element at `index`, tracking the read.
    pub fn get_index(&self, index: usize) -> Option<T> {
        self.with(|items| items.get(index).cloned())
    }
}

impl<T: 'static> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            dep: self.dep.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.value.borrow())
            .field("subscriber_count", &self.dep.subscriber_count())
            .finish()
    }
}

/// Create a ref in the current runtime.
pub fn new_ref<T: RefValue>(value: T) -> Ref<T> {
    Ref::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
