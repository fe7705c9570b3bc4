//! Computed Implementation
//!
//! A Computed is a derived value that caches its result and only recomputes
//! when it is read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. Construction creates a *notifier*: a sync effect whose body runs the
//!    getter and stores the result. It runs once right away, which both
//!    fills the cache and discovers the dependencies.
//!
//! 2. When a dependency changes, the notifier does not re-run. Its trigger
//!    hook marks the computed dirty and triggers the computed's own reader
//!    set, so whoever read the computed hears about the change.
//!
//! 3. A read recomputes if the computed is dirty, tracks the reader set,
//!    and returns the cache. Between reads the getter never runs, no matter
//!    how many writes happen.
//!
//! Because the notifier is sync, a computed is already marked dirty by the
//! time the write that invalidated it returns, and a read right after the
//! write is fresh without waiting for a flush.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::untrack;
use super::dep::Dep;
use super::effect::{Effect, EffectOptions, Stoppable};

/// A cached derived value.
///
/// Read-only: the only way to change what it returns is to change what the
/// getter reads.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(2);
///
/// let count_clone = count.clone();
/// let doubled = computed(move || count_clone.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T: 'static> {
    getter: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    readers: Dep,
    notifier: Effect,
}

impl<T: 'static> Computed<T> {
    /// Create a computed in the current runtime and evaluate it once.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let recompute: Rc<dyn Fn()> = {
                let this = this.clone();
                Rc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        inner.recompute();
                    }
                })
            };
            let invalidate: Rc<dyn Fn()> = {
                let this = this.clone();
                Rc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        inner.invalidate();
                    }
                })
            };

            ComputedInner {
                getter: Box::new(getter),
                value: RefCell::new(None),
                dirty: Cell::new(false),
                readers: Dep::new(),
                notifier: Effect::create(
                    recompute,
                    Some(invalidate),
                    EffectOptions { sync: true },
                ),
            }
        });

        inner.notifier.run();
        Self { inner }
    }

    /// Borrow the current value, recomputing first if it is stale.
    ///
    /// Tracks the read, so the running effect re-runs when the value may
    /// have changed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = &self.inner;
        if inner.dirty.get() {
            inner.notifier.run();
        }
        inner.readers.track();

        {
            let cached = inner.value.borrow();
            if let Some(value) = cached.as_ref() {
                return f(value);
            }
        }

        // The notifier was stopped before its first run: created inside a
        // stopped scope, or its runtime is gone. Evaluate once and freeze.
        let value = untrack(|| (inner.getter)());
        inner.value.replace(Some(value));
        self.with(f)
    }

    /// Whether the cache is stale.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// The reader dependency set.
    pub fn dep(&self) -> &Dep {
        &self.inner.readers
    }

    /// Stop tracking dependencies. The last cached value is kept and
    /// returned by every later read.
    pub fn stop(&self) {
        self.inner.notifier.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.notifier.is_stopped()
    }

    /// Whether two handles refer to the same computed.
    pub fn ptr_eq(&self, other: &Computed<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get a copy of the current value, recomputing first if it is stale.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T: 'static> ComputedInner<T> {
    fn recompute(&self) {
        let value = (self.getter)();
        let previous = self.value.replace(Some(value));
        drop(previous);
        self.dirty.set(false);
        tracing::trace!(notifier = %self.notifier.id(), "computed refreshed");
    }

    fn invalidate(&self) {
        if !self.dirty.replace(true) {
            self.readers.trigger();
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.notifier.stop();
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Stoppable for Computed<T> {
    fn stop(&self) {
        Computed::stop(self);
    }

    fn is_stopped(&self) -> bool {
        Computed::is_stopped(self)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.is_dirty())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create a computed in the current runtime.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, EffectScope, Ref, Runtime};

    fn counted<T: 'static>(
        getter: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let c = computed(move || {
            calls_clone.set(calls_clone.get() + 1);
            getter()
        });
        (c, calls)
    }

    #[test]
    fn computed_evaluates_on_creation() {
        let count = Ref::new(2);
        let count_clone = count.clone();
        let (doubled, calls) = counted(move || count_clone.get() * 2);

        assert_eq!(calls.get(), 1);
        assert!(!doubled.is_dirty());
        assert_eq!(doubled.get(), 4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_is_lazy_between_reads() {
        let count = Ref::new(0);
        let count_clone = count.clone();
        let (doubled, calls) = counted(move || count_clone.get() * 2);

        count.set(1);
        count.set(2);
        count.set(3);

        // Marked dirty, but nothing recomputed yet
        assert!(doubled.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get(), 6);
        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_is_fresh_without_flush() {
        let runtime = Runtime::new();
        let _guard = runtime.enter();

        let count = Ref::new(1);
        let count_clone = count.clone();
        let plus_one = computed(move || count_clone.get() + 1);

        count.set(10);
        assert!(!runtime.is_flush_pending());
        assert_eq!(plus_one.get(), 11);
    }

    #[test]
    fn computed_chain() {
        let base = Ref::new(1);

        let base_clone = base.clone();
        let doubled = computed(move || base_clone.get() * 2);

        let doubled_clone = doubled.clone();
        let (quadrupled, calls) = counted(move || doubled_clone.get() * 2);

        base.set(5);
        assert!(doubled.is_dirty());
        assert!(quadrupled.is_dirty());
        assert_eq!(quadrupled.get(), 20);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn effect_reruns_when_computed_changes() {
        let runtime = Runtime::new();
        let _guard = runtime.enter();

        let count = Ref::new(1);
        let count_clone = count.clone();
        let doubled = computed(move || count_clone.get() * 2);

        let seen = Rc::new(Cell::new(0));
        let (doubled_clone, seen_clone) = (doubled.clone(), seen.clone());
        let _e = effect(move || seen_clone.set(doubled_clone.get()));
        assert_eq!(seen.get(), 2);

        count.set(4);
        runtime.tick().unwrap();
        assert_eq!(seen.get(), 8);
    }

    #[test]
    fn stopped_computed_keeps_last_value() {
        let count = Ref::new(1);
        let count_clone = count.clone();
        let (doubled, calls) = counted(move || count_clone.get() * 2);

        doubled.stop();
        assert!(doubled.is_stopped());

        count.set(3);
        assert_eq!(doubled.get(), 2);
        assert_eq!(calls.get(), 1);
        assert_eq!(count.dep().subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_last_handle_stops_the_notifier() {
        let runtime = Runtime::new();
        let _guard = runtime.enter();

        let count = Ref::new(1);
        let count_clone = count.clone();
        let doubled = computed(move || count_clone.get() * 2);
        let second = doubled.clone();
        assert_eq!(runtime.live_effects(), 1);

        drop(doubled);
        assert_eq!(runtime.live_effects(), 1);

        drop(second);
        assert_eq!(runtime.live_effects(), 0);
        assert_eq!(count.dep().subscriber_count(), 0);
    }

    #[test]
    fn computed_over_non_clone_value() {
        let items = Ref::new(vec![1, 2, 3]);
        let items_clone = items.clone();
        let sum = computed(move || items_clone.with(|items| items.iter().sum::<i32>()));

        let names = computed(|| vec![String::from("a"), String::from("b")]);
        assert_eq!(names.with(|names| names.len()), 2);

        items.push(4);
        assert_eq!(sum.get(), 10);
    }

    #[test]
    fn computed_in_stopped_scope_evaluates_once_untracked() {
        let runtime = Runtime::new();
        let _guard = runtime.enter();

        let scope = EffectScope::new();
        scope.stop();

        let count = Ref::new(3);
        let count_clone = count.clone();
        let (tripled, calls) = scope.run(|| counted(move || count_clone.get() * 3));
        assert!(tripled.is_stopped());
        assert_eq!(calls.get(), 0);

        let runs = Rc::new(Cell::new(0));
        let (tripled_clone, runs_clone) = (tripled.clone(), runs.clone());
        let _e = effect(move || {
            tripled_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        assert_eq!(tripled.get(), 9);
        assert_eq!(calls.get(), 1);

        // The getter's read was not attributed to the effect
        count.set(4);
        runtime.tick().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(tripled.get(), 9);
    }
}
