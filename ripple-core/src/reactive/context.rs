//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a cell is read, the current
//! effect is subscribed to that cell's dependency set.
//!
//! # Implementation
//!
//! Each runtime owns a LIFO stack of entries. Running an effect pushes it;
//! the returned guard pops it when dropped, so the stack stays balanced even
//! if the effect body panics. Nested runs (a computed getter reading another
//! computed, an effect constructing an effect) restore the correct enclosing
//! effect on exit rather than clearing it.
//!
//! An entry may also be the *untracked sentinel*: while it is on top, reads
//! are not attributed to anyone. Watch callbacks run under the sentinel.

use std::cell::RefCell;

use super::effect::Effect;
use super::runtime::Runtime;
use super::SubscriberId;

/// Stack of running effects for one runtime.
#[derive(Default)]
pub(crate) struct EffectStack {
    entries: RefCell<Vec<Option<Effect>>>,
}

impl EffectStack {
    /// Push an entry. `None` suspends tracking until the guard drops.
    pub(crate) fn enter(&self, entry: Option<Effect>) -> StackGuard<'_> {
        let expected = entry.as_ref().map(Effect::id);
        self.entries.borrow_mut().push(entry);
        StackGuard {
            stack: self,
            expected,
        }
    }

    /// The effect that should receive dependencies right now.
    pub(crate) fn current(&self) -> Option<Effect> {
        self.entries.borrow().last().cloned().flatten()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Guard that pops the stack entry when dropped.
pub(crate) struct StackGuard<'a> {
    stack: &'a EffectStack,
    expected: Option<SubscriberId>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.entries.borrow_mut().pop();

        // Catch mismatched push/pop pairs in debug builds.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Effect::id),
                self.expected,
                "effect stack mismatch"
            );
        }
    }
}

/// Run `f` without attributing any reads to the current effect.
///
/// ```rust,ignore
/// effect(move || {
///     let tracked = a.get();
///     let peeked = untrack(|| b.get()); // changes to `b` won't re-run us
/// });
/// ```
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let runtime = Runtime::current();
    let inner = runtime.inner();
    let _guard = inner.stack.enter(None);
    f()
}

/// Check whether a read right now would be tracked.
pub fn is_tracking() -> bool {
    Runtime::current().inner().stack.current().is_some()
}

/// The subscriber that a read right now would be attributed to.
pub fn current_subscriber() -> Option<SubscriberId> {
    Runtime::current().inner().stack.current().map(|effect| effect.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Ref};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn no_tracking_outside_effects() {
        assert!(!is_tracking());
        assert!(current_subscriber().is_none());
    }

    #[test]
    fn effect_is_current_while_running() {
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();

        let e = effect(move || {
            seen_clone.set(current_subscriber());
        });

        assert_eq!(seen.get(), Some(e.id()));

        // Context should be cleaned up after the run
        assert!(current_subscriber().is_none());
    }

    #[test]
    fn nested_effects_restore_outer() {
        let after_inner = Rc::new(Cell::new(None));
        let after_clone = after_inner.clone();

        let outer = effect(move || {
            let _inner = effect(|| {});
            after_clone.set(current_subscriber());
        });

        // After the inner effect finishes, the outer one is current again
        assert_eq!(after_inner.get(), Some(outer.id()));
    }

    #[test]
    fn untrack_suspends_subscription() {
        let count = Ref::new(0);
        let runs = Rc::new(Cell::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _e = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            untrack(|| {
                assert!(!is_tracking());
                count_clone.get()
            });
        });

        assert_eq!(count.dep().subscriber_count(), 0);
        count.set(1);
        Runtime::current().tick().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn stack_is_balanced_after_panic() {
        let runtime = Runtime::current();
        let depth = runtime.inner().stack.depth();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _e = effect(|| panic!("boom"));
        }));

        assert!(result.is_err());
        assert_eq!(runtime.inner().stack.depth(), depth);
        assert!(current_subscriber().is_none());
    }
}
