//! Dependency Sets
//!
//! A `Dep` is the set of effects subscribed to one reactive cell: a ref's
//! value slot, one property of a reactive object, or one array. It is the
//! substrate every reactive container is built on.
//!
//! # Tracking
//!
//! `track` subscribes the currently running effect. Membership is
//! idempotent: an effect that reads the same cell twice during one run is
//! subscribed once, and the dep is recorded once in the effect's reverse
//! index. The reverse index is what lets an effect unsubscribe from every
//! cell it read before it runs again.
//!
//! # Triggering
//!
//! `trigger` snapshots the subscriber set before notifying anyone, because
//! running a subscriber re-tracks it and mutates the live set. Subscribers
//! are notified in the order they first subscribed.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::effect::{Effect, EffectInner};
use super::runtime::{Runtime, RuntimeInner};
use super::SubscriberId;

/// The set of effects currently subscribed to one reactive cell.
///
/// Cloning a `Dep` yields another handle to the same set.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    runtime: Weak<RuntimeInner>,
    subscribers: RefCell<IndexMap<SubscriberId, Weak<EffectInner>>>,
}

impl Dep {
    /// Create an empty dependency set in the current runtime.
    pub fn new() -> Self {
        Self::in_runtime(&Runtime::current())
    }

    /// Create an empty dependency set bound to `runtime`.
    pub fn in_runtime(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(DepInner {
                runtime: Rc::downgrade(runtime.inner()),
                subscribers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Subscribe the running effect, if there is one.
    pub fn track(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        let Some(active) = runtime.stack.current() else {
            return;
        };
        if active.is_stopped() {
            return;
        }

        let newly_added = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            if subscribers.contains_key(&active.id()) {
                false
            } else {
                subscribers.insert(active.id(), active.downgrade());
                true
            }
        };

        if newly_added {
            active.record_dep(self.clone());
        }
    }

    /// Notify every subscriber that the cell changed.
    pub fn trigger(&self) {
        let snapshot: SmallVec<[Effect; 8]> = self
            .inner
            .subscribers
            .borrow()
            .values()
            .filter_map(Effect::upgrade)
            .collect();

        if snapshot.is_empty() {
            return;
        }

        tracing::trace!(subscribers = snapshot.len(), "triggering dependency set");

        for effect in snapshot {
            effect.notify();
        }
    }

    /// Number of effects currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Whether `effect` is currently subscribed.
    pub fn contains(&self, effect: &Effect) -> bool {
        self.inner.subscribers.borrow().contains_key(&effect.id())
    }

    /// Whether two handles refer to the same set.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The runtime this set belongs to, if it is still alive.
    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        self.inner.subscribers.borrow_mut().shift_remove(&id);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
