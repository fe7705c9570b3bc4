//! Effect Scheduler
//!
//! The scheduler decides *when* batched effects run. Triggering a batched
//! effect only inserts it into an ordered set; the set is drained by a
//! deferred flush that the runtime requests from its [`Host`](super::Host)
//! the first time an idle queue receives an entry.
//!
//! # Algorithm
//!
//! 1. `queue` inserts into an `IndexMap` keyed by subscriber id. Inserting
//!    an effect that is already queued is a no-op, which is what collapses
//!    several triggers in one tick into a single run.
//!
//! 2. `flush` takes the whole queue and runs every member that has not been
//!    stopped, in insertion order.
//!
//! 3. Running effects may write to cells other effects read, queueing more
//!    work. `flush` loops until the queue stays empty, but gives up after
//!    `max_iterations` passes: the queue is cleared and
//!    [`ReactiveError::InfiniteLoop`] is returned.
//!
//! If an effect panics mid-batch, the members that had not run yet go back
//! to the front of the queue and the flush is marked pending again before
//! the panic propagates.
//!
//! Sync effects never pass through here.
//!
//! No ordering is promised between effects beyond insertion order; in
//! particular there is no topological sort.

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;

use super::effect::Effect;
use super::SubscriberId;
use crate::error::{ReactiveError, Result};

/// Batching queue for one runtime.
pub(crate) struct Scheduler {
    queue: RefCell<IndexMap<SubscriberId, Effect>>,
    flushing: Cell<bool>,
    flush_pending: Cell<bool>,
    max_iterations: usize,
}

impl Scheduler {
    pub(crate) fn new(max_iterations: usize) -> Self {
        Self {
            queue: RefCell::new(IndexMap::new()),
            flushing: Cell::new(false),
            flush_pending: Cell::new(false),
            max_iterations,
        }
    }

    /// Queue an effect.
    ///
    /// Returns `true` when the caller must request a deferred flush.
    pub(crate) fn queue(&self, effect: Effect) -> bool {
        self.queue.borrow_mut().entry(effect.id()).or_insert(effect);

        if self.flushing.get() || self.flush_pending.get() {
            return false;
        }
        self.flush_pending.set(true);
        true
    }

    /// Drop a pending entry, if any.
    pub(crate) fn dequeue(&self, id: SubscriberId) {
        let removed = self.queue.borrow_mut().shift_remove(&id);
        drop(removed);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Drain the queue. Returns the number of effect runs performed.
    ///
    /// A flush started while another one is in progress returns `Ok(0)`;
    /// the outer flush picks up whatever was queued.
    pub(crate) fn flush(&self) -> Result<usize> {
        if self.flushing.get() {
            return Ok(0);
        }

        let _flushing = FlushGuard::enter(&self.flushing);
        self.flush_pending.set(false);

        let mut runs = 0;
        let mut iterations = 0;

        loop {
            let batch = std::mem::take(&mut *self.queue.borrow_mut());
            if batch.is_empty() {
                break;
            }

            iterations += 1;
            if iterations > self.max_iterations {
                let pending = batch.len();
                drop(batch);
                self.queue.borrow_mut().clear();
                tracing::error!(
                    iterations = self.max_iterations,
                    pending,
                    "possible infinite reactive loop, effect queue cleared"
                );
                return Err(ReactiveError::InfiniteLoop {
                    iterations: self.max_iterations,
                    pending,
                });
            }

            tracing::trace!(iteration = iterations, queued = batch.len(), "flushing effect queue");

            let mut remainder = Remainder {
                scheduler: self,
                rest: batch.into_iter(),
            };
            while let Some((_, effect)) = remainder.rest.next() {
                if effect.is_stopped() {
                    continue;
                }
                effect.run();
                runs += 1;
            }
        }

        Ok(runs)
    }
}

/// The unrun tail of a batch. Put back into the queue when an effect
/// panics, so nothing queued is silently lost.
struct Remainder<'a> {
    scheduler: &'a Scheduler,
    rest: indexmap::map::IntoIter<SubscriberId, Effect>,
}

impl Drop for Remainder<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }

        let mut queue = self.scheduler.queue.borrow_mut();
        let queued_since = std::mem::take(&mut *queue);
        queue.extend(self.rest.by_ref());
        queue.extend(queued_since);

        if !queue.is_empty() {
            self.scheduler.flush_pending.set(true);
            tracing::warn!(requeued = queue.len(), "effect panicked during flush, batch remainder requeued");
        }
    }
}

/// Clears the flushing flag on exit, including when an effect panics.
struct FlushGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlushGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}
