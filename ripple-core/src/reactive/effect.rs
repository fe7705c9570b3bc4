//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever one of
//! the cells it read on its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to discover
//!    its initial dependencies.
//!
//! 2. Before every run it unsubscribes from all dependencies of the
//!    previous run, so a function that conditionally reads different cells
//!    never keeps stale subscriptions.
//!
//! 3. During the run it sits on top of the runtime's effect stack, and
//!    every tracked read subscribes it.
//!
//! 4. When a dependency changes, a *sync* effect runs right away inside the
//!    trigger; a *batched* effect (the default) is queued and runs on the
//!    next scheduler flush. Several triggers in one tick collapse into one
//!    run.
//!
//! # Lifetime
//!
//! An effect lives until [`Effect::stop`] is called, directly or through the
//! [`EffectScope`](super::EffectScope) that was active when it was created.
//! Stopping is idempotent, removes any pending scheduler entry, and drops
//! the effect's closure so everything it captured can be freed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::dep::Dep;
use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::SubscriberId;

type Callback = Rc<dyn Fn()>;

/// Something that can be torn down.
///
/// `stop` must be idempotent: calling it a second time is a no-op.
pub trait Stoppable {
    /// Tear the target down. It will never run again.
    fn stop(&self);

    /// Whether `stop` has been called.
    fn is_stopped(&self) -> bool;
}

/// Execution policy for an effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectOptions {
    /// Run inline inside `trigger` instead of going through the scheduler.
    pub sync: bool,
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let count_clone = count.clone();
/// let e = effect(move || {
///     println!("Count is: {}", count_clone.get());
/// });
///
/// count.set(5);
/// Runtime::current().tick()?;  // Prints: "Count is: 5"
/// e.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    runtime: Weak<RuntimeInner>,
    body: RefCell<Option<Callback>>,
    /// Replaces the re-run for sync effects that only need to be told about
    /// a change (computed notifiers).
    on_trigger: RefCell<Option<Callback>>,
    /// Reverse index of every dependency set this effect belongs to.
    deps: RefCell<SmallVec<[Dep; 4]>>,
    sync: bool,
    stopped: Cell<bool>,
    running: Cell<usize>,
    run_count: Cell<usize>,
}

impl Effect {
    /// Create a batched effect and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create an effect with an explicit execution policy and run it once.
    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let effect = Self::create(Rc::new(run), None, options);
        effect.run();
        effect
    }

    /// Build and register an effect without running it.
    pub(crate) fn create(
        body: Callback,
        on_trigger: Option<Callback>,
        options: EffectOptions,
    ) -> Self {
        let runtime = Runtime::current();
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: SubscriberId::new(),
                runtime: Rc::downgrade(runtime.inner()),
                body: RefCell::new(Some(body)),
                on_trigger: RefCell::new(on_trigger),
                deps: RefCell::new(SmallVec::new()),
                sync: options.sync,
                stopped: Cell::new(false),
                running: Cell::new(0),
                run_count: Cell::new(0),
            }),
        };

        runtime.inner().register(&effect);
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Whether the effect runs inline at trigger time.
    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    /// Get the number of times the effect body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependency sets the effect belongs to.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Run the effect body now, re-tracking its dependencies.
    ///
    /// A no-op once the effect has been stopped.
    pub fn run(&self) {
        let inner = &self.inner;
        if inner.stopped.get() {
            return;
        }
        let Some(runtime) = inner.runtime.upgrade() else {
            return;
        };
        let body = inner.body.borrow().clone();
        let Some(body) = body else {
            return;
        };

        self.cleanup();
        inner.run_count.set(inner.run_count.get() + 1);

        let _running = RunningGuard::enter(&inner.running);
        let _current = Runtime::from_inner(runtime.clone()).enter();
        let _context = runtime.stack.enter(Some(self.clone()));
        tracing::trace!(effect = %inner.id, "running effect");
        body();
    }

    /// Stop the effect.
    ///
    /// Unsubscribes from every dependency, removes a pending scheduler
    /// entry, and drops the body. Calling it again does nothing.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.replace(true) {
            return;
        }

        self.cleanup();
        if let Some(runtime) = inner.runtime.upgrade() {
            runtime.scheduler.dequeue(inner.id);
            runtime.unregister(inner.id);
        }

        // Release captured state outside of any borrow.
        let body = inner.body.borrow_mut().take();
        let on_trigger = inner.on_trigger.borrow_mut().take();
        drop(body);
        drop(on_trigger);

        tracing::trace!(effect = %inner.id, "effect stopped");
    }

    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// React to a change in one of the dependencies.
    pub(crate) fn notify(&self) {
        let inner = &self.inner;
        if inner.stopped.get() {
            return;
        }

        if !inner.sync {
            if let Some(runtime) = inner.runtime.upgrade() {
                runtime.queue_effect(self.clone());
            }
            return;
        }

        let hook = inner.on_trigger.borrow().clone();
        if let Some(hook) = hook {
            hook();
        } else if inner.running.get() > 0 {
            // A sync effect writing to its own dependency would recurse forever.
            tracing::trace!(effect = %inner.id, "skipping re-entrant sync effect");
        } else {
            self.run();
        }
    }

    pub(crate) fn record_dep(&self, dep: Dep) {
        self.inner.deps.borrow_mut().push(dep);
    }

    pub(crate) fn downgrade(&self) -> Weak<EffectInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<EffectInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps {
            dep.unsubscribe(self.inner.id);
        }
    }
}

impl Stoppable for Effect {
    fn stop(&self) {
        Effect::stop(self);
    }

    fn is_stopped(&self) -> bool {
        Effect::is_stopped(self)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("sync", &self.inner.sync)
            .field("run_count", &self.run_count())
            .field("dep_count", &self.dep_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Marks an effect as running for as long as the guard lives.
struct RunningGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> RunningGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// Create a batched effect in the current runtime and run it once.
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + 'static,
{
    Effect::new(run)
}

/// Create an effect with explicit options and run it once.
pub fn effect_with<F>(run: F, options: EffectOptions) -> Effect
where
    F: Fn() + 'static,
{
    Effect::with_options(run, options)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
