//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, computeds,
//! effects and scopes. Everything the engine needs to share lives here
//! instead of in scattered statics:
//!
//! - the stack of running effects (dependency attribution),
//! - the stack of active scopes (effect ownership),
//! - the scheduler queue and its flush flags,
//! - the registry of live effects,
//! - the reactive proxy identity cache,
//! - the configuration and the deferred-flush [`Host`].
//!
//! # Current Runtime
//!
//! Each thread has a *current* runtime, created on first use with the
//! default configuration and a [`ManualHost`]. [`Runtime::enter`] installs a
//! different one until the returned guard drops, so independent reactive
//! universes can coexist, e.g. one per test.
//!
//! Primitives remember the runtime they were created in and keep using it,
//! regardless of which runtime is current later. The state is process-wide
//! per runtime and unsynchronised: the whole engine is single-threaded and
//! every handle is `!Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::EffectStack;
use super::effect::Effect;
use super::host::{FlushHandle, Host, ManualHost};
use super::scheduler::Scheduler;
use super::scope::EffectScope;
use super::SubscriberId;
use crate::config::RuntimeConfig;
use crate::data::ProxyCache;
use crate::error::Result;

thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// One reactive universe.
///
/// Cloning a `Runtime` yields another handle to the same universe.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    host: Box<dyn Host>,
    this: Weak<RuntimeInner>,
    pub(crate) stack: EffectStack,
    pub(crate) scheduler: Scheduler,
    pub(crate) proxies: ProxyCache,
    scopes: RefCell<Vec<EffectScope>>,
    effects: RefCell<HashMap<SubscriberId, Effect>>,
}

impl Runtime {
    /// Create a runtime with the default configuration and a manual host.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with `config` and a manual host.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_host(config, ManualHost)
    }

    /// Create a runtime with `config` that requests flushes from `host`.
    pub fn with_host<H>(config: RuntimeConfig, host: H) -> Self
    where
        H: Host + 'static,
    {
        if let Err(error) = config.validate() {
            tracing::warn!(%error, "runtime configuration out of range, clamping");
        }
        let max_iterations = config.max_flush_iterations.max(1);
        let prune_threshold = config.proxy_cache_prune_threshold.max(1);

        let inner = Rc::new_cyclic(|this| RuntimeInner {
            config,
            host: Box::new(host),
            this: this.clone(),
            stack: EffectStack::default(),
            scheduler: Scheduler::new(max_iterations),
            proxies: ProxyCache::new(prune_threshold),
            scopes: RefCell::new(Vec::new()),
            effects: RefCell::new(HashMap::new()),
        });

        Self { inner }
    }

    /// The runtime of the calling thread.
    pub fn current() -> Self {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(Runtime::new)
                .clone()
        })
    }

    /// Make this the current runtime until the guard is dropped.
    pub fn enter(&self) -> EnterGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        EnterGuard { previous }
    }

    /// Run `f` with this as the current runtime.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Drain the effect queue now.
    ///
    /// Returns the number of effect runs, or
    /// [`ReactiveError::InfiniteLoop`](crate::ReactiveError::InfiniteLoop)
    /// if the queue would not settle.
    pub fn flush(&self) -> Result<usize> {
        self.inner.flush()
    }

    /// Run the pending deferred flush, if any.
    ///
    /// This is the manual counterpart of the microtask a browser would run
    /// after the current task.
    pub fn tick(&self) -> Result<usize> {
        if !self.inner.scheduler.is_flush_pending() {
            return Ok(0);
        }
        self.inner.flush()
    }

    /// Number of effects waiting in the scheduler queue.
    pub fn pending_effects(&self) -> usize {
        self.inner.scheduler.len()
    }

    /// Whether a deferred flush has been requested and not yet run.
    pub fn is_flush_pending(&self) -> bool {
        self.inner.scheduler.is_flush_pending()
    }

    /// Whether a flush is in progress.
    pub fn is_flushing(&self) -> bool {
        self.inner.scheduler.is_flushing()
    }

    /// Number of effects (including computed notifiers) not yet stopped.
    pub fn live_effects(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// The scope new effects are registered into, if any.
    pub fn active_scope(&self) -> Option<EffectScope> {
        self.inner.active_scope()
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("live_effects", &self.live_effects())
            .field("pending_effects", &self.pending_effects())
            .finish()
    }
}

impl RuntimeInner {
    /// Record a new effect and hand it to the active scope.
    pub(crate) fn register(&self, effect: &Effect) {
        self.effects.borrow_mut().insert(effect.id(), effect.clone());

        if let Some(scope) = self.active_scope() {
            scope.adopt_effect(effect.clone());
        }
    }

    pub(crate) fn unregister(&self, id: SubscriberId) {
        let removed = self.effects.borrow_mut().remove(&id);
        drop(removed);
    }

    pub(crate) fn queue_effect(&self, effect: Effect) {
        if self.scheduler.queue(effect) {
            self.host.request_flush(FlushHandle::new(self.this.clone()));
        }
    }

    /// Drain the scheduler. If an effect panics, the requeued remainder
    /// gets a fresh flush request before the panic leaves.
    pub(crate) fn flush(&self) -> Result<usize> {
        let _rerequest = RerequestOnPanic { runtime: self };
        self.scheduler.flush()
    }

    pub(crate) fn active_scope(&self) -> Option<EffectScope> {
        self.scopes.borrow().last().cloned()
    }

    /// Make `scope` active until the guard is dropped.
    pub(crate) fn enter_scope(&self, scope: EffectScope) -> ScopeGuard<'_> {
        self.scopes.borrow_mut().push(scope);
        ScopeGuard { runtime: self }
    }
}

struct RerequestOnPanic<'a> {
    runtime: &'a RuntimeInner,
}

impl Drop for RerequestOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() && self.runtime.scheduler.is_flush_pending() {
            self.runtime
                .host
                .request_flush(FlushHandle::new(self.runtime.this.clone()));
        }
    }
}

/// Restores the previously current runtime when dropped.
#[must_use = "the runtime is only current while the guard is alive"]
pub struct EnterGuard {
    previous: Option<Runtime>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let replaced = CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), previous));
        drop(replaced);
    }
}

/// Pops the active scope when dropped.
pub(crate) struct ScopeGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.scopes.borrow_mut().pop();
        drop(popped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Ref};
    use std::cell::Cell;

    #[test]
    fn current_runtime_is_stable() {
        let a = Runtime::current();
        let b = Runtime::current();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn enter_swaps_and_restores() {
        let outer = Runtime::current();
        let inner = Runtime::new();

        {
            let _guard = inner.enter();
            assert!(Runtime::current().ptr_eq(&inner));
        }

        assert!(Runtime::current().ptr_eq(&outer));
    }

    #[test]
    fn run_returns_closure_value() {
        let runtime = Runtime::new();
        let value = runtime.run(|| {
            assert!(Runtime::current().ptr_eq(&runtime));
            42
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn runtimes_are_isolated() {
        let first = Runtime::new();
        let second = Runtime::new();

        let count = first.run(|| Ref::new(0));
        let runs = Rc::new(Cell::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _e = first.run(|| effect(move || {
            count_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        }));

        // Writing from inside another runtime still schedules on the first one
        second.run(|| count.set(1));
        assert_eq!(first.pending_effects(), 1);
        assert_eq!(second.pending_effects(), 0);

        first.tick().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn live_effects_tracks_registration() {
        let runtime = Runtime::new();
        let _guard = runtime.enter();

        let e = effect(|| {});
        assert_eq!(runtime.live_effects(), 1);

        e.stop();
        assert_eq!(runtime.live_effects(), 0);
    }

    #[test]
    fn tick_without_pending_flush_is_noop() {
        let runtime = Runtime::new();
        assert!(!runtime.is_flush_pending());
        assert_eq!(runtime.tick().unwrap(), 0);
    }

    #[test]
    fn zero_iteration_cap_is_clamped() {
        let runtime = Runtime::with_config(RuntimeConfig::default().with_max_flush_iterations(0));
        let _guard = runtime.enter();

        let count = Ref::new(0);
        let count_clone = count.clone();
        let _e = effect(move || {
            count_clone.get();
        });

        count.set(1);
        assert_eq!(runtime.tick().unwrap(), 1);
    }

    struct CountingHost(Rc<Cell<usize>>);

    impl Host for CountingHost {
        fn request_flush(&self, _flush: FlushHandle) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn panicking_flush_requests_another() {
        let requests = Rc::new(Cell::new(0));
        let runtime = Runtime::with_host(RuntimeConfig::default(), CountingHost(requests.clone()));
        let _guard = runtime.enter();

        let count = Ref::new(0);
        let count_clone = count.clone();
        let _boom = effect(move || {
            if count_clone.get() > 0 {
                panic!("boom");
            }
        });
        let count_clone = count.clone();
        let _after = effect(move || {
            count_clone.get();
        });

        count.set(1);
        assert_eq!(requests.get(), 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runtime.flush()));
        assert!(result.is_err());
        assert_eq!(requests.get(), 2);
        assert_eq!(runtime.pending_effects(), 1);
    }
}
