//! Effect Scopes
//!
//! A scope owns the effects created while it is active, so a whole subtree
//! of reactive work can be torn down with one call. View layers create a
//! scope per fragment they render and stop it when the fragment goes away;
//! without that, every effect the fragment created would stay subscribed to
//! long-lived state forever.
//!
//! # Ownership
//!
//! - Effects, computed notifiers and watchers register into the *active*
//!   scope of their runtime when they are created.
//! - [`on_scope_dispose`] registers a cleanup callback into the active
//!   scope.
//! - A scope created while another is active (or with an explicit parent)
//!   becomes its child.
//!
//! # Teardown
//!
//! [`EffectScope::stop`] stops the owned entries in registration order,
//! then the children, then forgets both and detaches from its parent. It is
//! idempotent. Anything registered into a scope after it stopped is torn
//! down on the spot.
//!
//! A panicking disposal callback does not cut teardown short: every other
//! entry and child is still released, then the first panic is resumed.
//!
//! Effects stopped on their own (a dropped computed, a stopped watcher)
//! are swept out of the entry list once it grows past a threshold.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::effect::{Effect, Stoppable};
use super::runtime::{Runtime, RuntimeInner};

/// Entry count below which stopped effects are never swept.
const PRUNE_BASE: usize = 32;

/// An ownership node for effects and cleanup callbacks.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    runtime: Weak<RuntimeInner>,
    parent: RefCell<Weak<ScopeInner>>,
    entries: RefCell<Vec<Owned>>,
    children: RefCell<Vec<EffectScope>>,
    stopped: Cell<bool>,
    prune_at: Cell<usize>,
}

enum Owned {
    Effect(Effect),
    Dispose(Box<dyn FnOnce()>),
}

impl Owned {
    fn release(self) {
        match self {
            Owned::Effect(effect) => effect.stop(),
            Owned::Dispose(dispose) => dispose(),
        }
    }

    fn is_released(&self) -> bool {
        match self {
            Owned::Effect(effect) => effect.is_stopped(),
            Owned::Dispose(_) => false,
        }
    }
}

/// Run `f`, keeping the first panic seen across calls in `first`.
fn collect_panic(first: &mut Option<Box<dyn Any + Send>>, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        first.get_or_insert(payload);
    }
}

impl EffectScope {
    /// Create a scope in the current runtime, as a child of the active
    /// scope if there is one.
    pub fn new() -> Self {
        let runtime = Runtime::current();
        let parent = runtime.active_scope();
        Self::build(&runtime, parent.as_ref())
    }

    /// Create a scope as a child of `parent`, in `parent`'s runtime.
    pub fn child_of(parent: &EffectScope) -> Self {
        let runtime = parent.runtime().unwrap_or_else(Runtime::current);
        Self::build(&runtime, Some(parent))
    }

    fn build(runtime: &Runtime, parent: Option<&EffectScope>) -> Self {
        let scope = Self {
            inner: Rc::new(ScopeInner {
                runtime: Rc::downgrade(runtime.inner()),
                parent: RefCell::new(Weak::new()),
                entries: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                stopped: Cell::new(false),
                prune_at: Cell::new(PRUNE_BASE),
            }),
        };

        if let Some(parent) = parent {
            parent.adopt_child(&scope);
        }
        scope
    }

    /// Run `f` with this scope active. See [`run_in_scope`].
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        run_in_scope(self, f)
    }

    /// Register a callback to run when the scope stops.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        self.adopt(Owned::Dispose(Box::new(f)));
    }

    /// Stop every owned effect, run the disposal callbacks, then stop the
    /// children. Calling it again does nothing.
    ///
    /// If a disposal callback panics, the rest of the teardown still runs
    /// and the first panic is resumed at the end.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.replace(true) {
            return;
        }

        let mut panicked = None;

        let entries = std::mem::take(&mut *inner.entries.borrow_mut());
        let owned = entries.len();
        for entry in entries {
            collect_panic(&mut panicked, || entry.release());
        }

        let children = std::mem::take(&mut *inner.children.borrow_mut());
        let nested = children.len();
        for child in children {
            collect_panic(&mut panicked, || child.stop());
        }

        let parent = inner.parent.replace(Weak::new()).upgrade();
        if let Some(parent) = parent {
            parent
                .children
                .borrow_mut()
                .retain(|child| !Rc::ptr_eq(&child.inner, inner));
        }

        tracing::debug!(owned, children = nested, "effect scope stopped");

        if let Some(payload) = panicked {
            tracing::warn!("effect scope teardown panicked, resuming after full teardown");
            panic::resume_unwind(payload);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Number of effects and disposal callbacks currently owned.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    /// The parent scope, unless this is a root or has been detached.
    pub fn parent(&self) -> Option<EffectScope> {
        self.inner
            .parent
            .borrow()
            .upgrade()
            .map(|inner| EffectScope { inner })
    }

    /// Whether two handles refer to the same scope.
    pub fn ptr_eq(&self, other: &EffectScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn adopt_effect(&self, effect: Effect) {
        self.adopt(Owned::Effect(effect));
    }

    fn adopt(&self, entry: Owned) {
        if self.is_stopped() {
            tracing::debug!("registering into a stopped scope, releasing immediately");
            entry.release();
            return;
        }

        let inner = &self.inner;
        let mut entries = inner.entries.borrow_mut();
        if entries.len() >= inner.prune_at.get() {
            let before = entries.len();
            entries.retain(|entry| !entry.is_released());
            inner.prune_at.set((entries.len() * 2).max(PRUNE_BASE));
            tracing::trace!(swept = before - entries.len(), "pruned stopped scope entries");
        }
        entries.push(entry);
    }

    fn adopt_child(&self, child: &EffectScope) {
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        if self.is_stopped() {
            tracing::debug!("creating a scope under a stopped parent, stopping it");
            child.stop();
            return;
        }
        self.inner.children.borrow_mut().push(child.clone());
    }

    fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade().map(Runtime::from_inner)
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Stoppable for EffectScope {
    fn stop(&self) {
        EffectScope::stop(self);
    }

    fn is_stopped(&self) -> bool {
        EffectScope::is_stopped(self)
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("entries", &self.entry_count())
            .field("children", &self.child_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create a scope, as a child of `parent` or else of the active scope.
pub fn effect_scope(parent: Option<&EffectScope>) -> EffectScope {
    match parent {
        Some(parent) => EffectScope::child_of(parent),
        None => EffectScope::new(),
    }
}

/// Run `f` with `scope` active, so effects created inside belong to it.
///
/// The previously active scope is restored afterwards, also when `f`
/// panics. Running a stopped scope is allowed but pointless: everything
/// created inside is stopped immediately.
pub fn run_in_scope<R>(scope: &EffectScope, f: impl FnOnce() -> R) -> R {
    if scope.is_stopped() {
        tracing::warn!("running inside a stopped effect scope");
    }

    let Some(runtime) = scope.runtime() else {
        return f();
    };
    let _current = runtime.enter();
    let _active = runtime.inner().enter_scope(scope.clone());
    f()
}

/// Register `f` to run when the active scope stops.
///
/// Without an active scope this does nothing.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    match Runtime::current().active_scope() {
        Some(scope) => scope.on_dispose(f),
        None => tracing::warn!("on_scope_dispose called without an active scope"),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
