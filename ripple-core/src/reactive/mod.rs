//! Reactive Primitives
//!
//! This module implements the core reactive system: refs, computeds,
//! effects, watchers and the scopes that own them. View-binding layers
//! consume these primitives; nothing here knows about templates or DOM.
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. When its value is read
//! inside a running effect, the effect is subscribed to the ref's
//! dependency set. When the value changes, every subscriber is notified.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It is marked
//! dirty synchronously when a dependency changes and re-evaluated lazily on
//! the next read.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs when its
//! dependencies change. By default re-runs are batched: triggers queue the
//! effect and a deferred flush runs each queued effect once.
//!
//! ## Watchers
//!
//! [`watch`] calls back with the new and old value of a source whenever it
//! changes. Old values are snapshots, so in-place mutation is visible.
//!
//! ## Scopes
//!
//! An [`EffectScope`] owns the effects created while it is active and stops
//! them all at once.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: each [`Runtime`] keeps a stack of
//! running effects, and reading a reactive cell subscribes whatever is on
//! top. Every effect keeps a reverse index of the sets it joined and leaves
//! all of them before it re-runs, so conditional reads never leave stale
//! subscriptions behind.

mod computed;
mod context;
mod dep;
mod effect;
mod host;
mod refs;
mod runtime;
mod scheduler;
mod scope;
mod subscriber;
mod watch;

pub use computed::{computed, Computed};
pub use context::{current_subscriber, is_tracking, untrack};
pub use dep::Dep;
pub use effect::{effect, effect_with, Effect, EffectOptions, Stoppable};
#[cfg(feature = "tokio")]
pub use host::TokioHost;
pub use host::{FlushHandle, Host, ManualHost};
pub use refs::{new_ref, Ref, RefValue};
pub use runtime::{EnterGuard, Runtime};
pub use scope::{effect_scope, on_scope_dispose, run_in_scope, EffectScope};
pub use subscriber::SubscriberId;
pub use watch::{watch, Constant, Snapshot, WatchOptions, WatchSource, Watcher};

pub(crate) use runtime::RuntimeInner;

use crate::error::Result;

/// Drain the current runtime's effect queue now.
pub fn flush() -> Result<usize> {
    Runtime::current().flush()
}

/// Run the current runtime's pending deferred flush, if any.
pub fn tick() -> Result<usize> {
    Runtime::current().tick()
}
