//! Deferred Flush Hosts
//!
//! The scheduler needs one thing from its environment: a way to run the
//! flush *after* the current synchronous work, the way a browser microtask
//! runs after the current task. A [`Host`] provides that.
//!
//! - [`ManualHost`] (the default) does nothing on its own. The runtime
//!   remembers that a flush is pending and the embedder drains it by calling
//!   [`Runtime::tick`](super::Runtime::tick), typically once per event-loop
//!   turn or at the end of a test step.
//!
//! - [`TokioHost`] (feature `tokio`) spawns the flush onto the current
//!   `tokio::task::LocalSet`, so it runs as soon as the task that caused it
//!   yields.

use std::rc::Weak;

use super::runtime::RuntimeInner;
use crate::error::{ReactiveError, Result};

/// Provider of the deferred "run after current work" primitive.
pub trait Host {
    /// Arrange for `flush` to be run later. Called at most once per
    /// pending flush.
    fn request_flush(&self, flush: FlushHandle);
}

/// A pending flush of one runtime's effect queue.
pub struct FlushHandle {
    runtime: Weak<RuntimeInner>,
}

impl FlushHandle {
    pub(crate) fn new(runtime: Weak<RuntimeInner>) -> Self {
        Self { runtime }
    }

    /// Run the flush if it is still pending.
    ///
    /// Returns the number of effect runs performed. A flush that already
    /// happened through [`Runtime::flush`](super::Runtime::flush) makes this
    /// a no-op.
    pub fn run(self) -> Result<usize> {
        let runtime = self.runtime.upgrade().ok_or(ReactiveError::RuntimeDropped)?;
        if !runtime.scheduler.is_flush_pending() {
            return Ok(0);
        }
        runtime.flush()
    }

    /// Run the flush and treat a runaway loop as fatal.
    ///
    /// Automatic hosts have nobody to hand the error to, so they log it and
    /// panic instead of letting the loop go unnoticed.
    pub fn run_or_abort(self) -> usize {
        match self.run() {
            Ok(runs) => runs,
            Err(ReactiveError::RuntimeDropped) => 0,
            Err(error) => {
                tracing::error!(%error, "reactive flush aborted");
                panic!("{error}");
            }
        }
    }
}

/// Host that leaves flushing to the embedder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualHost;

impl Host for ManualHost {
    fn request_flush(&self, _flush: FlushHandle) {
        tracing::trace!("flush pending, waiting for tick");
    }
}

/// Host that flushes from a task on the current `LocalSet`.
///
/// Must be used from inside `LocalSet::run_until` (or a task spawned on a
/// `LocalSet`); `tokio::task::spawn_local` panics anywhere else.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

#[cfg(feature = "tokio")]
impl Host for TokioHost {
    fn request_flush(&self, flush: FlushHandle) {
        tokio::task::spawn_local(async move {
            flush.run_or_abort();
        });
    }
}
