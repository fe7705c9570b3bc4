//! Watch Implementation
//!
//! A watcher observes a source and calls back with the new value and the
//! value it saw last time.
//!
//! # How Watchers Work
//!
//! 1. The watcher is a batched effect. Each run reads the source, which
//!    tracks whatever the source reads.
//!
//! 2. On every run but the first (or on the first too, with
//!    `immediate`), the callback is invoked with tracking suspended, so
//!    reads inside the callback never subscribe the watcher.
//!
//! 3. After the callback the new value is *snapshotted* into the old-value
//!    slot. Snapshots of [`Data`] are deep copies, so a source mutated in
//!    place still yields an old value that differs from the new one.
//!
//! The callback fires on every re-run; no equality check is made between
//! the old and new value. Stopping the watcher drops the retained snapshot
//! together with the effect body.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

use super::computed::Computed;
use super::context::untrack;
use super::effect::{Effect, EffectOptions, Stoppable};
use super::refs::Ref;
use crate::data::{self, Data, Reactive};

/// Values a watcher can keep as its old value.
pub trait Snapshot: Sized + 'static {
    /// A copy that later in-place mutation of `self` cannot affect.
    fn snapshot(&self) -> Self;

    /// Read everything reachable from the value so a deep watcher tracks
    /// it. Only dynamic data has anything to reach.
    fn track_deep(&self) {}
}

macro_rules! snapshot_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Snapshot for $ty {
                fn snapshot(&self) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

snapshot_by_clone!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str, SystemTime,
);

impl Snapshot for Data {
    fn snapshot(&self) -> Self {
        self.deep_clone()
    }

    fn track_deep(&self) {
        data::traverse_data(self);
    }
}

impl<T: Snapshot> Snapshot for Vec<T> {
    fn snapshot(&self) -> Self {
        self.iter().map(Snapshot::snapshot).collect()
    }

    fn track_deep(&self) {
        self.iter().for_each(Snapshot::track_deep);
    }
}

impl<T: Snapshot> Snapshot for Option<T> {
    fn snapshot(&self) -> Self {
        self.as_ref().map(Snapshot::snapshot)
    }

    fn track_deep(&self) {
        if let Some(value) = self {
            value.track_deep();
        }
    }
}

macro_rules! snapshot_tuple {
    ($($name:ident),+) => {
        impl<$($name: Snapshot),+> Snapshot for ($($name,)+) {
            #[allow(non_snake_case)]
            fn snapshot(&self) -> Self {
                let ($($name,)+) = self;
                ($($name.snapshot(),)+)
            }

            #[allow(non_snake_case)]
            fn track_deep(&self) {
                let ($($name,)+) = self;
                $($name.track_deep();)+
            }
        }
    };
}

snapshot_tuple!(A);
snapshot_tuple!(A, B);
snapshot_tuple!(A, B, C);
snapshot_tuple!(A, B, C, D);

/// Something a watcher can observe.
pub trait WatchSource: 'static {
    type Value: Snapshot;

    /// Produce the current value, tracking what it depends on. With `deep`
    /// the value's whole reachable structure is tracked.
    fn read(&self, deep: bool) -> Self::Value;
}

impl<F, T> WatchSource for F
where
    F: Fn() -> T + 'static,
    T: Snapshot,
{
    type Value = T;

    fn read(&self, deep: bool) -> T {
        let value = self();
        if deep {
            value.track_deep();
        }
        value
    }
}

impl<T: Clone + Snapshot> WatchSource for Ref<T> {
    type Value = T;

    fn read(&self, deep: bool) -> T {
        let value = self.get();
        if deep {
            value.track_deep();
        }
        value
    }
}

impl<T: Clone + Snapshot> WatchSource for Computed<T> {
    type Value = T;

    fn read(&self, deep: bool) -> T {
        let value = self.get();
        if deep {
            value.track_deep();
        }
        value
    }
}

/// A reactive object. Deep reads track every nested property and produce
/// a plain copy; shallow reads hand the proxy through without tracking.
impl WatchSource for Reactive {
    type Value = Data;

    fn read(&self, deep: bool) -> Data {
        if deep {
            self.traverse()
        } else {
            Data::Reactive(self.clone())
        }
    }
}

/// A fixed value. Watching it only makes sense with `immediate`.
#[derive(Debug, Clone)]
pub struct Constant<T>(pub T);

impl<T: Snapshot> WatchSource for Constant<T> {
    type Value = T;

    fn read(&self, _deep: bool) -> T {
        self.0.snapshot()
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call back on the first run too, with no old value.
    pub immediate: bool,
    /// Track everything reachable from the source's value.
    pub deep: bool,
}

/// A running watch.
#[derive(Clone)]
pub struct Watcher {
    effect: Effect,
}

impl Watcher {
    /// The effect driving the watcher.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    /// Stop watching and release the retained old value.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_stopped()
    }
}

impl Stoppable for Watcher {
    fn stop(&self) {
        Watcher::stop(self);
    }

    fn is_stopped(&self) -> bool {
        Watcher::is_stopped(self)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").field("effect", &self.effect).finish()
    }
}

struct WatchState<T> {
    old: Option<T>,
    initialized: bool,
}

/// Watch `source` and call `callback(new, old)` when it changes.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let watcher = watch(count.clone(), |new, old| {
///     println!("{old:?} -> {new}");
/// }, WatchOptions::default());
///
/// count.set(1);
/// Runtime::current().tick()?;  // Prints: "Some(0) -> 1"
/// watcher.stop();
/// ```
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> Watcher
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>) + 'static,
{
    let state = RefCell::new(WatchState {
        old: None,
        initialized: false,
    });

    let body: Rc<dyn Fn()> = Rc::new(move || {
        let value = source.read(options.deep);

        let first = !state.borrow().initialized;
        if !first || options.immediate {
            let old = state.borrow_mut().old.take();
            untrack(|| callback(&value, old.as_ref()));
        }

        let mut state = state.borrow_mut();
        state.old = Some(value.snapshot());
        state.initialized = true;
    });

    let effect = Effect::create(body, None, EffectOptions::default());
    effect.run();
    Watcher { effect }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
