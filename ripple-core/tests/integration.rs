//! Integration Tests for Reactive System
//!
//! These tests verify that refs, computeds, effects, watchers, scopes and
//! reactive objects work together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use ripple_core::reactive::{
    computed, current_subscriber, effect, effect_scope, effect_with, on_scope_dispose,
    run_in_scope, watch, EffectOptions, Ref, Runtime, Stoppable, WatchOptions,
};
use ripple_core::{reactive, Array, Data, Object, Reactive, ReactiveError, RuntimeConfig};
use serde_json::json;

fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    (count, move || count_clone.set(count_clone.get() + 1))
}

/// Test that an effect re-runs after a tracked ref changes.
#[test]
fn effect_tracks_ref_dependency() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let observed = Rc::new(Cell::new(-1));

    let (source_clone, observed_clone) = (source.clone(), observed.clone());
    let _e = effect(move || observed_clone.set(source_clone.get()));

    // Effect runs on creation, captures initial value
    assert_eq!(observed.get(), 0);

    source.set(42);
    assert!(runtime.is_flush_pending());
    ripple_core::reactive::tick().unwrap();
    assert_eq!(observed.get(), 42);
}

/// Test that a branch no longer taken stops triggering the effect.
#[test]
fn stale_dependencies_do_not_trigger() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let show = Ref::new(true);
    let detail = Ref::new(String::from("a"));
    let (runs, bump) = counter();

    let (show_clone, detail_clone) = (show.clone(), detail.clone());
    let _e = effect(move || {
        bump();
        if show_clone.get() {
            detail_clone.get();
        }
    });

    show.set(false);
    runtime.tick().unwrap();
    assert_eq!(runs.get(), 2);

    detail.set(String::from("b"));
    runtime.tick().unwrap();
    assert_eq!(runs.get(), 2);
}

/// Test that three writes in one tick collapse into one effect run.
#[test]
fn writes_are_batched() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (source_clone, seen_clone) = (source.clone(), seen.clone());
    let _e = effect(move || seen_clone.borrow_mut().push(source_clone.get()));

    source.set(1);
    source.set(2);
    source.set(3);
    assert_eq!(runtime.pending_effects(), 1);

    assert_eq!(runtime.tick().unwrap(), 1);
    assert_eq!(*seen.borrow(), vec![0, 3]);
}

/// Test that a computed never evaluates between reads.
#[test]
fn computed_is_lazy() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(1);
    let (calls, bump) = counter();

    let source_clone = source.clone();
    let doubled = computed(move || {
        bump();
        source_clone.get() * 2
    });
    assert_eq!(calls.get(), 1);

    for i in 0..10 {
        source.set(i);
    }
    runtime.tick().unwrap();
    assert_eq!(calls.get(), 1);

    assert_eq!(doubled.get(), 18);
    assert_eq!(calls.get(), 2);
}

/// Test that a computed read right after a write sees the write.
#[test]
fn computed_is_synchronously_fresh() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let first = Ref::new(String::from("Ada"));
    let last = Ref::new(String::from("Lovelace"));

    let (first_clone, last_clone) = (first.clone(), last.clone());
    let full = computed(move || format!("{} {}", first_clone.get(), last_clone.get()));

    last.set(String::from("Byron"));
    assert_eq!(full.get(), "Ada Byron");
    assert!(!runtime.is_flush_pending());
}

/// Test that a stopped effect never runs again and leaves its sets.
#[test]
fn stop_is_final() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let (runs, bump) = counter();

    let source_clone = source.clone();
    let e = effect(move || {
        source_clone.get();
        bump();
    });

    // A write queues the effect, stopping removes it from the queue
    source.set(1);
    assert_eq!(runtime.pending_effects(), 1);
    e.stop();
    assert_eq!(runtime.pending_effects(), 0);

    source.set(2);
    runtime.flush().unwrap();
    e.run();
    assert_eq!(runs.get(), 1);
    assert_eq!(source.dep().subscriber_count(), 0);

    // Idempotent
    e.stop();
    assert!(e.is_stopped());
}

/// Test that stopping a scope tears down every effect and computed in it.
#[test]
fn scope_bulk_teardown() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let scope = effect_scope(None);
    let (runs, bump) = counter();

    run_in_scope(&scope, || {
        for _ in 0..100 {
            let (source, bump) = (source.clone(), bump.clone());
            effect(move || {
                source.get();
                bump();
            });
        }
        for _ in 0..20 {
            let source = source.clone();
            let c = computed(move || source.get());
            // Dropping the handle early also stops the notifier
            drop(c);
        }
    });

    assert_eq!(runs.get(), 100);
    assert_eq!(source.dep().subscriber_count(), 100);

    scope.stop();
    assert_eq!(source.dep().subscriber_count(), 0);
    assert_eq!(runtime.live_effects(), 0);

    source.set(1);
    runtime.tick().unwrap();
    assert_eq!(runs.get(), 100);
}

/// Test that disposal callbacks and nested scopes run on stop.
#[test]
fn nested_scopes_and_disposal() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let log = Rc::new(RefCell::new(Vec::new()));
    let outer = effect_scope(None);

    let inner = run_in_scope(&outer, || {
        let outer_log = log.clone();
        on_scope_dispose(move || outer_log.borrow_mut().push("outer"));

        let inner = effect_scope(None);
        let inner_log = log.clone();
        run_in_scope(&inner, move || {
            on_scope_dispose(move || inner_log.borrow_mut().push("inner"))
        });
        inner
    });

    outer.stop();
    assert!(inner.is_stopped());
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
}

/// Test that the watcher's old value is a real snapshot.
#[test]
fn watch_old_and_new_are_distinct() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let list = Ref::new(Data::from_json(json!([1, 2])));
    let calls = Rc::new(RefCell::new(Vec::new()));

    let calls_clone = calls.clone();
    let _w = watch(
        list.clone(),
        move |new: &Data, old: Option<&Data>| {
            let old = old.map(Data::to_json);
            calls_clone.borrow_mut().push((new.to_json(), old));
        },
        WatchOptions::default(),
    );

    // In-place mutation through the array shares the ref's set
    let array = list.get_untracked();
    array.as_array().unwrap().push(3);
    runtime.tick().unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![(json!([1, 2, 3]), Some(json!([1, 2])))]
    );
}

/// Test that an immediate watcher calls back on creation.
#[test]
fn watch_immediate() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(7);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let seen_clone = seen.clone();
    let w = watch(
        source.clone(),
        move |new: &i32, old: Option<&i32>| seen_clone.borrow_mut().push((*new, old.copied())),
        WatchOptions {
            immediate: true,
            deep: false,
        },
    );
    assert_eq!(*seen.borrow(), vec![(7, None)]);

    source.set(8);
    runtime.tick().unwrap();
    assert_eq!(seen.borrow()[1], (8, Some(7)));

    w.stop();
    source.set(9);
    runtime.tick().unwrap();
    assert_eq!(seen.borrow().len(), 2);
}

/// Test that an effect writing its own dependency hits the iteration cap.
#[test]
fn runaway_loop_is_reported() {
    let runtime = Runtime::with_config(RuntimeConfig::default().with_max_flush_iterations(10));
    let _guard = runtime.enter();

    let count = Ref::new(0);
    let count_clone = count.clone();
    let _e = effect(move || {
        let value = count_clone.get();
        count_clone.set(value + 1);
    });

    let error = runtime.tick().unwrap_err();
    assert!(matches!(
        error,
        ReactiveError::InfiniteLoop {
            iterations: 10,
            pending: 1
        }
    ));

    // The queue was cleared, the runtime is usable again
    assert_eq!(runtime.pending_effects(), 0);
    assert!(!runtime.is_flushing());
}

/// Test that wrapping the same object always yields the same proxy.
#[test]
fn reactive_identity() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let object = Object::from_iter([("child", Object::new())]);
    let a = reactive(object.clone());
    let b = reactive(object.clone());
    assert!(a.as_reactive().unwrap().ptr_eq(b.as_reactive().unwrap()));

    // Nested proxies are cached too
    let proxy = Reactive::new(&object);
    let first = proxy.get_as::<Reactive>("child").unwrap();
    let second = proxy.get_as::<Reactive>("child").unwrap();
    assert!(first.ptr_eq(&second));
}

/// Test that a panicking effect leaves the tracking stack balanced.
#[test]
fn panicking_effect_restores_context() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let source_clone = source.clone();
    let result = catch_unwind(AssertUnwindSafe(|| {
        effect(move || {
            source_clone.get();
            panic!("effect failed");
        });
    }));

    assert!(result.is_err());
    assert!(current_subscriber().is_none());

    // Tracking still works afterwards
    let seen = Rc::new(Cell::new(0));
    let (source_clone, seen_clone) = (source.clone(), seen.clone());
    let _e = effect(move || seen_clone.set(source_clone.get()));
    source.set(5);

    // The panicking effect is queued too; a flush re-runs it and panics again
    let flush = catch_unwind(AssertUnwindSafe(|| runtime.tick()));
    assert!(flush.is_err());
    assert!(!runtime.is_flushing());
}

/// Test that sync effects run inside the write and batched ones wait.
#[test]
fn sync_effects_run_before_batched() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let (source_clone, order_clone) = (source.clone(), order.clone());
    let _batched = effect(move || {
        source_clone.get();
        order_clone.borrow_mut().push("batched");
    });
    let (source_clone, order_clone) = (source.clone(), order.clone());
    let _sync = effect_with(
        move || {
            source_clone.get();
            order_clone.borrow_mut().push("sync");
        },
        EffectOptions { sync: true },
    );

    order.borrow_mut().clear();
    source.set(1);
    assert_eq!(*order.borrow(), vec!["sync"]);

    runtime.tick().unwrap();
    assert_eq!(*order.borrow(), vec!["sync", "batched"]);
}

/// Test that batched effects run in the order they were queued, not in
/// dependency order.
#[test]
fn batched_effects_run_in_queue_order() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let a = Ref::new(0);
    let b = Ref::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let (b_clone, order_clone) = (b.clone(), order.clone());
    let _reads_b = effect(move || {
        b_clone.get();
        order_clone.borrow_mut().push("b");
    });
    let (a_clone, order_clone) = (a.clone(), order.clone());
    let _reads_a = effect(move || {
        a_clone.get();
        order_clone.borrow_mut().push("a");
    });

    order.borrow_mut().clear();
    a.set(1);
    b.set(1);
    runtime.tick().unwrap();
    assert_eq!(*order.borrow(), vec!["a", "b"]);
}

/// Test that deep watchers see nested changes in reactive state.
#[test]
fn deep_watch_of_reactive_state() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let state = reactive(Data::from_json(json!({
        "todos": [{ "title": "write", "done": false }]
    })));
    let state = state.as_reactive().unwrap().clone();
    let (calls, bump) = counter();

    let _w = watch(
        state.clone(),
        move |_, _| bump(),
        WatchOptions {
            deep: true,
            ..Default::default()
        },
    );

    let todos = state.get_as::<Array>("todos").unwrap();
    let first = todos.get(0).unwrap();
    first.as_reactive().unwrap().set("done", true);
    runtime.tick().unwrap();
    assert_eq!(calls.get(), 1);

    todos.push(Object::from_iter([("title", "test"), ("done", "no")]));
    runtime.tick().unwrap();
    assert_eq!(calls.get(), 2);
}

/// Test the vector mutators on a ref.
#[test]
fn vector_mutators_trigger() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let items = Ref::new(vec![3, 1, 2]);
    let (runs, bump) = counter();

    let items_clone = items.clone();
    let _e = effect(move || {
        items_clone.len();
        bump();
    });

    items.push(4);
    items.sort();
    items.reverse();
    runtime.tick().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(items.get_untracked(), vec![4, 3, 2, 1]);

    assert_eq!(items.shift(), Some(4));
    items.unshift(0);
    assert_eq!(items.splice(1, 2, vec![9]), vec![3, 2]);
    assert_eq!(items.pop(), Some(1));
    runtime.tick().unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(items.get_untracked(), vec![0, 9]);
}

/// Test that configuration can be loaded from JSON.
#[test]
fn runtime_from_json_config() {
    let config = RuntimeConfig::from_json(r#"{ "max_flush_iterations": 3 }"#).unwrap();
    let runtime = Runtime::with_config(config);
    assert_eq!(runtime.config().max_flush_iterations, 3);
    assert_eq!(
        runtime.config().proxy_cache_prune_threshold,
        ripple_core::config::DEFAULT_PROXY_CACHE_PRUNE_THRESHOLD
    );
}

/// Test that a stopped watcher is reported through the shared trait.
#[test]
fn stoppable_handles() {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0);
    let source_clone = source.clone();
    let handles: Vec<Box<dyn Stoppable>> = vec![
        Box::new(effect(|| {})),
        Box::new(computed(move || source_clone.get())),
        Box::new(watch(source.clone(), |_, _| {}, WatchOptions::default())),
        Box::new(effect_scope(None)),
    ];

    for handle in &handles {
        handle.stop();
    }
    assert!(handles.iter().all(|handle| handle.is_stopped()));
    assert_eq!(runtime.live_effects(), 0);
}
