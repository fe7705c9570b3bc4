//! Propagation benchmarks: fan-out of one ref to many batched effects, a
//! computed chain, and scope teardown.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ripple_core::reactive::{computed, effect, run_in_scope, Computed, EffectScope, Ref, Runtime};

fn fan_out(c: &mut Criterion) {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0u64);
    let _effects: Vec<_> = (0..1_000)
        .map(|_| {
            let source = source.clone();
            effect(move || {
                black_box(source.get());
            })
        })
        .collect();

    let mut next = 0;
    c.bench_function("fan_out_1000_effects", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            runtime.tick().unwrap()
        })
    });
}

fn computed_chain(c: &mut Criterion) {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0u64);
    let source_clone = source.clone();
    let mut tail: Computed<u64> = computed(move || source_clone.get());
    for _ in 0..100 {
        let previous = tail.clone();
        tail = computed(move || previous.get() + 1);
    }

    let mut next = 0;
    c.bench_function("computed_chain_100", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(tail.get())
        })
    });
}

fn scope_teardown(c: &mut Criterion) {
    let runtime = Runtime::new();
    let _guard = runtime.enter();

    let source = Ref::new(0u64);
    c.bench_function("scope_teardown_500_effects", |b| {
        b.iter_batched(
            || {
                let scope = EffectScope::new();
                run_in_scope(&scope, || {
                    for _ in 0..500 {
                        let source = source.clone();
                        effect(move || {
                            black_box(source.get());
                        });
                    }
                });
                scope
            },
            |scope| scope.stop(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, fan_out, computed_chain, scope_teardown);
criterion_main!(benches);
