//! Registry operation benchmarks.
//!
//! Measures registration, single and bulk cancellation, and the leak scan at
//! representative populations.

#![allow(missing_docs)]

mod common;

use common::synthetic_snapshot;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tether_core::{IdGenerator, LeakThresholds, LifecycleScope, scan};

fn bench_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("id/generate");
    let ids = IdGenerator::new();
    group.bench_function("generate", |b| {
        b.iter(|| ids.generate(black_box("timeout")));
    });
    group.finish();
}

fn bench_register_and_cancel(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("bench runtime");
    let handle = runtime.handle().clone();

    let mut group = c.benchmark_group("registry/register_cancel");

    group.bench_function("register_custom", |b| {
        b.iter_batched(
            || LifecycleScope::with_handle(handle.clone()),
            |scope| {
                let id = scope.register_custom("bench", || Ok(())).expect("open scope");
                black_box(id);
                scope
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("cancel_one", |b| {
        b.iter_batched(
            || {
                let scope = LifecycleScope::with_handle(handle.clone());
                let id = scope.register_custom("bench", || Ok(())).expect("open scope");
                (scope, id)
            },
            |(scope, id)| {
                black_box(scope.cancel(&id));
                scope
            },
            criterion::BatchSize::SmallInput,
        );
    });

    for population in [10usize, 100, 1_000] {
        group.bench_with_input(
            BenchmarkId::new("cancel_all", population),
            &population,
            |b, &population| {
                b.iter_batched(
                    || {
                        let scope = LifecycleScope::with_handle(handle.clone());
                        for _ in 0..population {
                            scope.register_custom("bench", || Ok(())).expect("open scope");
                        }
                        scope
                    },
                    |scope| {
                        black_box(scope.cancel_all().canceled);
                        scope
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_leak_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("leak/scan");
    let thresholds = LeakThresholds::default();
    let now_ms = 1_700_000_000_000u64;

    for population in [10usize, 100, 1_000] {
        let snapshot = synthetic_snapshot(population, now_ms);
        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &snapshot,
            |b, snapshot| {
                b.iter(|| scan(black_box(snapshot), &thresholds, now_ms));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_ids, bench_register_and_cancel, bench_leak_scan);
criterion_main!(benches);
