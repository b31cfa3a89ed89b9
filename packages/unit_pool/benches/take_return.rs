//! Basic benchmarks for the `unit_pool` package.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use unit_pool::{LocalUnitPool, UnitPool};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = [u8; 64];
const TEST_VALUE: TestItem = [0; 64];

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("up_local");

    let local = LocalUnitPool::builder()
        .factory(|| TEST_VALUE)
        .pre_instantiate(1)
        .build();

    group.bench_function("take_return_warm", |b| {
        b.iter(|| {
            let unit = local.take_aggressive();
            black_box(&*unit);
            local.return_unit(&unit)
        });
    });

    group.bench_function("take_scoped_warm", |b| {
        b.iter(|| {
            let guard = local.try_take_scoped();
            black_box(guard.is_some())
        });
    });

    group.bench_function("fill_one_thousand", |b| {
        b.iter(|| {
            let pool = LocalUnitPool::builder().factory(|| TEST_VALUE).build();
            let units: Vec<_> = (0..1_000).map(|_| pool.take_aggressive()).collect();
            (pool, units)
        });
    });

    let observed = LocalUnitPool::builder()
        .factory(|| TEST_VALUE)
        .pre_instantiate(1)
        .build();
    let _subscription = observed.subscribe_taken(|_, unit| {
        black_box(unit.index());
    });

    group.bench_function("take_return_observed", |b| {
        b.iter(|| {
            let unit = observed.take_aggressive();
            observed.return_unit(&unit)
        });
    });

    group.finish();

    let mut group = c.benchmark_group("up_sync");

    let pool = UnitPool::builder()
        .factory(|| TEST_VALUE)
        .pre_instantiate(1)
        .build();

    group.bench_function("take_return_warm", |b| {
        b.iter(|| {
            let unit = pool.take_aggressive();
            black_box(&*unit);
            pool.return_unit(&unit)
        });
    });

    group.bench_function("take_bounded_full", |b| {
        let full = UnitPool::builder()
            .factory(|| TEST_VALUE)
            .max_instances(1)
            .build();
        let _held = full.take_aggressive();

        b.iter(|| black_box(full.try_take().is_none()));
    });

    group.finish();
}
