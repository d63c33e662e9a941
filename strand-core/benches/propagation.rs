//! Benchmarks for change propagation.
//!
//! Run with: `cargo bench --package strand-core --bench propagation`
//!
//! Covers:
//! - A wide fan-out of reactions over one cell
//! - A deep chain of computeds read by one reaction
//! - Batched writes to many cells observed by one reaction

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use strand_core::api::autorun;
use strand_core::reactive::{Computed, Observable, Runtime};

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let rt = Runtime::new();
            let source = Observable::new(&rt, 0u64);
            let total = Rc::new(Cell::new(0u64));
            let disposers: Vec<_> = (0..width)
                .map(|_| {
                    let (s, t) = (source.clone(), total.clone());
                    autorun(&rt, None, move || t.set(t.get() + s.get())).unwrap()
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
            black_box(total.get());
            drop(disposers);
        });
    }
    group.finish();
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [10usize, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let source = Observable::new(&rt, 0u64);

            let s = source.clone();
            let mut tail = Computed::new(&rt, move || s.get());
            for _ in 1..depth {
                let prev = tail.clone();
                tail = Computed::new(&rt, move || prev.get().unwrap_or_default() + 1);
            }

            let seen = Rc::new(Cell::new(0u64));
            let (t, out) = (tail.clone(), seen.clone());
            let _disposer =
                autorun(&rt, None, move || out.set(t.get().unwrap_or_default())).unwrap();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
            black_box(seen.get());
        });
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_writes");
    for cells in [10usize, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(cells), &cells, |b, &cells| {
            let rt = Runtime::new();
            let inputs: Vec<_> = (0..cells).map(|_| Observable::new(&rt, 0u64)).collect();
            let runs = Rc::new(Cell::new(0u64));

            let (observed, r) = (inputs.clone(), runs.clone());
            let _disposer = autorun(&rt, None, move || {
                black_box(observed.iter().map(Observable::get).sum::<u64>());
                r.set(r.get() + 1);
            })
            .unwrap();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                rt.batch(|| {
                    for cell in &inputs {
                        cell.set(next);
                    }
                });
            });
            black_box(runs.get());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_computed_chain,
    bench_batched_writes,
);

criterion_main!(benches);
