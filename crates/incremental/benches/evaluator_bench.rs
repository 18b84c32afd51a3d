//! Benchmarks for tidal-incremental tick evaluation.
//!
//! Target: one-edge incremental tick on a 1000-edge graph well under a
//! from-scratch tick.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tidal_core::tuple;
use tidal_incremental::{ColumnRef, EvalConfig, Evaluator, Plan, Program, TickInput};

fn closure_program() -> Program {
    Program::new()
        .unwrap()
        .table("link", &["from", "to"], &[])
        .unwrap()
        .table("path", &["from", "to"], &[])
        .unwrap()
        .merge_now("path", Plan::scan("link"))
        .unwrap()
        .merge_now(
            "path",
            Plan::join(
                vec![Plan::scan("link"), Plan::scan("path")],
                vec![(ColumnRef::new("link", "to"), ColumnRef::new("path", "from"))],
            )
            .map(|t, _| Ok(tuple![t.values()[0].clone(), t.values()[3].clone()])),
        )
        .unwrap()
}

/// A chain of `n` links with short cycles every 10 nodes.
fn evaluator(n: i64, config: EvalConfig) -> Evaluator {
    let mut ev = Evaluator::new(closure_program(), config).unwrap();
    let links = (0..n).map(|i| tuple![i % 50, (i * 7 + 1) % 50]);
    ev.preload("link", links).unwrap();
    ev
}

fn bench_first_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick/first");
    group.sample_size(20);

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("closure", size), &size, |b, &size| {
            b.iter_batched(
                || evaluator(size, EvalConfig::default()),
                |mut ev| black_box(ev.tick(TickInput::new(0)).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_incremental_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick/incremental");
    group.sample_size(20);

    for (name, safe) in [("incremental", false), ("safe_mode", true)] {
        group.bench_function(BenchmarkId::new(name, 1000), |b| {
            let mut ev = evaluator(1000, EvalConfig::new().safe_mode(safe));
            ev.tick(TickInput::new(0)).unwrap();
            let mut now = 1u64;
            b.iter(|| {
                ev.insert("link", tuple![100 + now as i64, 0]).unwrap();
                black_box(ev.tick(TickInput::new(now)).unwrap());
                now += 1;
            })
        });
    }

    group.finish();
}

fn bench_empty_tick(c: &mut Criterion) {
    c.bench_function("tick/empty", |b| {
        let mut ev = evaluator(100, EvalConfig::default());
        ev.tick(TickInput::new(0)).unwrap();
        let mut now = 1u64;
        b.iter(|| {
            black_box(ev.tick(TickInput::new(now)).unwrap());
            now += 1;
        })
    });
}

criterion_group!(benches, bench_first_tick, bench_incremental_tick, bench_empty_tick);
criterion_main!(benches);
