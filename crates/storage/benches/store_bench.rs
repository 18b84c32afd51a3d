//! Benchmarks for tidal-storage stores.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tidal_core::{tuple, Schema, Tuple, Value};
use tidal_incremental::{ChangeSet, Delta};
use tidal_storage::{Backend, KvStore, MemoryStore, StoreMirror};

fn populate(store: &mut MemoryStore, count: i64) {
    for i in 0..count {
        store
            .put(vec![Value::Int64(i)], tuple![i, format!("v{}", i)])
            .unwrap();
    }
    store.commit().unwrap();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_store/commit");

    for size in [100i64, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("put", size), &size, |b, &size| {
            b.iter_batched(
                || MemoryStore::new("kv"),
                |mut store| {
                    populate(&mut store, size);
                    black_box(store)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_mirror_apply(c: &mut Criterion) {
    let schema = Schema::new("kv", &["k"], &["v"]).unwrap();
    let mut changes = ChangeSet::new();
    for i in 0..1000i64 {
        changes.push("kv", Delta::insert(tuple![i, i * 2]));
    }
    let deltas: Vec<Delta<Tuple>> = changes.get("kv").to_vec();

    c.bench_function("mirror/apply_1000", |b| {
        b.iter_batched(
            || {
                let store = Backend::Memory.open("kv").unwrap();
                StoreMirror::new(schema.clone(), store, false).unwrap()
            },
            |mut m| black_box(m.apply(&deltas).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_commit, bench_mirror_apply);
criterion_main!(benches);
