//! Marshaling benchmarks
//!
//! Compares the two ways a batch crosses into the interpreter: building a
//! `list[dict]` object graph versus encoding JSON into a `bytearray`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pybridge::{marshal, marshal_batch, marshal_json, synthetic_fleet, MetricsRecord};
use pyo3::Python;

fn bench_single_record(c: &mut Criterion) {
    let record = MetricsRecord::new("pod-7", 3, 0.42, 5);

    Python::with_gil(|py| {
        c.bench_function("marshal/record", |b| {
            b.iter(|| marshal(py, black_box(&record)))
        });
    });
}

fn bench_batch_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    Python::with_gil(|py| {
        for pods in [30, 100, 1000].iter() {
            let fleet = synthetic_fleet(*pods, 30);

            group.bench_with_input(BenchmarkId::new("objects", pods), &fleet, |b, fleet| {
                b.iter(|| marshal_batch(py, black_box(fleet)))
            });

            group.bench_with_input(BenchmarkId::new("json", pods), &fleet, |b, fleet| {
                b.iter(|| marshal_json(py, black_box(fleet)))
            });
        }
    });

    group.finish();
}

criterion_group!(benches, bench_single_record, bench_batch_paths);
criterion_main!(benches);
