//! Criterion benchmarks for the experiment worker pool.

use criterion::{criterion_group, criterion_main, Criterion};
use nucleus_bench::sweep_experiment;

/// Benchmark: 16 scenarios of 1K plans each, sequential vs four workers.
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_16x1k");
    for threads in [0, 4] {
        let experiment = sweep_experiment(16, 1_000, threads).unwrap();
        group.bench_function(format!("threads_{threads}"), |b| {
            b.iter(|| {
                let summary = experiment.execute().unwrap();
                std::hint::black_box(summary.succeeded);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sweep);
criterion_main!(benches);
