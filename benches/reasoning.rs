//! Benchmarks for the reasoning pipeline.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use paideia::cf;
use paideia::tutor::Tutor;

fn bench_cf_aggregate(c: &mut Criterion) {
    let contributions: Vec<(String, f32)> = (0..50)
        .map(|i| (format!("rule-{i:03}"), 0.5 + (i % 5) as f32 * 0.1))
        .collect();

    c.bench_function("cf_aggregate_50", |bench| {
        bench.iter(|| {
            black_box(cf::aggregate(
                contributions.iter().map(|(id, cf)| (id.as_str(), *cf)),
            ))
        })
    });
}

fn bench_full_cycle(c: &mut Criterion) {
    let mut tutor = Tutor::new();
    tutor.update_profile("sleep_hours", 5i64).unwrap();
    tutor.update_profile("stress_level", "high").unwrap();

    c.bench_function("process_query_memory", |bench| {
        bench.iter(|| black_box(tutor.process_query("How can I remember more information?")))
    });
}

fn bench_clarify_cycle(c: &mut Criterion) {
    let mut tutor = Tutor::new();

    c.bench_function("process_query_clarify", |bench| {
        bench.iter(|| {
            tutor.reset_dialogue();
            black_box(tutor.process_query("What are animal tissues?"))
        })
    });
}

criterion_group!(
    benches,
    bench_cf_aggregate,
    bench_full_cycle,
    bench_clarify_cycle
);
criterion_main!(benches);
