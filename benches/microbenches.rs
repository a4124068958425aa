//! Criterion microbenches for labelfuse codecs and integrators.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - protobin encoding/decoding of predictions
//! - CSV writing of predictions
//! - majority vote and a short Bayesian chain on a synthetic dataset

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use labelfuse::data::io_csv::to_csv_string;
use labelfuse::data::io_protobin::{from_protobin_slice, to_protobin_bytes};
use labelfuse::data::PredictedInstance;
use labelfuse::evaluation::{generate_synthetic, SyntheticConfig};
use labelfuse::integrator::{IntegrationRequest, Integrator, SamplerConfig};

fn dataset() -> Vec<PredictedInstance> {
    generate_synthetic(SyntheticConfig::new(500, 5, 4), Some(0)).predicted
}

/// Benchmark protobin round trip.
fn bench_protobin(c: &mut Criterion) {
    let records = dataset();
    let bytes = to_protobin_bytes(&records);
    let mut group = c.benchmark_group("protobin");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("to_protobin_bytes", |b| {
        b.iter(|| black_box(to_protobin_bytes(black_box(&records))))
    });
    group.bench_function("from_protobin_slice", |b| {
        b.iter(|| {
            let decoded: Vec<PredictedInstance> = from_protobin_slice(black_box(&bytes)).unwrap();
            black_box(decoded)
        })
    });

    group.finish();
}

/// Benchmark CSV writing.
fn bench_csv_write(c: &mut Criterion) {
    let records = dataset();
    let mut group = c.benchmark_group("csv");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("to_csv_string", |b| {
        b.iter(|| black_box(to_csv_string(black_box(&records)).unwrap()))
    });

    group.finish();
}

/// Benchmark the cheapest and a representative stochastic integrator.
fn bench_integrators(c: &mut Criterion) {
    let request = IntegrationRequest::new(dataset())
        .with_integrated_labels(true)
        .with_seed(1);
    let bayesian = Integrator::Bayesian(SamplerConfig {
        burn_in_samples: 50,
        thinning_samples: 1,
        samples: 20,
        ..SamplerConfig::default()
    });
    let mut group = c.benchmark_group("integrate");
    group.sample_size(20);

    group.bench_function("majority_vote", |b| {
        b.iter(|| black_box(Integrator::MajorityVote.run(black_box(&request)).unwrap()))
    });
    group.bench_function("bayesian_short_chain", |b| {
        b.iter(|| black_box(bayesian.run(black_box(&request)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_protobin, bench_csv_write, bench_integrators);
criterion_main!(benches);
