//! Throughput of the two bucket backends against the arkworks baseline.

use ark_bn254::{Fr, G1Affine, G1Projective};
use ark_ec::{CurveGroup, VariableBaseMSM};
use ark_ff::UniformRand;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use itertools::Itertools;
use multiexp_core::{msm, msm_batch_affine, MsmConfig};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

fn generate_inputs(n: usize, rng: &mut ChaCha20Rng) -> (Vec<G1Affine>, Vec<Fr>) {
    let points = (0..n)
        .map(|_| G1Projective::rand(rng).into_affine())
        .collect_vec();
    let scalars = (0..n).map(|_| Fr::rand(rng)).collect_vec();
    (points, scalars)
}

fn bench_msm(c: &mut Criterion) {
    let mut group = c.benchmark_group("msm_bn254_g1");
    group.sample_size(10);

    for exp in [10, 12, 14, 16] {
        let n = 1usize << exp;
        let mut rng = ChaCha20Rng::seed_from_u64(12345);
        let (points, scalars) = generate_inputs(n, &mut rng);
        let cfg = MsmConfig::default();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("extended_jacobian", n), &n, |b, _| {
            b.iter(|| msm(&points, &scalars, &cfg).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("batch_affine", n), &n, |b, _| {
            b.iter(|| msm_batch_affine(&points, &scalars, &cfg).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("arkworks", n), &n, |b, _| {
            b.iter(|| <G1Projective as VariableBaseMSM>::msm(&points, &scalars).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_msm);
criterion_main!(benches);
