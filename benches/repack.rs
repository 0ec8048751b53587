use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pde_explore::engine::{ClearEngine, Engine};
use pde_explore::params::PdeParams;
use pde_explore::registry::generate_key_material;
use pde_explore::repack::{MergeEvaluator, PackEvaluator};

fn pack_benchmark(c: &mut Criterion) {
    let engine = ClearEngine::with_seed(7);
    let params = PdeParams::test_small();
    let (secrets, keys) = generate_key_material(&engine, &params).unwrap();
    let res = params.min_resolution();
    let res_params = keys.registry.parameters_at(res).unwrap();
    let sk = secrets.get(res).unwrap();
    let n = res.ring_dim();

    let cts: Vec<_> = (0..n)
        .map(|i| {
            let log_scale = res_params.log_default_scale as f64;
            let pt = engine
                .encode_coeffs(res_params, &[0.01 * i as f64], 0, log_scale)
                .unwrap();
            engine.encrypt(&pt, sk).unwrap()
        })
        .collect();

    let packer = PackEvaluator::new(&engine, &keys.registry);
    let mut group = c.benchmark_group("pack");

    for count in [1, n / 4, n / 2, n] {
        let slots: BTreeMap<usize, _> = cts.iter().take(count).cloned().enumerate().collect();
        group.bench_with_input(BenchmarkId::new("rows", count), &slots, |b, slots| {
            b.iter(|| packer.pack(slots).unwrap())
        });
    }

    group.finish();
}

fn merge_tree_benchmark(c: &mut Criterion) {
    let engine = ClearEngine::with_seed(8);
    let params = PdeParams::test_small();
    let (secrets, keys) = generate_key_material(&engine, &params).unwrap();
    let res = params.min_resolution();
    let res_params = keys.registry.parameters_at(res).unwrap();
    let sk = secrets.get(res).unwrap();

    let values: Vec<f64> = (0..res.ring_dim()).map(|i| 0.001 * i as f64).collect();
    let pt = engine
        .encode_coeffs(res_params, &values, 0, res_params.log_default_scale as f64)
        .unwrap();
    let block = engine.encrypt(&pt, sk).unwrap();

    let merger = MergeEvaluator::new(&engine, &keys.registry).unwrap();
    let mut group = c.benchmark_group("merge_tree");

    for blocks in 1..=params.merge_ratio() {
        group.bench_with_input(BenchmarkId::new("blocks", blocks), &blocks, |b, &blocks| {
            b.iter(|| merger.merge_tree(vec![block.clone(); blocks]).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, pack_benchmark, merge_tree_benchmark);
criterion_main!(benches);
