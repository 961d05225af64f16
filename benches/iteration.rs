use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use cipher_gd::gd::{
    encrypt_data, encrypt_weights, generate_aux_mask, lgd_iteration, mlgd_iteration,
    nlgd_iteration, TrainingContext,
};
use cipher_gd::math::ApproxDegree;
use cipher_gd::params::{PrecisionPlan, SchemeParams, UpdateRule, VelocityInit};
use cipher_gd::{SignedMatrix, SimScheme, SlotLayout};

fn iteration_benchmark(c: &mut Criterion) {
    let samples = 32;
    let factor_dim = 16;
    let rows = (0..samples)
        .map(|j| (0..factor_dim).map(|i| ((i + j) % 3) as f64 - 1.0).collect())
        .collect();
    let m = SignedMatrix::from_rows(rows).unwrap();

    let layout = SlotLayout::fit(factor_dim, samples, 8).unwrap();
    let scheme = SimScheme::new(SchemeParams::for_layout(&layout, 8).with_seed(1)).unwrap();
    let plan = PrecisionPlan::for_layout(&layout);
    let data = encrypt_data(&scheme, &m, &layout, &plan).unwrap();
    let state = encrypt_weights(&scheme, &layout, &data, &vec![0.0; factor_dim], VelocityInit::Zero).unwrap();
    let mask = generate_aux_mask(&scheme, &layout, &plan).unwrap();
    let ctx = TrainingContext {
        scheme: &scheme,
        layout: &layout,
        plan: &plan,
        data: &data,
        mask: &mask,
    };

    let mut group = c.benchmark_group("iteration");
    for degree in ApproxDegree::ALL {
        for rule in [UpdateRule::Plain, UpdateRule::Momentum, UpdateRule::Nesterov] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", rule).to_lowercase(), degree.degree()),
                &degree,
                |b, &degree| {
                    b.iter(|| match rule {
                        UpdateRule::Plain => lgd_iteration(&ctx, degree, 0.1, &state).unwrap(),
                        UpdateRule::Momentum => mlgd_iteration(&ctx, degree, 0.1, 0.9, &state).unwrap(),
                        UpdateRule::Nesterov => nlgd_iteration(&ctx, degree, 0.1, 0.9, &state).unwrap(),
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, iteration_benchmark);
criterion_main!(benches);
