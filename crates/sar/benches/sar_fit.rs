//! Fit and scoring benchmarks over synthetic interaction logs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sar_recommender::{Interaction, RecommendParams, SarConfig, SarModel, SimilarityMetric};

/// Generate a log where item popularity is skewed toward low ids
fn generate_log(users: u32, items: u32, per_user: usize, seed: u64) -> Vec<Interaction<u32, u32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut log = Vec::with_capacity(users as usize * per_user);

    for user in 0..users {
        for _ in 0..per_user {
            let skew: f64 = rng.gen::<f64>().powi(2);
            let item = (skew * f64::from(items)) as u32;
            log.push(Interaction::new(user, item.min(items - 1)).with_weight(rng.gen_range(1.0..5.0)));
        }
    }

    log
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("sar_fit");
    group.sample_size(20);

    for users in [500u32, 2_000] {
        let log = generate_log(users, 1_000, 20, 42);
        group.throughput(Throughput::Elements(log.len() as u64));

        for (name, config) in [
            ("sequential", SarConfig::default().sequential()),
            ("parallel", SarConfig::default()),
        ] {
            group.bench_with_input(BenchmarkId::new(name, users), &log, |b, log| {
                b.iter(|| SarModel::fit(config.clone(), black_box(log)).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_recommend(c: &mut Criterion) {
    let log = generate_log(2_000, 1_000, 20, 7);
    let model = SarModel::fit(SarConfig::default().with_metric(SimilarityMetric::Cosine), &log).unwrap();
    let users: Vec<u32> = (0..256).collect();
    let params = RecommendParams::top_k(10);

    c.bench_function("sar_recommend_256_users", |b| {
        b.iter(|| model.recommend(black_box(&users), &params).unwrap())
    });
}

criterion_group!(benches, bench_fit, bench_recommend);
criterion_main!(benches);
