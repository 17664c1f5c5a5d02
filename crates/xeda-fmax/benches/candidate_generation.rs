use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xeda_core::rng::RngHandle;
use xeda_fmax::{generate, FmaxConfig, SearchInterval, TriedSet};

fn bench_generation(c: &mut Criterion) {
    let config = FmaxConfig::default();
    c.bench_function("fresh_window_16_workers", |b| {
        b.iter(|| {
            let mut interval = SearchInterval { lo: 1.0, hi: 600.0 };
            let mut rng = RngHandle::from_seed(1);
            let batch = generate(&mut interval, &TriedSet::default(), 16, &config, &mut rng)
                .expect("untried candidates");
            black_box(batch);
        });
    });

    c.bench_function("crowded_window_widening", |b| {
        b.iter(|| {
            let mut interval = SearchInterval {
                lo: 200.0,
                hi: 210.0,
            };
            let mut tried = TriedSet::default();
            let mut rng = RngHandle::from_seed(2);
            for _ in 0..8 {
                let batch = generate(&mut interval, &tried, 8, &config, &mut rng)
                    .expect("untried candidates");
                tried.record(&batch);
            }
            black_box(tried.len());
        });
    });
}

criterion_group!(benches, bench_generation);
criterion_main!(benches);
