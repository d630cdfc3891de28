use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracker_core::{
    AssociationStrategy, Measurement, Scan, ScanProcessor, TrackStore, TrackerConfig,
};

/// `n` targets spread over a ring of radius 40 km, drifting outward at 100 m/s.
fn make_scan(n: usize, t: f64) -> Scan {
    let measurements = (0..n)
        .map(|i| {
            let azimuth = i as f64 * 360.0 / n as f64;
            Measurement::new(40_000.0 + 100.0 * t, azimuth, 1.0, t, None)
        })
        .collect();
    Scan::new(t, measurements)
}

fn bench_strategy(c: &mut Criterion, strategy: AssociationStrategy, sizes: &[usize]) {
    let mut group = c.benchmark_group(format!("scan_{strategy:?}"));
    let config = TrackerConfig {
        association: strategy,
        ..Default::default()
    };

    for &n in sizes {
        group.bench_function(format!("{n}_targets"), |b| {
            b.iter(|| {
                let Ok(mut processor) = ScanProcessor::new(config.clone()) else {
                    return;
                };
                let mut store = TrackStore::new();
                // Warm up with one scan to create tracks
                let _ = processor.process_scan(&mut store, &make_scan(n, 0.0));
                // Measure a full scan with established tracks
                let scan = make_scan(n, 1.0);
                let _ = black_box(processor.process_scan(&mut store, &scan));
            });
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    bench_strategy(c, AssociationStrategy::OptimalAssignment, &[50, 500, 1000]);
    bench_strategy(c, AssociationStrategy::ProbabilisticJoint, &[50, 200]);
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
