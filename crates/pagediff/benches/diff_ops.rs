//! Diff Engine Benchmarks
//!
//! Benchmarks for colour distance, normalization, and full-page diffs.
//!
//! Run with: `cargo bench --bench diff_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagediff::{color_delta, diff, normalize, normalize_and_diff, DiffConfig, RasterImage, WHITE};

/// White page with a black line every 40 rows
fn striped(width: u32, height: u32) -> RasterImage {
    let mut image = RasterImage::white(width, height);
    for y in (0..height).step_by(40) {
        for x in 0..width {
            image.set_pixel(x, y, [0, 0, 0, 255]);
        }
    }
    image
}

fn bench_color_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_delta");

    let pairs = vec![
        ([0, 0, 0, 255], WHITE, "black_white"),
        ([255, 0, 0, 255], WHITE, "red_white"),
        ([10, 20, 30, 128], [40, 50, 60, 200], "translucent"),
    ];

    for (a, b, name) in pairs {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(a, b), |bench, (a, b)| {
            bench.iter(|| black_box(color_delta(black_box(*a), black_box(*b))));
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let baseline = RasterImage::white(1280, 800);

    for extra in [0_u32, 400, 2400] {
        let current = striped(1280, 800 + extra);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("1280x{}", 800 + extra)),
            &current,
            |bench, current| {
                bench.iter(|| black_box(normalize(&baseline, current)));
            },
        );
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    group.sample_size(20);
    let config = DiffConfig::default();

    for (width, height) in [(320_u32, 200_u32), (1280, 800)] {
        let a = RasterImage::white(width, height);
        let b = striped(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &(a, b),
            |bench, (a, b)| {
                bench.iter(|| black_box(diff(a, b, &config).unwrap()));
            },
        );
    }

    let baseline = RasterImage::white(1280, 800);
    let tall = striped(1280, 1600);
    group.bench_function("padded_1280x1600", |bench| {
        bench.iter(|| black_box(normalize_and_diff(&baseline, &tall, &config).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_color_delta, bench_normalize, bench_diff);
criterion_main!(benches);
