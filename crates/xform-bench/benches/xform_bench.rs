//! Benchmarks for GPU transforms.
//!
//! Run with: `cargo bench`. Skipped when no adapter is available.

use std::f32::consts::FRAC_PI_6;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use xform_compute::{Environment, HostImage, SourceImage};

const SIZES: [u32; 3] = [256, 1024, 2048];

fn noise(side: u32) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..side * side * 3)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn sources(env: &Environment) -> Vec<(u32, SourceImage)> {
    SIZES
        .iter()
        .map(|&side| {
            let data = noise(side);
            let src = env.create_source_image(&HostImage::rgb(&data, side, side)).unwrap();
            (side, src)
        })
        .collect()
}

/// Host to device copy.
fn bench_upload(c: &mut Criterion) {
    let Ok(env) = Environment::new() else { return };
    let mut group = c.benchmark_group("upload");

    for side in SIZES {
        let data = noise(side);
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), &data, |b, data| {
            b.iter(|| {
                env.create_source_image(&HostImage::rgb(black_box(data), side, side))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Dispatch plus blocking readback, per operation.
fn bench_transforms(c: &mut Criterion) {
    let Ok(env) = Environment::new() else { return };
    let mut group = c.benchmark_group("transform");

    for (side, src) in sources(&env) {
        group.throughput(Throughput::Elements((side * side) as u64));

        group.bench_with_input(BenchmarkId::new("scale_x1", side), &src, |b, src| {
            b.iter(|| env.scale(src, black_box(1.0), 1.0).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("rotate", side), &src, |b, src| {
            b.iter(|| env.rotate(src, black_box(FRAC_PI_6)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("flip_hv", side), &src, |b, src| {
            b.iter(|| env.flip(src, true, true).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_upload, bench_transforms);
criterion_main!(benches);
