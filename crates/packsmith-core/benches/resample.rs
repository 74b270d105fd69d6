use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use image::{Rgba, RgbaImage};
use packsmith_core::resample::{BACKGROUND, DEFAULT_BLEED, bleed_alpha, downsample_separate_channels};

/// Random opaque blobs on a transparent tile, roughly like a cut-out sprite.
fn generate_sprite(size: u32) -> RgbaImage {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut img = RgbaImage::new(size, size);
    for _ in 0..(size / 4).max(1) {
        let cx = rng.gen_range(0..size);
        let cy = rng.gen_range(0..size);
        let r = rng.gen_range(1..=(size / 8).max(1));
        let colour = Rgba([rng.r#gen(), rng.r#gen(), rng.r#gen(), 255]);
        for y in cy.saturating_sub(r)..(cy + r).min(size) {
            for x in cx.saturating_sub(r)..(cx + r).min(size) {
                img.put_pixel(x, y, colour);
            }
        }
    }
    img
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");

    for size in [32u32, 128, 512] {
        let sprite = generate_sprite(size);
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("bleed_alpha", size), &sprite, |b, img| {
            b.iter(|| black_box(bleed_alpha(img, DEFAULT_BLEED, BACKGROUND)));
        });

        group.bench_with_input(BenchmarkId::new("downsample_half", size), &sprite, |b, img| {
            b.iter(|| black_box(downsample_separate_channels(img, 0.5, DEFAULT_BLEED)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resample);
criterion_main!(benches);
