// benches/benchmark.rs
//
// Throughput of the common raster operations on a 512x512 image.

use criterion::{criterion_group, criterion_main, Criterion};
use rasterkit::engine::pipeline;
use rasterkit::{Color, ImageType, Raster, RasterHandle, ScalingType, Size};
use std::hint::black_box;

fn gradient(width: u32, height: u32) -> Raster {
    let data = (0..height)
        .flat_map(|y| (0..width).flat_map(move |x| [(x % 256) as u8, (y % 256) as u8, 128, 255]))
        .collect();
    Raster::from_packed(
        width,
        height,
        rasterkit::engine::ColorModel::Rgb,
        rasterkit::engine::AlphaInfo::Premultiplied,
        data,
    )
    .expect("benchmark raster")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let raster = gradient(512, 512);

    c.bench_function("scale 512 -> 256 aspect fit", |b| {
        b.iter(|| pipeline::scale(black_box(&raster), ScalingType::AspectFit, Size::new(256.0, 256.0)))
    });
    c.bench_function("tint 512 keeping alpha", |b| {
        b.iter(|| pipeline::tint(black_box(&raster), Color::rgb(0.2, 0.4, 0.9), true))
    });
    c.bench_function("grayscale 512", |b| {
        b.iter(|| pipeline::grayscale(black_box(&raster), false))
    });
    c.bench_function("rotate 512 by 30 degrees", |b| {
        b.iter(|| pipeline::rotate_by(black_box(&raster), 30f32.to_radians()))
    });

    let handle = RasterHandle::new(raster.clone());
    c.bench_function("encode 512 jpeg 0.8", |b| {
        b.iter(|| handle.encode(ImageType::Jpeg, Some(0.8), false))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
