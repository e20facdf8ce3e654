use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{Rgba, RgbaImage};
use qrstudio::services::{QrcodeEncoder, RenderPipeline, encode_png};
use qrstudio::{GenerationParameters, LogoAsset};
use std::hint::black_box;
use std::sync::Arc;

fn bench_render(c: &mut Criterion) {
    let pipeline = RenderPipeline::new(Arc::new(QrcodeEncoder::new()));
    let logo_png = encode_png(&RgbaImage::from_pixel(256, 256, Rgba([30, 60, 200, 255])))
        .expect("logo encodes");
    let logo = LogoAsset::new(logo_png, "image/png", "logo.png");

    let mut group = c.benchmark_group("render");

    for size in [200u32, 512, 1024] {
        let base = GenerationParameters {
            text: "https://example.com/some/longer/path?with=query".to_string(),
            size,
            ..GenerationParameters::default()
        };
        let with_logo = GenerationParameters {
            logo: Some(logo.clone()),
            ..base.clone()
        };

        group.bench_with_input(BenchmarkId::new("base", size), &base, |b, params| {
            b.iter(|| pipeline.render(black_box(params)))
        });

        group.bench_with_input(BenchmarkId::new("with_logo", size), &with_logo, |b, params| {
            b.iter(|| pipeline.render(black_box(params)))
        });
    }

    group.finish();

    // Export path: encode the largest artifact
    let artifact = pipeline
        .render(&GenerationParameters {
            size: 1024,
            ..GenerationParameters::default()
        })
        .expect("render succeeds");
    c.bench_function("png_encode_1024", |b| b.iter(|| artifact.to_png()));
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
