use criterion::{criterion_group, criterion_main, Criterion};

use facealign::feat::{IntegralImages, IntegralOptions};
use facealign::{Cascade, DetectorOptions, ImageData, ObjectDetector};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

/// A deterministic textured frame; uniform planes would let the cascade
/// early-outs skew the numbers.
fn synthetic_frame() -> Vec<u8> {
    let mut plane = vec![0u8; WIDTH as usize * HEIGHT as usize];
    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            plane[y * WIDTH as usize + x] = ((x * 7 + y * 13) % 256) as u8;
        }
    }
    plane
}

fn synthetic_rgba() -> Vec<u8> {
    let mut rgba = Vec::with_capacity(WIDTH as usize * HEIGHT as usize * 4);
    for value in synthetic_frame() {
        rgba.extend_from_slice(&[value, value.wrapping_add(40), value.wrapping_mul(3), 255]);
    }
    rgba
}

/// Three stages of stumps over a 20x20 window, thresholds tuned so textured
/// windows survive a stage or two before rejection.
fn synthetic_cascade() -> Cascade {
    let mut flat = vec![20.0, 20.0];
    for stage in 0..3 {
        flat.extend_from_slice(&[0.5, 2.0]);
        for weak in 0..2 {
            let offset = f64::from(stage * 2 + weak);
            flat.extend_from_slice(&[
                0.0,
                2.0, // rect count
                2.0 + offset,
                2.0,
                8.0,
                6.0,
                -1.0,
                2.0 + offset,
                5.0,
                8.0,
                3.0,
                2.0,
                0.02,
                0.6,
                -0.4,
            ]);
        }
    }
    Cascade::from_flat(flat).unwrap()
}

fn bench_integral_images(c: &mut Criterion) {
    let frame = synthetic_frame();
    c.bench_function("integral_images_all", |b| {
        b.iter(|| IntegralImages::compute(&frame, WIDTH, HEIGHT, IntegralOptions::all()).unwrap())
    });
    c.bench_function("integral_images_scan", |b| {
        b.iter(|| {
            IntegralImages::compute(&frame, WIDTH, HEIGHT, IntegralOptions::scan(false)).unwrap()
        })
    });
}

fn bench_detector(c: &mut Criterion) {
    let frame = synthetic_frame();
    let detector = ObjectDetector::with_options(
        synthetic_cascade(),
        DetectorOptions {
            scale_factor: 1.25,
            step_size: 2.0,
            ..Default::default()
        },
    )
    .unwrap();

    c.bench_function("detector_scan_320x240", |b| {
        b.iter(|| {
            detector
                .detect(ImageData::new(&frame, WIDTH, HEIGHT))
                .unwrap()
        })
    });
}

fn bench_grayscale(c: &mut Criterion) {
    let rgba = synthetic_rgba();
    c.bench_function("grayscale_320x240", |b| {
        b.iter(|| facealign::imgproc::grayscale(&rgba, WIDTH, HEIGHT))
    });
}

criterion_group!(
    benches,
    bench_integral_images,
    bench_detector,
    bench_grayscale
);
criterion_main!(benches);
