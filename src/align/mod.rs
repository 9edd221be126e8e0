//! Geometric face normalization: rotate the source so the eye line is
//! horizontal, crop a square keyed to the inter-ocular distance, and resize
//! to a fixed side length.

use crate::common::{resize_bilinear, ImageData, Point};
use crate::error::{Error, Result};
use crate::math;

const FILL: u8 = 255;

/// Normalizer tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizerOptions {
    /// Crop padding `(ox, oy)`: `ox` is the horizontal margin on each side
    /// as a fraction of the inter-ocular distance; `oy` places the eye line
    /// at that relative height of the output.
    pub offset: (f64, f64),
    /// Side length of the square output crop.
    pub dest_size: u32,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        NormalizerOptions {
            offset: (0.5, 0.5),
            dest_size: 150,
        }
    }
}

impl NormalizerOptions {
    fn validate(&self) -> Result<()> {
        if self.dest_size == 0 {
            return Err(Error::InvalidOption("dest_size must be positive".into()));
        }
        let (ox, oy) = self.offset;
        if !ox.is_finite() || !oy.is_finite() || ox < 0.0 || oy < 0.0 {
            return Err(Error::InvalidOption(format!(
                "offset fractions must be non-negative, got ({ox}, {oy})"
            )));
        }
        Ok(())
    }
}

/// The normalized square crop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedFace {
    data: Vec<u8>,
    size: u32,
}

impl NormalizedFace {
    /// Side length of the square plane.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The luminance plane, row-major, `size * size` bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Produces upright, eye-distance-normalized face crops.
#[derive(Clone, Copy, Debug)]
pub struct FaceNormalizer {
    options: NormalizerOptions,
}

impl Default for FaceNormalizer {
    fn default() -> Self {
        FaceNormalizer {
            options: NormalizerOptions::default(),
        }
    }
}

impl FaceNormalizer {
    pub fn new() -> Self {
        FaceNormalizer::default()
    }

    pub fn with_options(options: NormalizerOptions) -> Result<Self> {
        options.validate()?;
        Ok(FaceNormalizer { options })
    }

    #[inline]
    pub fn options(&self) -> &NormalizerOptions {
        &self.options
    }

    /// Rotates the source about the eye midpoint so the eye line becomes
    /// horizontal, crops the square keyed to the inter-ocular distance and
    /// resizes it to `dest_size`. Regions outside the source read as white.
    ///
    /// Coincident eyes produce an all-white crop: the inter-ocular distance
    /// is zero, so the crop square is empty.
    pub fn normalize(
        &self,
        gray: &[u8],
        width: u32,
        height: u32,
        left: Point,
        right: Point,
    ) -> Result<NormalizedFace> {
        ImageData::new(gray, width, height).validate()?;

        let dest_size = self.options.dest_size;
        let (ox, oy) = self.options.offset;
        let angle = math::angle(left, right);
        let distance = math::distance(left, right);
        let (cx, cy) = math::center(left, right);

        let off_x = (ox * distance).round() as i64;
        let edge = (distance + 2.0 * off_x as f64).round() as i64;
        if edge < 1 {
            return Ok(NormalizedFace {
                data: vec![FILL; dest_size as usize * dest_size as usize],
                size: dest_size,
            });
        }
        let off_y = (oy * edge as f64).round() as i64;

        let rotated = rotate_about(gray, width, height, cx, cy, angle);

        // After rotation the eyes sit on the row through the midpoint, the
        // left one half the inter-ocular distance to its left.
        let crop_x = (cx - distance / 2.0).round() as i64 - off_x;
        let crop_y = cy.round() as i64 - off_y;
        let canvas = crop_square(&rotated, width, height, crop_x, crop_y, edge);

        let data = resize_bilinear(&canvas, edge as u32, edge as u32, dest_size, dest_size);
        Ok(NormalizedFace {
            data,
            size: dest_size,
        })
    }
}

/// Inverse-mapped rotation: output pixel `p` samples the source at
/// `c + R(angle) * (p - c)`, which rotates the image content by `-angle`
/// about `c`. Bilinear interpolation, white fill outside the source.
fn rotate_about(gray: &[u8], width: u32, height: u32, cx: f64, cy: f64, angle: f64) -> Vec<u8> {
    if angle == 0.0 {
        return gray.to_vec();
    }

    let w = width as usize;
    let h = height as usize;
    let (sin, cos) = angle.sin_cos();

    let mut out = vec![FILL; w * h];
    for y in 0..h {
        let dy = y as f64 - cy;
        for x in 0..w {
            let dx = x as f64 - cx;
            let src_x = cx + dx * cos - dy * sin;
            let src_y = cy + dx * sin + dy * cos;
            out[y * w + x] = sample_bilinear(gray, w, h, src_x, src_y);
        }
    }
    out
}

/// Bilinear sample with white outside the plane.
fn sample_bilinear(gray: &[u8], width: usize, height: usize, x: f64, y: f64) -> u8 {
    if x < -1.0 || y < -1.0 || x > width as f64 || y > height as f64 {
        return FILL;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let wx = x - x0;
    let wy = y - y0;

    let fetch = |ix: i64, iy: i64| -> f64 {
        if ix < 0 || iy < 0 || ix >= width as i64 || iy >= height as i64 {
            f64::from(FILL)
        } else {
            f64::from(gray[iy as usize * width + ix as usize])
        }
    };

    let x0 = x0 as i64;
    let y0 = y0 as i64;
    let value = (1.0 - wy) * ((1.0 - wx) * fetch(x0, y0) + wx * fetch(x0 + 1, y0))
        + wy * ((1.0 - wx) * fetch(x0, y0 + 1) + wx * fetch(x0 + 1, y0 + 1));
    value.round().clamp(0.0, 255.0) as u8
}

/// Extracts the `edge x edge` square at `(crop_x, crop_y)`, clamped to the
/// plane. A clamped region smaller than the square is pasted centered into a
/// white canvas.
fn crop_square(
    plane: &[u8],
    width: u32,
    height: u32,
    crop_x: i64,
    crop_y: i64,
    edge: i64,
) -> Vec<u8> {
    let mut canvas = vec![FILL; (edge * edge) as usize];

    let x0 = crop_x.max(0);
    let y0 = crop_y.max(0);
    let x1 = (crop_x + edge).min(i64::from(width));
    let y1 = (crop_y + edge).min(i64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return canvas;
    }

    let region_w = x1 - x0;
    let region_h = y1 - y0;
    let paste_x = (edge - region_w) / 2;
    let paste_y = (edge - region_h) / 2;

    let stride = width as usize;
    for row in 0..region_h {
        let src_start = (y0 + row) as usize * stride + x0 as usize;
        let dest_start = ((paste_y + row) * edge + paste_x) as usize;
        canvas[dest_start..dest_start + region_w as usize]
            .copy_from_slice(&plane[src_start..src_start + region_w as usize]);
    }
    canvas
}
