//! Pixel-plane primitives: grayscale conversion, separable convolution,
//! Sobel magnitude, histogram equalization, gradients and projections.
//!
//! All functions here are pure; planes are row-major with stride = width.

/// Converts interleaved RGBA bytes to an 8-bit luminance plane.
///
/// Uses the BT.601 integer approximation `(R*13933 + G*46871 + B*4732) >> 16`,
/// which stays within one count of the floating-point weights.
///
/// Panics if `rgba` does not hold exactly `4 * width * height` bytes.
pub fn grayscale(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    assert_eq!(rgba.len(), pixels * 4);

    let mut gray = Vec::with_capacity(pixels);
    for px in rgba.chunks_exact(4) {
        gray.push(luma(px[0], px[1], px[2]));
    }
    gray
}

/// Like [`grayscale`], but returns an RGBA plane with R = G = B = luma and
/// the alpha channel preserved.
pub fn grayscale_rgba(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    assert_eq!(rgba.len(), pixels * 4);

    let mut out = Vec::with_capacity(rgba.len());
    for px in rgba.chunks_exact(4) {
        let l = luma(px[0], px[1], px[2]);
        out.extend_from_slice(&[l, l, l, px[3]]);
    }
    out
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 13933 + u32::from(g) * 46871 + u32::from(b) * 4732) >> 16) as u8
}

/// 1D convolution along image rows with clamp-to-edge boundary handling.
/// The kernel length is expected to be odd.
pub fn horizontal_convolve(src: &[f32], width: u32, height: u32, kernel: &[f32]) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(src.len(), w * h);
    let half_side = kernel.len() / 2;

    let mut dest = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                let sx = (x + k).saturating_sub(half_side).min(w - 1);
                acc += row[sx] * weight;
            }
            dest[y * w + x] = acc;
        }
    }
    dest
}

/// 1D convolution along image columns with clamp-to-edge boundary handling.
/// The kernel length is expected to be odd.
pub fn vertical_convolve(src: &[f32], width: u32, height: u32, kernel: &[f32]) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(src.len(), w * h);
    let half_side = kernel.len() / 2;

    let mut dest = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = (y + k).saturating_sub(half_side).min(h - 1);
                acc += src[sy * w + x] * weight;
            }
            dest[y * w + x] = acc;
        }
    }
    dest
}

/// Separable 2D convolution: the vertical pass first, then the horizontal
/// pass.
pub fn separable_convolve(
    src: &[f32],
    width: u32,
    height: u32,
    vertical_kernel: &[f32],
    horizontal_kernel: &[f32],
) -> Vec<f32> {
    let tmp = vertical_convolve(src, width, height, vertical_kernel);
    horizontal_convolve(&tmp, width, height, horizontal_kernel)
}

/// Sobel gradient magnitude `sqrt(Gx^2 + Gy^2)` of a luminance plane, using
/// the separable `[-1, 0, 1]` / `[1, 2, 1]` kernel pair.
pub fn sobel(plane: &[u8], width: u32, height: u32) -> Vec<f32> {
    let src: Vec<f32> = plane.iter().map(|&v| f32::from(v)).collect();
    let sign = [-1.0f32, 0.0, 1.0];
    let scale = [1.0f32, 2.0, 1.0];

    let gradient_x = separable_convolve(&src, width, height, &scale, &sign);
    let gradient_y = separable_convolve(&src, width, height, &sign, &scale);

    gradient_x
        .iter()
        .zip(gradient_y.iter())
        .map(|(gx, gy)| gx.hypot(*gy))
        .collect()
}

/// In-place histogram equalization.
///
/// The 256-bin histogram is built from every `step`-th pixel and the
/// cumulative distribution is normalized by `255 * step / len`; the
/// subsampled normalization applies to all pixels regardless of which ones
/// contributed to the histogram. `step > 1` trades equalization accuracy
/// for speed.
pub fn equalize_hist(plane: &mut [u8], step: usize) {
    if plane.is_empty() {
        return;
    }
    let step = step.max(1);

    let mut histogram = [0u32; 256];
    let mut i = 0;
    while i < plane.len() {
        histogram[plane[i] as usize] += 1;
        i += step;
    }

    let norm = 255.0 * step as f64 / plane.len() as f64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (bin, entry) in lut.iter_mut().enumerate() {
        cumulative += histogram[bin];
        *entry = (f64::from(cumulative) * norm).round().min(255.0) as u8;
    }

    for value in plane.iter_mut() {
        *value = lut[*value as usize];
    }
}

/// Squared forward difference along x. The missing neighbor at the last
/// column is treated as equal to the current pixel, giving zero gradient.
pub fn gradient_x(plane: &[u8], width: u32, height: u32) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(plane.len(), w * h);

    let mut dest = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w.saturating_sub(1) {
            let d = i32::from(plane[y * w + x + 1]) - i32::from(plane[y * w + x]);
            dest[y * w + x] = (d * d) as f32;
        }
    }
    dest
}

/// Squared forward difference along y. The missing neighbor at the last row
/// is treated as equal to the current pixel, giving zero gradient.
pub fn gradient_y(plane: &[u8], width: u32, height: u32) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(plane.len(), w * h);

    let mut dest = vec![0.0f32; w * h];
    for y in 0..h.saturating_sub(1) {
        for x in 0..w {
            let d = i32::from(plane[(y + 1) * w + x]) - i32::from(plane[y * w + x]);
            dest[y * w + x] = (d * d) as f32;
        }
    }
    dest
}

/// Half-open region `[x1, x2) x [y1, y2)` used to restrict projections.
pub type Roi = [usize; 4];

/// Column sums of `plane`, optionally restricted to `roi`. The output has
/// one entry per column of the (restricted) region.
pub fn projection_x(plane: &[f32], width: u32, height: u32, roi: Option<Roi>) -> Vec<f64> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(plane.len(), w * h);
    let [x1, x2, y1, y2] = clamp_roi(roi, w, h);

    let mut sums = vec![0.0f64; x2 - x1];
    for y in y1..y2 {
        for x in x1..x2 {
            sums[x - x1] += f64::from(plane[y * w + x]);
        }
    }
    sums
}

/// Row sums of `plane`, optionally restricted to `roi`. The output has one
/// entry per row of the (restricted) region.
pub fn projection_y(plane: &[f32], width: u32, height: u32, roi: Option<Roi>) -> Vec<f64> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(plane.len(), w * h);
    let [x1, x2, y1, y2] = clamp_roi(roi, w, h);

    let mut sums = vec![0.0f64; y2 - y1];
    for y in y1..y2 {
        for x in x1..x2 {
            sums[y - y1] += f64::from(plane[y * w + x]);
        }
    }
    sums
}

fn clamp_roi(roi: Option<Roi>, width: usize, height: usize) -> Roi {
    match roi {
        Some([x1, x2, y1, y2]) => [
            x1.min(width),
            x2.min(width).max(x1.min(width)),
            y1.min(height),
            y2.min(height).max(y1.min(height)),
        ],
        None => [0, width, 0, height],
    }
}

/// Hann-windowed column projection of a luminance plane. The argmax of the
/// returned scores estimates the vertical axis of left/right facial
/// symmetry.
pub fn horizontal_symmetry(plane: &[u8], width: u32, height: u32) -> Vec<f64> {
    let w = width as usize;
    let h = height as usize;
    assert_eq!(plane.len(), w * h);

    let mut scores = vec![0.0f64; w];
    for y in 0..h {
        for x in 0..w {
            scores[x] += f64::from(plane[y * w + x]);
        }
    }

    if w > 1 {
        let span = (w - 1) as f64;
        for (x, score) in scores.iter_mut().enumerate() {
            let hann = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * x as f64 / span).cos());
            *score *= hann;
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn grayscale_reference_colors() {
        let rgba = [
            255, 255, 255, 255, //
            0, 0, 0, 255, //
            255, 0, 0, 255,
        ];
        let gray = grayscale(&rgba, 3, 1);
        assert_eq!(gray[0], 255);
        assert_eq!(gray[1], 0);
        assert!((i32::from(gray[2]) - 54).abs() <= 1);
    }

    #[test]
    fn grayscale_is_idempotent() {
        let rgba = [10u8, 200, 30, 255, 90, 90, 90, 128, 255, 0, 255, 0];
        let filled = grayscale_rgba(&rgba, 3, 1);
        // Alpha survives the fill.
        assert_eq!(filled[7], 128);
        assert_eq!(grayscale(&filled, 3, 1), grayscale(&rgba, 3, 1));
    }

    #[test]
    fn identity_kernel_matches_single_pass() {
        let plane: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let separable = separable_convolve(&plane, 4, 3, &[1.0], &[1.0]);
        let horizontal = horizontal_convolve(&plane, 4, 3, &[1.0]);
        assert_eq!(separable, horizontal);
        assert_eq!(separable, plane);
    }

    #[test]
    fn convolve_clamps_at_edges() {
        let plane = [1.0f32, 2.0, 3.0];
        let out = horizontal_convolve(&plane, 3, 1, &[1.0, 1.0, 1.0]);
        // Leftmost pixel re-reads itself for the missing neighbor.
        assert_relative_eq!(out[0], 4.0f32);
        assert_relative_eq!(out[1], 6.0f32);
        assert_relative_eq!(out[2], 8.0f32);
    }

    #[test]
    fn sobel_flat_plane_is_zero() {
        let plane = vec![128u8; 25];
        let mag = sobel(&plane, 5, 5);
        assert!(mag.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn sobel_vertical_edge_has_energy() {
        // Left half black, right half white.
        let mut plane = vec![0u8; 6 * 6];
        for y in 0..6 {
            for x in 3..6 {
                plane[y * 6 + x] = 255;
            }
        }
        let mag = sobel(&plane, 6, 6);
        assert!(mag[2 * 6 + 3] > 0.0);
        assert_eq!(mag[2 * 6 + 1], 0.0);
    }

    #[test]
    fn equalize_constant_plane() {
        let mut plane = vec![128u8; 100];
        equalize_hist(&mut plane, 5);
        assert!(plane.iter().all(|&v| v == 255));
    }

    #[test]
    fn equalize_spreads_two_levels() {
        let mut plane = vec![100u8; 64];
        for v in plane.iter_mut().take(32) {
            *v = 50;
        }
        equalize_hist(&mut plane, 1);
        // The darker half maps near the middle, the brighter half to the top.
        assert!(plane[0] < plane[63]);
        assert_eq!(plane[63], 255);
    }

    #[test]
    fn gradient_edges_are_zero() {
        let plane = [0u8, 10, 0, 10, 0, 10];
        let gx = gradient_x(&plane, 3, 2);
        assert_eq!(gx[0], 100.0);
        assert_eq!(gx[2], 0.0);
        let gy = gradient_y(&plane, 3, 2);
        assert_eq!(gy[0], 100.0);
        assert_eq!(gy[3], 0.0);
    }

    #[test]
    fn projections_with_roi() {
        let plane: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let cols = projection_x(&plane, 4, 4, Some([1, 3, 0, 2]));
        assert_eq!(cols, vec![1.0 + 5.0, 2.0 + 6.0]);
        let rows = projection_y(&plane, 4, 4, Some([1, 3, 0, 2]));
        assert_eq!(rows, vec![1.0 + 2.0, 5.0 + 6.0]);
    }

    #[test]
    fn symmetry_peaks_at_bright_center_column() {
        let mut plane = vec![10u8; 9 * 5];
        for y in 0..5 {
            plane[y * 9 + 4] = 250;
        }
        let scores = horizontal_symmetry(&plane, 9, 5);
        let axis = crate::math::find_max_index(&scores, 0, 0);
        assert_eq!(axis, 4);
    }
}
