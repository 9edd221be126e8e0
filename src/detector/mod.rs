//! The Viola-Jones object detector: a multi-scale sliding-window evaluation
//! of a Haar cascade over integral images.
//!
//! Candidate windows flow through a fixed sequence of gates: optional
//! edge-density rejection, variance normalization, then the cascade stages
//! with the classical early-out. Surviving rectangles are grouped and
//! averaged into [`Detection`]s.

use crate::common::{Detection, ImageData, Rectangle, Seq};
use crate::error::{Error, Result};
use crate::feat::{IntegralImages, IntegralOptions};
use crate::math::DisjointSet;
use crate::model::Cascade;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Tuning parameters of the multi-scale scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorOptions {
    /// Scale of the first pyramid level, `>= 1`.
    pub initial_scale: f64,
    /// Multiplier between pyramid levels, `> 1`.
    pub scale_factor: f64,
    /// Window step in units of the current scale, `>= 1`.
    pub step_size: f64,
    /// Minimum fraction of edge energy a window must contain, in `[0, 1]`;
    /// 0 disables the early rejection and the Sobel integral.
    pub edges_density: f64,
    /// Minimum number of raw windows that must agree on a detection; 0
    /// disables merging entirely.
    pub neighbors: u32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        DetectorOptions {
            initial_scale: 1.0,
            scale_factor: 1.25,
            step_size: 1.5,
            edges_density: 0.0,
            neighbors: 1,
        }
    }
}

impl DetectorOptions {
    fn validate(&self) -> Result<()> {
        if !self.initial_scale.is_finite() || self.initial_scale < 1.0 {
            return Err(Error::InvalidOption(format!(
                "initial_scale must be >= 1, got {}",
                self.initial_scale
            )));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(Error::InvalidOption(format!(
                "scale_factor must be > 1, got {}",
                self.scale_factor
            )));
        }
        if !self.step_size.is_finite() || self.step_size < 1.0 {
            return Err(Error::InvalidOption(format!(
                "step_size must be >= 1, got {}",
                self.step_size
            )));
        }
        if !self.edges_density.is_finite() || !(0.0..=1.0).contains(&self.edges_density) {
            return Err(Error::InvalidOption(format!(
                "edges_density must be within [0, 1], got {}",
                self.edges_density
            )));
        }
        Ok(())
    }
}

/// A cascade plus scan parameters. Cheap to clone; safe to share across
/// threads.
#[derive(Clone, Debug)]
pub struct ObjectDetector {
    cascade: Cascade,
    options: DetectorOptions,
}

impl ObjectDetector {
    /// Creates a detector with default options.
    pub fn new(cascade: Cascade) -> Self {
        ObjectDetector {
            cascade,
            options: DetectorOptions::default(),
        }
    }

    /// Creates a detector with explicit options, validating them up front.
    pub fn with_options(cascade: Cascade, options: DetectorOptions) -> Result<Self> {
        options.validate()?;
        Ok(ObjectDetector { cascade, options })
    }

    #[inline]
    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    #[inline]
    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    /// Runs the multi-scale scan and returns merged detections in a stable
    /// order: smallest scale first, then top-to-bottom, then left-to-right;
    /// after merging, groups keep the order of their earliest member.
    pub fn detect(&self, image: ImageData<'_>) -> Result<Vec<Detection>> {
        image.validate()?;
        let width = image.width();
        let height = image.height();

        let use_edges = self.options.edges_density > 0.0;
        let integrals = IntegralImages::compute(
            image.data(),
            width,
            height,
            IntegralOptions::scan(use_edges),
        )?;

        let scales = self.scales(width, height);

        #[cfg(feature = "rayon")]
        let per_scale: Vec<Vec<Rectangle>> = scales
            .par_iter()
            .map(|&scale| self.scan_scale(&integrals, width, height, scale))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let per_scale: Vec<Vec<Rectangle>> = scales
            .iter()
            .map(|&scale| self.scan_scale(&integrals, width, height, scale))
            .collect();

        let windows: Vec<Rectangle> = per_scale.into_iter().flatten().collect();
        Ok(merge_detections(&windows, self.options.neighbors))
    }

    /// Pyramid scales whose scaled window still fits the image.
    fn scales(&self, width: u32, height: u32) -> Vec<f64> {
        let window_width = f64::from(self.cascade.window_width());
        let window_height = f64::from(self.cascade.window_height());
        let mut scales = Vec::new();
        let mut scale = self.options.initial_scale;
        while scale * window_width <= f64::from(width) && scale * window_height <= f64::from(height)
        {
            scales.push(scale);
            scale *= self.options.scale_factor;
        }
        scales
    }

    fn scan_scale(
        &self,
        integrals: &IntegralImages,
        width: u32,
        height: u32,
        scale: f64,
    ) -> Vec<Rectangle> {
        let window_width = (scale * f64::from(self.cascade.window_width())) as u32;
        let window_height = (scale * f64::from(self.cascade.window_height())) as u32;
        let step = ((self.options.step_size * scale) as u32).max(1);
        let max_x = width - window_width;
        let max_y = height - window_height;

        let use_edges = self.options.edges_density > 0.0;
        let data = self.cascade.data();
        let mut windows = Vec::new();

        for y in Seq::new(0, |n| n + step).take_while(|n| *n <= max_y) {
            for x in Seq::new(0, |n| n + step).take_while(|n| *n <= max_x) {
                let (x, y) = (i64::from(x), i64::from(y));
                let (w, h) = (i64::from(window_width), i64::from(window_height));

                if use_edges && integrals.edge_density(x, y, w, h) < self.options.edges_density {
                    continue;
                }

                let stats = integrals.window_stats(x, y, w, h);
                if eval_stages(data, integrals, x, y, w, h, scale, stats.std_dev) {
                    windows.push(Rectangle::new(
                        x as i32,
                        y as i32,
                        window_width,
                        window_height,
                    ));
                }
            }
        }
        windows
    }
}

/// Walks the flat cascade for one window. Every stage must pass; a failing
/// stage rejects the window immediately.
fn eval_stages(
    data: &[f64],
    integrals: &IntegralImages,
    x: i64,
    y: i64,
    window_width: i64,
    window_height: i64,
    scale: f64,
    std_dev: f64,
) -> bool {
    let inverse_area = 1.0 / (window_width * window_height) as f64;

    let mut pos = 2;
    while pos < data.len() {
        let stage_threshold = data[pos];
        let weak_count = data[pos + 1] as usize;
        pos += 2;

        let mut stage_sum = 0.0;
        for _ in 0..weak_count {
            let tilted = data[pos] != 0.0;
            let rect_count = data[pos + 1] as usize;
            pos += 2;

            let mut rects_sum = 0.0;
            for _ in 0..rect_count {
                let rect_x = x + (data[pos] * scale + 0.5) as i64;
                let rect_y = y + (data[pos + 1] * scale + 0.5) as i64;
                let rect_w = (data[pos + 2] * scale + 0.5) as i64;
                let rect_h = (data[pos + 3] * scale + 0.5) as i64;
                let weight = data[pos + 4];
                pos += 5;

                let sum = if tilted {
                    integrals.tilted_sum(rect_x, rect_y, rect_w, rect_h)
                } else {
                    integrals.rect_sum(rect_x, rect_y, rect_w, rect_h)
                };
                rects_sum += sum as f64 * weight;
            }

            let node_threshold = data[pos];
            let leaf_left = data[pos + 1];
            let leaf_right = data[pos + 2];
            pos += 3;

            stage_sum += if rects_sum * inverse_area < node_threshold * std_dev {
                leaf_left
            } else {
                leaf_right
            };
        }

        if stage_sum < stage_threshold {
            return false;
        }
    }
    true
}

/// Groups overlapping windows with union-find and averages each group.
///
/// With `neighbors == 0` every raw window survives unmerged; otherwise only
/// groups of at least `neighbors + 1` members emit a detection.
fn merge_detections(windows: &[Rectangle], neighbors: u32) -> Vec<Detection> {
    if neighbors == 0 {
        return windows.iter().map(|&r| Detection::new(r, 1)).collect();
    }

    let mut groups = DisjointSet::new(windows.len());
    for i in 0..windows.len() {
        for j in i + 1..windows.len() {
            if same_group(&windows[i], &windows[j]) {
                groups.union(i, j);
            }
        }
    }

    struct Group {
        count: u64,
        x: i64,
        y: i64,
        width: u64,
        height: u64,
    }

    // Accumulate groups in order of their earliest member so the output
    // order stays deterministic.
    let mut order: Vec<usize> = Vec::new();
    let mut accumulated: Vec<Option<Group>> = (0..windows.len()).map(|_| None).collect();
    for (i, window) in windows.iter().enumerate() {
        let root = groups.find(i);
        let group = accumulated[root].get_or_insert_with(|| {
            order.push(root);
            Group {
                count: 0,
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            }
        });
        group.count += 1;
        group.x += i64::from(window.x());
        group.y += i64::from(window.y());
        group.width += u64::from(window.width());
        group.height += u64::from(window.height());
    }

    let mut detections = Vec::new();
    for root in order {
        let group = accumulated[root].take().expect("group was accumulated");
        if group.count < u64::from(neighbors) + 1 {
            continue;
        }
        let count = group.count as f64;
        let bbox = Rectangle::new(
            (group.x as f64 / count + 0.5) as i32,
            (group.y as f64 / count + 0.5) as i32,
            (group.width as f64 / count + 0.5) as u32,
            (group.height as f64 / count + 0.5) as u32,
        );
        detections.push(Detection::new(bbox, group.count as u32));
    }
    detections
}

/// Two windows belong to one detection when their centers sit within
/// `0.2 * min(side)` of each other, or when they overlap with IoU >= 0.5.
fn same_group(a: &Rectangle, b: &Rectangle) -> bool {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    let dist = (ax - bx).hypot(ay - by);
    let a_reach = 0.2 * f64::from(a.width().min(a.height()));
    let b_reach = 0.2 * f64::from(b.width().min(b.height()));
    if dist < a_reach && dist < b_reach {
        return true;
    }
    iou(a, b) >= 0.5
}

fn iou(a: &Rectangle, b: &Rectangle) -> f64 {
    match a.intersection(b) {
        Some(overlap) => {
            let intersection = overlap.area() as f64;
            let union = (a.area() + b.area()) as f64 - intersection;
            intersection / union
        }
        None => 0.0,
    }
}
