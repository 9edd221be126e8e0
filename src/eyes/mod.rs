//! Eye localization inside a detected face rectangle.
//!
//! Two interchangeable strategies: running an eye cascade over the upper-half
//! eye regions, or a gradient-projection search that needs no second model.

use crate::common::{ImageData, Point, Rectangle};
use crate::detector::{DetectorOptions, ObjectDetector};
use crate::error::Result;
use crate::imgproc;
use crate::math;
use crate::model::Cascade;

/// Left and right eye centers in source-image coordinates. "Left" is the
/// leftmost eye in the image, not the subject's anatomical left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EyePair {
    left: Point,
    right: Point,
}

impl EyePair {
    pub fn new(left: Point, right: Point) -> Self {
        EyePair { left, right }
    }

    #[inline]
    pub fn left(&self) -> Point {
        self.left
    }

    #[inline]
    pub fn right(&self) -> Point {
        self.right
    }
}

enum Strategy {
    Cascade(Box<ObjectDetector>),
    Projection,
}

/// Locates the two eye centers inside a face rectangle.
pub struct EyeLocator {
    strategy: Strategy,
}

impl EyeLocator {
    /// Cascade-based localization with an eye cascade (for example OpenCV's
    /// `haarcascade_eye`).
    pub fn with_cascade(cascade: Cascade) -> Self {
        let options = DetectorOptions {
            scale_factor: 1.1,
            neighbors: 1,
            ..DetectorOptions::default()
        };
        let detector = ObjectDetector::with_options(cascade, options)
            .expect("eye detector options are within range");
        EyeLocator {
            strategy: Strategy::Cascade(Box::new(detector)),
        }
    }

    /// Gradient-projection localization; needs no second model.
    pub fn projection() -> Self {
        EyeLocator {
            strategy: Strategy::Projection,
        }
    }

    /// Finds the eye centers within `face`. `Ok(None)` means the face gave
    /// no usable eyes, which is an outcome rather than an error.
    pub fn locate(
        &self,
        gray: &[u8],
        width: u32,
        height: u32,
        face: Rectangle,
    ) -> Result<Option<EyePair>> {
        ImageData::new(gray, width, height).validate()?;
        match &self.strategy {
            Strategy::Cascade(detector) => {
                locate_with_cascade(detector, gray, width, height, face)
            }
            Strategy::Projection => Ok(locate_with_projections(gray, width, height, face)),
        }
    }
}

/// The left eye sits in `x in [0.15, 0.45) * fw`, mirrored for the right;
/// both within `y in [0.25, 0.50) * fh`.
fn eye_region(face: Rectangle, x_lo: f64, x_hi: f64) -> Rectangle {
    let fw = f64::from(face.width());
    let fh = f64::from(face.height());
    Rectangle::new(
        face.x() + (x_lo * fw) as i32,
        face.y() + (0.25 * fh) as i32,
        ((x_hi - x_lo) * fw) as u32,
        (0.25 * fh) as u32,
    )
}

fn locate_with_cascade(
    detector: &ObjectDetector,
    gray: &[u8],
    width: u32,
    height: u32,
    face: Rectangle,
) -> Result<Option<EyePair>> {
    let left = detect_eye(detector, gray, width, height, eye_region(face, 0.15, 0.45))?;
    let right = detect_eye(detector, gray, width, height, eye_region(face, 0.55, 0.85))?;
    match (left, right) {
        (Some(left), Some(right)) => Ok(Some(EyePair::new(left, right))),
        _ => Ok(None),
    }
}

fn detect_eye(
    detector: &ObjectDetector,
    gray: &[u8],
    width: u32,
    height: u32,
    region: Rectangle,
) -> Result<Option<Point>> {
    let frame = Rectangle::new(0, 0, width, height);
    let Some(region) = region.intersection(&frame) else {
        return Ok(None);
    };

    let crop = copy_region(gray, width, region);
    let detections = detector.detect(ImageData::new(&crop, region.width(), region.height()))?;

    // Largest area wins; earlier detections win ties.
    let mut best: Option<Rectangle> = None;
    for detection in &detections {
        let bbox = detection.bbox();
        if best.map_or(true, |b| bbox.area() > b.area()) {
            best = Some(bbox);
        }
    }

    Ok(best.map(|bbox| {
        Point::new(
            region.x() + bbox.x() + (bbox.width() / 2) as i32,
            region.y() + bbox.y() + (bbox.height() / 2) as i32,
        )
    }))
}

fn locate_with_projections(
    gray: &[u8],
    width: u32,
    height: u32,
    face: Rectangle,
) -> Option<EyePair> {
    let frame = Rectangle::new(0, 0, width, height);
    let face = face.intersection(&frame)?;

    let mut crop = copy_region(gray, width, face);
    let fw = face.width();
    let fh = face.height();
    preprocess_face(&mut crop);

    let gradient_x = imgproc::gradient_x(&crop, fw, fh);
    let gradient_y = imgproc::gradient_y(&crop, fw, fh);

    let symmetry = imgproc::horizontal_symmetry(&crop, fw, fh);
    let axis = math::find_max_index(&symmetry, 4, 4);

    let fw = fw as usize;
    let fh = fh as usize;
    let band_top = fh / 4;
    let band_bottom = fh / 2;
    if band_top >= band_bottom || axis == 0 || axis + 1 >= fw {
        return None;
    }

    let left = eye_from_projections(
        &gradient_x,
        &gradient_y,
        face,
        [0, axis, band_top, band_bottom],
    );
    let right = eye_from_projections(
        &gradient_x,
        &gradient_y,
        face,
        [axis, fw, band_top, band_bottom],
    );
    Some(EyePair::new(left, right))
}

fn preprocess_face(crop: &mut [u8]) {
    imgproc::equalize_hist(crop, 5);
}

/// One eye from the band-restricted gradient projections: the column profile
/// of `Gx` gives x, the row profile of `Gy` gives y, both smoothed over a
/// 9-sample window.
fn eye_from_projections(
    gradient_x: &[f32],
    gradient_y: &[f32],
    face: Rectangle,
    roi: imgproc::Roi,
) -> Point {
    let fw = face.width();
    let fh = face.height();
    let columns = imgproc::projection_x(gradient_x, fw, fh, Some(roi));
    let rows = imgproc::projection_y(gradient_y, fw, fh, Some(roi));
    let x = roi[0] + math::find_max_index(&columns, 4, 4);
    let y = roi[2] + math::find_max_index(&rows, 4, 4);
    Point::new(face.x() + x as i32, face.y() + y as i32)
}

/// Copies a clamped rectangular region out of a larger plane.
fn copy_region(gray: &[u8], stride: u32, region: Rectangle) -> Vec<u8> {
    let stride = stride as usize;
    let mut out = Vec::with_capacity(region.width() as usize * region.height() as usize);
    for y in region.y()..region.bottom() {
        let row_start = y as usize * stride + region.x() as usize;
        out.extend_from_slice(&gray[row_start..row_start + region.width() as usize]);
    }
    out
}
