//! The full pipeline: face detection, eye localization and normalization
//! glued into one call.

use crate::align::{FaceNormalizer, NormalizedFace};
use crate::common::{Detection, ImageData, Rectangle};
use crate::detector::ObjectDetector;
use crate::error::Result;
use crate::eyes::{EyeLocator, EyePair};
use crate::imgproc;
use crate::math;

/// Outcome of one pipeline pass. Missing faces and missing eyes are
/// ordinary outcomes, not errors.
#[derive(Clone, Debug)]
pub enum Alignment {
    /// A face was found, both eyes localized and the crop produced.
    Aligned(AlignedFace),
    /// No face passed the detector.
    NoFace,
    /// A face was found but eye localization failed inside it.
    NoEyes { face: Rectangle },
}

/// A successfully aligned face.
#[derive(Clone, Debug)]
pub struct AlignedFace {
    face: Rectangle,
    eyes: EyePair,
    distance: f64,
    angle: f64,
    crop: NormalizedFace,
}

impl AlignedFace {
    /// The detected face rectangle in source coordinates.
    #[inline]
    pub fn face(&self) -> Rectangle {
        self.face
    }

    /// The localized eye centers in source coordinates.
    #[inline]
    pub fn eyes(&self) -> EyePair {
        self.eyes
    }

    /// Inter-ocular distance in source pixels.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Eye-line angle in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// The normalized crop.
    #[inline]
    pub fn crop(&self) -> &NormalizedFace {
        &self.crop
    }

    pub fn into_crop(self) -> NormalizedFace {
        self.crop
    }
}

/// Face detector, eye locator and normalizer assembled into a single
/// image-to-crop pass.
pub struct FacePipeline {
    detector: ObjectDetector,
    eyes: EyeLocator,
    normalizer: FaceNormalizer,
}

impl FacePipeline {
    pub fn new(detector: ObjectDetector, eyes: EyeLocator, normalizer: FaceNormalizer) -> Self {
        FacePipeline {
            detector,
            eyes,
            normalizer,
        }
    }

    #[inline]
    pub fn detector(&self) -> &ObjectDetector {
        &self.detector
    }

    /// Runs the pipeline over a luminance plane.
    pub fn process(&self, gray: &[u8], width: u32, height: u32) -> Result<Alignment> {
        let detections = self.detector.detect(ImageData::new(gray, width, height))?;
        let Some(face) = largest_face(&detections) else {
            return Ok(Alignment::NoFace);
        };

        let Some(eyes) = self.eyes.locate(gray, width, height, face)? else {
            return Ok(Alignment::NoEyes { face });
        };

        let crop = self
            .normalizer
            .normalize(gray, width, height, eyes.left(), eyes.right())?;
        Ok(Alignment::Aligned(AlignedFace {
            face,
            distance: math::distance(eyes.left(), eyes.right()),
            angle: math::angle(eyes.left(), eyes.right()),
            eyes,
            crop,
        }))
    }

    /// Converts interleaved RGBA to luminance and runs [`Self::process`].
    pub fn process_rgba(&self, rgba: &[u8], width: u32, height: u32) -> Result<Alignment> {
        let gray = imgproc::grayscale(rgba, width, height);
        self.process(&gray, width, height)
    }
}

/// Strictly larger area wins; equal areas keep the earlier detection.
fn largest_face(detections: &[Detection]) -> Option<Rectangle> {
    let mut best: Option<Rectangle> = None;
    for detection in detections {
        let bbox = detection.bbox();
        if best.map_or(true, |b| bbox.area() > b.area()) {
            best = Some(bbox);
        }
    }
    best
}
