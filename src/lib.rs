//! Face detection and geometric normalization.
//!
//! The crate locates a face in a still image with a Viola-Jones Haar-cascade
//! detector, finds the two eye centers inside it, and emits an upright,
//! scale-normalized square crop centered on the eye midpoint. Cascades are
//! loaded from the OpenCV XML format (or the flat JSON wire form) into an
//! immutable numeric array that concurrent detections share freely.
//!
//! ```no_run
//! use facealign::{Alignment, EyeLocator, FaceNormalizer, FacePipeline, ObjectDetector};
//!
//! # fn main() -> facealign::Result<()> {
//! let face_cascade = facealign::load_cascade("haarcascade_frontalface_alt.xml")?;
//! let eye_cascade = facealign::load_cascade("haarcascade_eye.xml")?;
//!
//! let pipeline = FacePipeline::new(
//!     ObjectDetector::new(face_cascade),
//!     EyeLocator::with_cascade(eye_cascade),
//!     FaceNormalizer::new(),
//! );
//!
//! // `gray` is a row-major 8-bit luminance plane.
//! # let (gray, width, height) = (vec![0u8; 640 * 480], 640, 480);
//! match pipeline.process(&gray, width, height)? {
//!     Alignment::Aligned(aligned) => {
//!         let crop = aligned.crop();
//!         assert_eq!(crop.data().len(), (crop.size() * crop.size()) as usize);
//!     }
//!     Alignment::NoFace => println!("no face"),
//!     Alignment::NoEyes { .. } => println!("no eyes"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod common;
pub mod detector;
mod error;
pub mod eyes;
pub mod feat;
pub mod imgproc;
pub mod math;
pub mod model;
pub mod pipeline;

pub use crate::align::{FaceNormalizer, NormalizedFace, NormalizerOptions};
pub use crate::common::{Detection, ImageData, Point, Rectangle};
pub use crate::detector::{DetectorOptions, ObjectDetector};
pub use crate::error::{Error, Result};
pub use crate::eyes::{EyeLocator, EyePair};
pub use crate::model::{load_cascade, Cascade};
pub use crate::pipeline::{AlignedFace, Alignment, FacePipeline};

use std::path::Path;

/// Builds the default pipeline from two cascade files: a face cascade and an
/// eye cascade.
pub fn create_pipeline<P: AsRef<Path>>(face_cascade: P, eye_cascade: P) -> Result<FacePipeline> {
    let face = load_cascade(face_cascade)?;
    let eyes = load_cascade(eye_cascade)?;
    Ok(FacePipeline::new(
        ObjectDetector::new(face),
        EyeLocator::with_cascade(eyes),
        FaceNormalizer::new(),
    ))
}
