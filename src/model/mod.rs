//! The in-memory Haar-cascade model.
//!
//! A cascade is a frozen flat numeric array:
//!
//! ```text
//! [ windowW, windowH,
//!   for each stage:
//!     stageThreshold, weakCount,
//!     for each weak classifier:
//!       tilted, rectCount,
//!       for each rect: x, y, w, h, weight,
//!       nodeThreshold, leafLeft, leafRight ]
//! ```
//!
//! The detector walks the array by cursor; no per-node objects exist at
//! runtime, and a loaded cascade can be shared freely across threads.

mod xml;

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// An immutable, validated Haar cascade in flat form.
#[derive(Clone, Debug, PartialEq)]
pub struct Cascade {
    data: Vec<f64>,
    window_width: u32,
    window_height: u32,
    stage_count: usize,
}

impl Cascade {
    /// Validates and wraps a flat cascade array.
    ///
    /// The whole layout is walked up front; a truncated or non-numeric
    /// array is rejected and no partially usable cascade is ever produced.
    pub fn from_flat(data: Vec<f64>) -> Result<Self> {
        let (window_width, window_height, stage_count) = validate_layout(&data)?;
        Ok(Cascade {
            data,
            window_width,
            window_height,
            stage_count,
        })
    }

    /// Parses an OpenCV `opencv_storage/cascade` XML document.
    pub fn from_xml(document: &str) -> Result<Self> {
        xml::parse(document)
    }

    /// Deserializes the JSON wire form: a bare array of numbers in the flat
    /// layout.
    pub fn from_flat_json(json: &str) -> Result<Self> {
        let data: Vec<f64> = serde_json::from_str(json)?;
        Cascade::from_flat(data)
    }

    /// Serializes the flat layout as a JSON array of numbers, the stable
    /// cross-process wire form.
    pub fn to_flat_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }

    /// Width of the trained detection window.
    #[inline]
    pub fn window_width(&self) -> u32 {
        self.window_width
    }

    /// Height of the trained detection window.
    #[inline]
    pub fn window_height(&self) -> u32 {
        self.window_height
    }

    /// Number of stages in the cascade.
    #[inline]
    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// The flat array, window dimensions included.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Loads a cascade from a file, dispatching on the extension: `.json` is
/// read as the flat wire form, everything else as OpenCV XML.
pub fn load_cascade<P: AsRef<Path>>(path: P) -> Result<Cascade> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Cascade::from_flat_json(&text)
    } else {
        Cascade::from_xml(&text)
    }
}

fn validate_layout(data: &[f64]) -> Result<(u32, u32, usize)> {
    if data.len() < 2 {
        return Err(Error::InvalidCascade(format!(
            "flat array too short: {} elements",
            data.len()
        )));
    }
    let window_width = read_dimension(data[0], "window width")?;
    let window_height = read_dimension(data[1], "window height")?;

    let mut pos = 2;
    let mut stage_count = 0;
    while pos < data.len() {
        let stage_start = pos;
        require(data, pos, 2, "stage header")?;
        let stage_threshold = data[pos];
        if !stage_threshold.is_finite() {
            return Err(Error::InvalidCascade(format!(
                "non-finite stage threshold at offset {stage_start}"
            )));
        }
        let weak_count = read_count(data[pos + 1], "weak classifier count")?;
        pos += 2;

        for _ in 0..weak_count {
            require(data, pos, 2, "weak classifier header")?;
            let tilted = data[pos];
            if tilted != 0.0 && tilted != 1.0 {
                return Err(Error::InvalidCascade(format!(
                    "tilted flag must be 0 or 1, found {tilted}"
                )));
            }
            let rect_count = read_count(data[pos + 1], "rectangle count")?;
            if rect_count == 0 {
                return Err(Error::InvalidCascade(
                    "weak classifier with no rectangles".into(),
                ));
            }
            pos += 2;

            require(data, pos, rect_count * 5 + 3, "rectangles and leaves")?;
            for value in &data[pos..pos + rect_count * 5 + 3] {
                if !value.is_finite() {
                    return Err(Error::InvalidCascade(format!(
                        "non-finite value at offset {pos}"
                    )));
                }
            }
            pos += rect_count * 5 + 3;
        }
        stage_count += 1;
    }

    if stage_count == 0 {
        return Err(Error::InvalidCascade("cascade has no stages".into()));
    }
    Ok((window_width, window_height, stage_count))
}

fn require(data: &[f64], pos: usize, needed: usize, what: &str) -> Result<()> {
    if pos + needed > data.len() {
        return Err(Error::InvalidCascade(format!(
            "truncated {what} at offset {pos}"
        )));
    }
    Ok(())
}

fn read_dimension(value: f64, what: &str) -> Result<u32> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(Error::InvalidCascade(format!("bad {what}: {value}")));
    }
    Ok(value as u32)
}

fn read_count(value: f64, what: &str) -> Result<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > 1e9 {
        return Err(Error::InvalidCascade(format!("bad {what}: {value}")));
    }
    Ok(value as usize)
}

/// One stage, one weak classifier, one unit rectangle. Accepts every window
/// because the stage threshold is far below the left leaf.
#[cfg(test)]
pub(crate) fn accept_all_flat(window: u32) -> Vec<f64> {
    vec![
        f64::from(window),
        f64::from(window),
        // stage: threshold, weak count
        -1e9,
        1.0,
        // weak: tilted, rect count, rect, node threshold, leaves
        0.0,
        1.0,
        0.0,
        0.0,
        1.0,
        1.0,
        0.0,
        1e9,
        1.0,
        -1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_flat_layout() {
        let cascade = Cascade::from_flat(accept_all_flat(20)).unwrap();
        assert_eq!(cascade.window_width(), 20);
        assert_eq!(cascade.window_height(), 20);
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn truncated_layout_is_rejected() {
        let mut data = accept_all_flat(20);
        data.pop();
        assert!(matches!(
            Cascade::from_flat(data),
            Err(Error::InvalidCascade(_))
        ));
    }

    #[test]
    fn bad_window_is_rejected() {
        let mut data = accept_all_flat(20);
        data[0] = 0.0;
        assert!(Cascade::from_flat(data.clone()).is_err());
        data[0] = 20.5;
        assert!(Cascade::from_flat(data).is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut data = accept_all_flat(20);
        let last = data.len() - 1;
        data[last] = f64::NAN;
        assert!(Cascade::from_flat(data).is_err());
    }

    #[test]
    fn empty_cascade_is_rejected() {
        assert!(Cascade::from_flat(vec![20.0, 20.0]).is_err());
    }

    #[test]
    fn json_wire_form_round_trips() {
        let cascade = Cascade::from_flat(accept_all_flat(24)).unwrap();
        let json = cascade.to_flat_json().unwrap();
        let back = Cascade::from_flat_json(&json).unwrap();
        assert_eq!(back, cascade);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Cascade::from_flat_json("[1, 2,").is_err());
        assert!(Cascade::from_flat_json("{\"not\": \"an array\"}").is_err());
    }
}
