#![cfg(feature = "backend-opencv")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use opencv::core::{Mat, Rect, Scalar, Size, Vector, CV_8UC1};
use opencv::objdetect::{CascadeClassifier, CASCADE_SCALE_IMAGE};
use opencv::prelude::*;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::BoundingBox;
use crate::score::imageops;

/// Frontal-face cascade shipped with OpenCV, relative to its data directory.
pub const BUNDLED_CASCADE: &str = "haarcascades/haarcascade_frontalface_default.xml";

const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 5;

/// OpenCV Haar-cascade face detector.
///
/// Runs `detectMultiScale` on the BT.601 luma of the frame. Cascades carry no
/// score, so every box reports confidence 1.0.
pub struct HaarCascadeBackend {
    classifier: CascadeClassifier,
    min_face_size: u32,
}

impl HaarCascadeBackend {
    /// Load a cascade XML file.
    pub fn new<P: AsRef<Path>>(cascade_path: P) -> Result<Self> {
        let cascade_path = cascade_path.as_ref();
        let path = cascade_path
            .to_str()
            .ok_or_else(|| anyhow!("cascade path is not UTF-8: {}", cascade_path.display()))?;
        let classifier = CascadeClassifier::new(path)
            .with_context(|| format!("failed to load cascade from {}", cascade_path.display()))?;
        if classifier.empty().context("failed to inspect cascade")? {
            return Err(anyhow!("cascade {} is empty", cascade_path.display()));
        }
        log::debug!("Haar: loaded cascade from {}", cascade_path.display());
        Ok(Self {
            classifier,
            min_face_size: 30,
        })
    }

    /// Load the frontal-face cascade from OpenCV's data directory.
    pub fn bundled() -> Result<Self> {
        let path = opencv::core::find_file(BUNDLED_CASCADE, false, true)
            .context("failed to search the OpenCV data directory")?;
        if path.is_empty() {
            return Err(anyhow!("{} not found in the OpenCV data directory", BUNDLED_CASCADE));
        }
        Self::new(path)
    }

    pub fn with_min_face_size(mut self, min_face_size: u32) -> Self {
        self.min_face_size = min_face_size.max(1);
        self
    }
}

impl FaceDetectorBackend for HaarCascadeBackend {
    fn name(&self) -> &'static str {
        "haar"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let gray = imageops::grayscale(image);
        let mut mat =
            Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))
                .context("failed to allocate grayscale matrix")?;
        mat.data_bytes_mut()
            .context("grayscale matrix is not contiguous")?
            .copy_from_slice(gray.as_raw());

        let min = self.min_face_size as i32;
        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &mat,
                &mut faces,
                SCALE_FACTOR,
                MIN_NEIGHBORS,
                CASCADE_SCALE_IMAGE,
                Size::new(min, min),
                Size::new(0, 0),
            )
            .context("detectMultiScale failed")?;

        Ok(faces
            .iter()
            .filter(|r| r.width > 0 && r.height > 0)
            .map(|r| {
                BoundingBox::new(
                    r.x.max(0) as u32,
                    r.y.max(0) as u32,
                    r.width as u32,
                    r.height as u32,
                    1.0,
                )
            })
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(64, 64);
        self.detect(&blank).map(|_| ())
    }
}
