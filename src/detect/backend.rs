use anyhow::Result;
use image::RgbImage;

use crate::detect::result::BoundingBox;

/// Face detector backend trait.
///
/// Implementations receive a full RGB frame and return zero or more face boxes
/// in pixel coordinates, in no particular order. Every returned box must have a
/// non-zero width and height.
pub trait FaceDetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run face detection on one frame.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook, run once when the locator is built. A failure here
    /// means the detector is unusable.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
