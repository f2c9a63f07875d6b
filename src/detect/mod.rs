//! Face localization.
//!
//! - `FaceDetectorBackend`: pluggable detector (skin-region CPU detector, an
//!   OpenCV Haar cascade with backend-opencv, or an ONNX model with
//!   backend-tract)
//! - `FaceLocator`: detection, padded cropping, and primary-face selection

mod backend;
mod backends;
mod locator;
mod result;

pub use backend::FaceDetectorBackend;
pub use backends::SkinRegionBackend;
#[cfg(feature = "backend-opencv")]
pub use backends::HaarCascadeBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractFaceBackend;
pub use locator::{
    primary_face, DetectorKind, FaceLocator, LocatorSettings, DEFAULT_FACE_MODEL_INPUT, DEFAULT_FACE_PADDING,
    DEFAULT_TARGET_SIZE,
};
pub use result::{BoundingBox, FaceCrop};
