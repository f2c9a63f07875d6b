use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use image::RgbImage;

use super::backend::FaceDetectorBackend;
use super::backends::skin::{SkinRegionBackend, DEFAULT_MIN_FACE_SIZE};
use super::result::{BoundingBox, FaceCrop};
use crate::error::{DetectorError, Result};
use crate::frame::Frame;

pub const DEFAULT_TARGET_SIZE: (u32, u32) = (224, 224);
pub const DEFAULT_FACE_PADDING: f32 = 0.2;
pub const DEFAULT_FACE_MODEL_INPUT: (u32, u32) = (320, 240);

/// Classical detector used when no ONNX face model is configured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Built-in skin-region detector.
    #[default]
    Skin,
    /// OpenCV Haar cascade (backend-opencv feature).
    Haar,
}

impl DetectorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::Skin => "skin",
            DetectorKind::Haar => "haar",
        }
    }
}

impl std::str::FromStr for DetectorKind {
    type Err = DetectorError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skin" => Ok(DetectorKind::Skin),
            "haar" => Ok(DetectorKind::Haar),
            other => Err(DetectorError::validation(format!(
                "invalid face detector: {other}. Must be skin or haar"
            ))),
        }
    }
}

/// Settings used to build a [`FaceLocator`].
#[derive(Clone, Debug, PartialEq)]
pub struct LocatorSettings {
    /// ONNX face detector. Takes precedence over `detector` when set.
    pub face_model: Option<PathBuf>,
    pub detector: DetectorKind,
    /// Haar cascade XML. `None` uses the cascade bundled with OpenCV.
    pub face_cascade: Option<PathBuf>,
    /// Input size (width, height) of the ONNX face detector.
    pub face_model_input: (u32, u32),
    pub min_confidence: f32,
    pub min_face_size: u32,
    /// Crop output size (width, height).
    pub target_size: (u32, u32),
    pub padding: f32,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            face_model: None,
            detector: DetectorKind::Skin,
            face_cascade: None,
            face_model_input: DEFAULT_FACE_MODEL_INPUT,
            min_confidence: 0.5,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            target_size: DEFAULT_TARGET_SIZE,
            padding: DEFAULT_FACE_PADDING,
        }
    }
}

/// Detects faces in frames and produces fixed-size face crops.
pub struct FaceLocator {
    backend: Box<dyn FaceDetectorBackend>,
    target_size: (u32, u32),
    padding: f32,
}

impl FaceLocator {
    pub fn new(backend: Box<dyn FaceDetectorBackend>, target_size: (u32, u32), padding: f32) -> Self {
        Self {
            backend,
            target_size,
            padding,
        }
    }

    /// Build the configured detector backend and check that it runs.
    ///
    /// Unlike classifier loading, a detector that cannot be initialized is a
    /// hard error.
    pub fn from_settings(settings: &LocatorSettings) -> Result<Self> {
        let mut backend = build_backend(settings)?;
        backend.warm_up().map_err(|e| {
            DetectorError::detector_init(format!("{} detector failed warm-up: {e:#}", backend.name()))
        })?;
        log::debug!("FaceLocator: using {} detector", backend.name());
        Ok(Self::new(backend, settings.target_size, settings.padding))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    /// Detect face boxes in one frame.
    pub fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let boxes = self
            .backend
            .detect(image)
            .map_err(|e| DetectorError::detection(format!("{e:#}")))?;
        Ok(boxes.into_iter().filter(|b| !b.is_empty()).collect())
    }

    /// Cut padded face regions out of `image` and resize them to the target size.
    ///
    /// Each box grows by `padding` times its width/height on every side and is
    /// clipped to the image. Boxes whose clipped region is empty are skipped.
    pub fn crop_faces(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
        frame_index: u64,
        padding: f32,
    ) -> Vec<FaceCrop> {
        let (img_w, img_h) = image.dimensions();
        let (target_w, target_h) = self.target_size;
        let mut crops = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let pad_w = (bbox.width as f32 * padding) as u32;
            let pad_h = (bbox.height as f32 * padding) as u32;

            let x1 = bbox.x.saturating_sub(pad_w).min(img_w);
            let y1 = bbox.y.saturating_sub(pad_h).min(img_h);
            let x2 = bbox
                .x
                .saturating_add(bbox.width)
                .saturating_add(pad_w)
                .min(img_w);
            let y2 = bbox
                .y
                .saturating_add(bbox.height)
                .saturating_add(pad_h)
                .min(img_h);
            if x2 <= x1 || y2 <= y1 {
                log::debug!(
                    "FaceLocator: skipping empty crop for box {:?} in frame {}",
                    bbox,
                    frame_index
                );
                continue;
            }

            let region = image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
            let resized = image::imageops::resize(&region, target_w, target_h, FilterType::Triangle);
            crops.push(FaceCrop {
                frame_index,
                bbox: *bbox,
                image: resized,
            });
        }
        crops
    }

    /// Detect and crop faces across frames.
    ///
    /// With `select_primary`, only the largest face of each frame is kept, so at
    /// most one crop is produced per frame. Detection failures on a single frame
    /// are logged and that frame is skipped.
    pub fn extract_from_frames(&mut self, frames: &[Frame], select_primary: bool) -> Vec<FaceCrop> {
        let mut crops = Vec::new();
        let mut total_faces = 0usize;
        let mut frames_with_faces = 0usize;

        for frame in frames {
            let boxes = match self.detect_faces(&frame.image) {
                Ok(boxes) => boxes,
                Err(e) => {
                    log::warn!("FaceLocator: frame {}: {}", frame.index, e);
                    continue;
                }
            };
            if boxes.is_empty() {
                continue;
            }
            total_faces += boxes.len();
            frames_with_faces += 1;

            let selected = if select_primary {
                primary_face(&boxes).into_iter().collect()
            } else {
                boxes
            };
            crops.extend(self.crop_faces(&frame.image, &selected, frame.index, self.padding));
        }

        log::info!(
            "FaceLocator: detected {} faces across {}/{} frames",
            total_faces,
            frames_with_faces,
            frames.len()
        );
        if frames_with_faces == 0 {
            log::warn!("FaceLocator: no faces detected in any frame");
        }
        crops
    }
}

/// Largest-area box; the first one wins ties.
pub fn primary_face(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    let mut best: Option<BoundingBox> = None;
    for bbox in boxes {
        match best {
            Some(current) if bbox.area() <= current.area() => {}
            _ => best = Some(*bbox),
        }
    }
    best
}

fn build_backend(settings: &LocatorSettings) -> Result<Box<dyn FaceDetectorBackend>> {
    if let Some(model_path) = settings.face_model.as_ref() {
        return build_onnx_backend(model_path, settings);
    }
    match settings.detector {
        DetectorKind::Skin => Ok(Box::new(
            SkinRegionBackend::new().with_min_face_size(settings.min_face_size),
        )),
        DetectorKind::Haar => build_haar_backend(settings),
    }
}

#[cfg(feature = "backend-tract")]
fn build_onnx_backend(
    model_path: &Path,
    settings: &LocatorSettings,
) -> Result<Box<dyn FaceDetectorBackend>> {
    let (width, height) = settings.face_model_input;
    let backend = super::backends::TractFaceBackend::new(model_path, width, height)
        .map_err(|e| DetectorError::detector_init(format!("{e:#}")))?
        .with_threshold(settings.min_confidence);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_onnx_backend(
    model_path: &Path,
    _settings: &LocatorSettings,
) -> Result<Box<dyn FaceDetectorBackend>> {
    Err(DetectorError::detector_init(format!(
        "face model {} requires the backend-tract feature",
        model_path.display()
    )))
}

#[cfg(feature = "backend-opencv")]
fn build_haar_backend(settings: &LocatorSettings) -> Result<Box<dyn FaceDetectorBackend>> {
    use super::backends::HaarCascadeBackend;

    let backend = match settings.face_cascade.as_ref() {
        Some(path) => HaarCascadeBackend::new(path),
        None => HaarCascadeBackend::bundled(),
    }
    .map_err(|e| DetectorError::detector_init(format!("{e:#}")))?;
    Ok(Box::new(backend.with_min_face_size(settings.min_face_size)))
}

#[cfg(not(feature = "backend-opencv"))]
fn build_haar_backend(_settings: &LocatorSettings) -> Result<Box<dyn FaceDetectorBackend>> {
    Err(DetectorError::detector_init(
        "the haar face detector requires the backend-opencv feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FrameSource;
    use image::Rgb;

    struct FixedBackend {
        boxes: Vec<BoundingBox>,
    }

    impl FaceDetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<BoundingBox>> {
            Ok(self.boxes.clone())
        }
    }

    struct FailingBackend;

    impl FaceDetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<BoundingBox>> {
            Err(anyhow::anyhow!("detector exploded"))
        }

        fn warm_up(&mut self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("no weights"))
        }
    }

    fn frame(index: u64, width: u32, height: u32) -> Frame {
        Frame {
            index,
            timestamp: 0.0,
            image: RgbImage::from_pixel(width, height, Rgb([100, 120, 140])),
        }
    }

    fn locator_with(boxes: Vec<BoundingBox>) -> FaceLocator {
        FaceLocator::new(Box::new(FixedBackend { boxes }), (64, 48), 0.2)
    }

    #[test]
    fn crops_always_have_target_size() {
        let locator = locator_with(vec![]);
        let image = RgbImage::new(200, 100);
        let boxes = [
            BoundingBox::new(0, 0, 10, 10, 1.0),
            BoundingBox::new(150, 60, 80, 80, 1.0),
            BoundingBox::new(20, 20, 100, 30, 1.0),
            BoundingBox::new(199, 99, 1, 1, 1.0),
        ];
        let crops = locator.crop_faces(&image, &boxes, 7, 0.5);
        assert_eq!(crops.len(), 4);
        for crop in crops {
            assert_eq!(crop.image.dimensions(), (64, 48));
            assert_eq!(crop.frame_index, 7);
        }
    }

    #[test]
    fn boxes_outside_the_image_are_skipped() {
        let locator = locator_with(vec![]);
        let image = RgbImage::new(50, 50);
        let boxes = [
            BoundingBox::new(60, 60, 10, 10, 1.0),
            BoundingBox::new(10, 10, 10, 10, 1.0),
        ];
        let crops = locator.crop_faces(&image, &boxes, 0, 0.0);
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].bbox.x, 10);
    }

    #[test]
    fn padding_expands_the_region() {
        let locator = FaceLocator::new(Box::new(FixedBackend { boxes: vec![] }), (20, 20), 0.0);
        let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        // White ring just outside the box, visible only when padded.
        for i in 35..65 {
            image.put_pixel(i, 35, Rgb([255, 255, 255]));
        }
        let bbox = [BoundingBox::new(40, 40, 20, 20, 1.0)];
        let unpadded = locator.crop_faces(&image, &bbox, 0, 0.0);
        let padded = locator.crop_faces(&image, &bbox, 0, 0.5);
        assert!(unpadded[0].image.pixels().all(|p| p[0] == 0));
        assert!(padded[0].image.pixels().any(|p| p[0] > 0));
    }

    #[test]
    fn primary_face_prefers_largest_then_first() {
        let boxes = [
            BoundingBox::new(0, 0, 10, 10, 0.9),
            BoundingBox::new(20, 0, 20, 5, 0.8),
            BoundingBox::new(40, 0, 5, 20, 0.7),
            BoundingBox::new(60, 0, 10, 9, 0.6),
        ];
        let primary = primary_face(&boxes).unwrap();
        assert_eq!(primary.x, 0);
        assert!(primary_face(&[]).is_none());

        let boxes = [
            BoundingBox::new(0, 0, 10, 10, 1.0),
            BoundingBox::new(20, 0, 30, 30, 1.0),
        ];
        assert_eq!(primary_face(&boxes).unwrap().x, 20);
    }

    #[test]
    fn select_primary_yields_one_crop_per_frame() {
        let mut locator = locator_with(vec![
            BoundingBox::new(0, 0, 10, 10, 1.0),
            BoundingBox::new(20, 20, 30, 30, 1.0),
        ]);
        let frames = vec![frame(0, 100, 100), frame(5, 100, 100)];

        let primary = locator.extract_from_frames(&frames, true);
        assert_eq!(primary.len(), 2);
        assert!(primary.iter().all(|c| c.bbox.width == 30));
        assert_eq!(primary[1].frame_index, 5);

        let all = locator.extract_from_frames(&frames, false);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn detection_failures_are_not_fatal() {
        let mut locator = FaceLocator::new(Box::new(FailingBackend), (32, 32), 0.2);
        let crops = locator.extract_from_frames(&[frame(0, 10, 10)], true);
        assert!(crops.is_empty());
    }

    #[test]
    fn zero_sized_boxes_are_filtered() {
        let mut locator = locator_with(vec![BoundingBox::new(5, 5, 0, 10, 1.0)]);
        let boxes = locator.detect_faces(&RgbImage::new(20, 20)).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn default_settings_use_skin_detector() {
        let locator = FaceLocator::from_settings(&LocatorSettings::default()).unwrap();
        assert_eq!(locator.backend_name(), "skin");
        assert_eq!(locator.target_size(), DEFAULT_TARGET_SIZE);
    }

    #[test]
    fn finds_primary_face_in_synthetic_video() {
        let mut source = FrameSource::new(300);
        source.load("stub://locator?frames=60&faces=2").unwrap();
        let frames = source.extract_frames(4, 10).unwrap();
        source.close();

        let mut locator = FaceLocator::from_settings(&LocatorSettings::default()).unwrap();
        let crops = locator.extract_from_frames(&frames, true);
        assert_eq!(crops.len(), 4);
        for crop in &crops {
            assert_eq!(crop.image.dimensions(), DEFAULT_TARGET_SIZE);
            // The larger face sits in the left half of the frame.
            assert!(crop.bbox.x + crop.bbox.width / 2 < 160);
        }
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn face_model_without_tract_is_an_init_error() {
        let settings = LocatorSettings {
            face_model: Some(PathBuf::from("face.onnx")),
            ..LocatorSettings::default()
        };
        let err = FaceLocator::from_settings(&settings).err().unwrap();
        assert!(matches!(err, DetectorError::DetectorInit(_)));
    }

    #[cfg(not(feature = "backend-opencv"))]
    #[test]
    fn haar_without_opencv_is_an_init_error() {
        let settings = LocatorSettings {
            detector: DetectorKind::Haar,
            ..LocatorSettings::default()
        };
        let err = FaceLocator::from_settings(&settings).err().unwrap();
        assert!(matches!(err, DetectorError::DetectorInit(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn detector_kind_parses_case_insensitively() {
        assert_eq!("Haar".parse::<DetectorKind>().unwrap(), DetectorKind::Haar);
        assert_eq!("skin".parse::<DetectorKind>().unwrap(), DetectorKind::Skin);
        assert!("cnn".parse::<DetectorKind>().is_err());
        assert_eq!(DetectorKind::default().as_str(), "skin");
    }
}
