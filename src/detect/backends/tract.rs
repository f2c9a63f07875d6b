#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::BoundingBox;

const NMS_IOU_THRESHOLD: f32 = 0.3;

/// Tract-based face detector for ONNX models.
///
/// The model takes a `1x3xHxW` float input in [0, 1] and produces rows of
/// `[x1, y1, x2, y2, score]` with coordinates normalized to the input size.
/// Rows under the confidence threshold are dropped and overlapping boxes are
/// suppressed greedily.
pub struct TractFaceBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractFaceBackend {
    /// Load an ONNX face detector from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn extract_boxes(&self, outputs: TVec<TValue>, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat: Vec<f32> = values.iter().copied().collect();
        if flat.len() % 5 != 0 {
            return Err(anyhow!(
                "expected rows of 5 values, got a tensor of {} values",
                flat.len()
            ));
        }

        let (img_w, img_h) = (image.width() as f32, image.height() as f32);
        let mut candidates: Vec<BoundingBox> = flat
            .chunks_exact(5)
            .filter(|row| row[4].is_finite() && row[4] >= self.confidence_threshold)
            .filter_map(|row| {
                let x1 = (row[0].clamp(0.0, 1.0) * img_w).floor();
                let y1 = (row[1].clamp(0.0, 1.0) * img_h).floor();
                let x2 = (row[2].clamp(0.0, 1.0) * img_w).ceil();
                let y2 = (row[3].clamp(0.0, 1.0) * img_h).ceil();
                let bbox = BoundingBox::new(
                    x1 as u32,
                    y1 as u32,
                    (x2 - x1).max(0.0) as u32,
                    (y2 - y1).max(0.0) as u32,
                    row[4].min(1.0),
                );
                (!bbox.is_empty()).then_some(bbox)
            })
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut kept: Vec<BoundingBox> = Vec::new();
        for candidate in candidates {
            if kept
                .iter()
                .all(|k| k.iou(&candidate) <= NMS_IOU_THRESHOLD)
            {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }
}

impl FaceDetectorBackend for TractFaceBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_boxes(outputs, image)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.detect(&blank).map(|_| ())
    }
}
