#![cfg(feature = "backend-tract")]

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::score::classifier::{softmax, Classifier, LabelProbability};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Sidecar metadata for an ONNX classifier (`<model>.json`).
#[derive(Clone, Debug, Deserialize)]
pub struct ModelManifest {
    pub labels: Vec<String>,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
    #[serde(default = "default_apply_softmax")]
    pub apply_softmax: bool,
}

fn default_mean() -> [f32; 3] {
    IMAGENET_MEAN
}

fn default_std() -> [f32; 3] {
    IMAGENET_STD
}

fn default_apply_softmax() -> bool {
    true
}

impl ModelManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read model manifest {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model manifest {}", path.display()))?;
        if manifest.labels.is_empty() {
            return Err(anyhow!("model manifest {} lists no labels", path.display()));
        }
        if manifest.std.iter().any(|s| *s == 0.0) {
            return Err(anyhow!("model manifest {} has a zero std", path.display()));
        }
        Ok(manifest)
    }
}

/// ONNX image classifier run through tract.
///
/// Input is a `1x3xHxW` float tensor normalised per channel with the manifest
/// mean/std; output is one logit (or probability) per manifest label.
pub struct TractClassifier {
    name: String,
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    manifest: ModelManifest,
    width: u32,
    height: u32,
}

impl TractClassifier {
    pub fn load(
        name: &str,
        model_path: &Path,
        manifest: ModelManifest,
        input_size: (u32, u32),
    ) -> Result<Self> {
        let (width, height) = input_size;
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
            name: name.to_string(),
            model,
            manifest,
            width,
            height,
        })
    }

    /// Resolve `<cache_dir>/<name>.onnx` and `<cache_dir>/<name>.json`.
    pub fn from_cache_dir(name: &str, cache_dir: &Path, input_size: (u32, u32)) -> Result<Self> {
        let model_path = cache_dir.join(format!("{name}.onnx"));
        if !model_path.exists() {
            return Err(anyhow!("model file {} not found", model_path.display()));
        }
        let manifest = ModelManifest::load(&cache_dir.join(format!("{name}.json")))?;
        Self::load(name, &model_path, manifest, input_size)
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
        let (mean, std) = (self.manifest.mean, self.manifest.std);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let value = resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0;
                (value - mean[channel]) / std[channel]
            },
        );
        input.into_tensor()
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&mut self, image: &RgbImage) -> Result<Vec<LabelProbability>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if logits.len() != self.manifest.labels.len() {
            return Err(anyhow!(
                "model produced {} outputs for {} labels",
                logits.len(),
                self.manifest.labels.len()
            ));
        }

        let probabilities = if self.manifest.apply_softmax {
            softmax(&logits)
        } else {
            logits.iter().map(|&v| v as f64).collect()
        };
        Ok(self
            .manifest
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, probability)| LabelProbability::new(label.clone(), probability))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_defaults_to_imagenet_normalisation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, r#"{"labels": ["real", "fake"]}"#).unwrap();
        let manifest = ModelManifest::load(&path).unwrap();
        assert_eq!(manifest.labels, vec!["real", "fake"]);
        assert_eq!(manifest.mean, IMAGENET_MEAN);
        assert_eq!(manifest.std, IMAGENET_STD);
        assert!(manifest.apply_softmax);
    }

    #[test]
    fn manifest_without_labels_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, r#"{"labels": []}"#).unwrap();
        assert!(ModelManifest::load(&path).is_err());
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = TractClassifier::from_cache_dir("absent", dir.path(), (224, 224))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
