//! Per-face manipulation scoring.
//!
//! A `FaceScorer` either delegates to a `Classifier` (ONNX through tract with
//! the backend-tract feature) or runs the training-free artifact heuristic.

mod classifier;
mod heuristic;
pub mod imageops;
mod scorer;
#[cfg(feature = "backend-tract")]
mod tract;

pub use classifier::{fake_probability, softmax, Classifier, LabelProbability};
pub use heuristic::{
    ArtifactAnalysis, HeuristicScorer, HISTOGRAM_ENTROPY_FLOOR, NOISE_STD_BAND,
    SHARPNESS_VARIANCE_BAND,
};
pub use scorer::{
    FaceScorer, ScorerSettings, ScoringStrategy, DEFAULT_MODEL_CACHE_DIR, DEFAULT_MODEL_NAME,
    HEURISTIC_MODEL_NAME,
};
#[cfg(feature = "backend-tract")]
pub use tract::{ModelManifest, TractClassifier};
