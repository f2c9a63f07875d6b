use std::path::PathBuf;

use crate::detect::{FaceCrop, DEFAULT_TARGET_SIZE};
use crate::score::classifier::{fake_probability, Classifier};
use crate::score::heuristic::HeuristicScorer;

/// Model name that selects the heuristic without attempting a model load.
pub const HEURISTIC_MODEL_NAME: &str = "heuristic";
pub const DEFAULT_MODEL_NAME: &str = "vit-deepfake";
pub const DEFAULT_MODEL_CACHE_DIR: &str = "./models/cache";

/// How a `FaceScorer` is built.
#[derive(Clone, Debug)]
pub struct ScorerSettings {
    pub model: String,
    pub model_cache_dir: PathBuf,
    pub device: String,
    pub input_size: (u32, u32),
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_NAME.to_string(),
            model_cache_dir: PathBuf::from(DEFAULT_MODEL_CACHE_DIR),
            device: "auto".to_string(),
            input_size: DEFAULT_TARGET_SIZE,
        }
    }
}

/// Scoring strategy, fixed when the scorer is built.
pub enum ScoringStrategy {
    Model(Box<dyn Classifier>),
    Heuristic(HeuristicScorer),
}

/// Assigns each face crop a manipulation likelihood in [0, 1].
pub struct FaceScorer {
    strategy: ScoringStrategy,
    fallback: HeuristicScorer,
}

impl FaceScorer {
    pub fn heuristic() -> Self {
        Self {
            strategy: ScoringStrategy::Heuristic(HeuristicScorer::new()),
            fallback: HeuristicScorer::new(),
        }
    }

    pub fn with_classifier(classifier: Box<dyn Classifier>) -> Self {
        Self {
            strategy: ScoringStrategy::Model(classifier),
            fallback: HeuristicScorer::new(),
        }
    }

    /// Build the scorer for `settings`, downgrading to the heuristic when the
    /// classifier cannot be loaded. Never fails.
    pub fn from_settings(settings: &ScorerSettings) -> Self {
        if settings.model == HEURISTIC_MODEL_NAME {
            log::info!("Scorer: heuristic scoring selected");
            return Self::heuristic();
        }
        match load_classifier(settings) {
            Ok(classifier) => {
                log::info!("Scorer: using classifier {}", classifier.name());
                Self::with_classifier(classifier)
            }
            Err(err) => {
                log::warn!(
                    "Scorer: classifier {} unavailable ({:#}); falling back to heuristic scoring",
                    settings.model,
                    err
                );
                Self::heuristic()
            }
        }
    }

    pub fn strategy(&self) -> &ScoringStrategy {
        &self.strategy
    }

    pub fn is_model_backed(&self) -> bool {
        matches!(self.strategy, ScoringStrategy::Model(_))
    }

    /// `model:<name>` or `heuristic`.
    pub fn strategy_name(&self) -> String {
        match &self.strategy {
            ScoringStrategy::Model(classifier) => format!("model:{}", classifier.name()),
            ScoringStrategy::Heuristic(_) => HEURISTIC_MODEL_NAME.to_string(),
        }
    }

    /// One score per crop, in crop order.
    pub fn score(&mut self, crops: &[FaceCrop]) -> Vec<f64> {
        let fallback = self.fallback;
        let scores: Vec<f64> = match &mut self.strategy {
            ScoringStrategy::Heuristic(heuristic) => {
                crops.iter().map(|crop| heuristic.score(&crop.image)).collect()
            }
            ScoringStrategy::Model(classifier) => crops
                .iter()
                .map(|crop| match classifier.classify(&crop.image) {
                    Ok(distribution) => match fake_probability(&distribution) {
                        Some(probability) => probability,
                        None => {
                            log::warn!(
                                "Scorer: no usable fake probability for frame {}; using heuristic",
                                crop.frame_index
                            );
                            fallback.score(&crop.image)
                        }
                    },
                    Err(err) => {
                        log::warn!(
                            "Scorer: classification failed for frame {} ({:#}); using heuristic",
                            crop.frame_index,
                            err
                        );
                        fallback.score(&crop.image)
                    }
                })
                .collect(),
        };
        log::debug!("Scorer: scored {} crops with {}", scores.len(), self.strategy_name());
        scores
    }
}

#[cfg(feature = "backend-tract")]
fn load_classifier(settings: &ScorerSettings) -> anyhow::Result<Box<dyn Classifier>> {
    if !matches!(settings.device.as_str(), "cpu" | "auto") {
        log::info!(
            "Scorer: device {} requested; inference runs on CPU",
            settings.device
        );
    }
    let classifier = crate::score::tract::TractClassifier::from_cache_dir(
        &settings.model,
        &settings.model_cache_dir,
        settings.input_size,
    )?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "backend-tract"))]
fn load_classifier(_settings: &ScorerSettings) -> anyhow::Result<Box<dyn Classifier>> {
    Err(anyhow::anyhow!(
        "model-backed scoring requires the backend-tract feature"
    ))
}
