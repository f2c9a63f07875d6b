//! Evidence aggregation: per-face scores to one verdict with named indicators.

use std::fmt;

use serde::Serialize;

use crate::error::{DetectorError, Result};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Per-frame score above which a frame counts as manipulated.
const FRAME_FAKE_SCORE: f64 = 0.5;
/// Fraction of manipulated frames above which `face_manipulation` is raised.
const MANIPULATED_FRACTION: f64 = 0.3;
/// Score variance above which detection is called temporally inconsistent.
const TEMPORAL_VARIANCE: f64 = 0.1;
const MEAN_WEIGHT: f64 = 0.7;
const MAX_WEIGHT: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Fake,
    NotFake,
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Fake => "FAKE",
            Verdict::NotFake => "NOT_FAKE",
            Verdict::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    FaceManipulation,
    TemporalConsistency,
    OverallConfidence,
    NoFaces,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::FaceManipulation => "face_manipulation",
            IndicatorKind::TemporalConsistency => "temporal_consistency",
            IndicatorKind::OverallConfidence => "overall_confidence",
            IndicatorKind::NoFaces => "no_faces",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named piece of evidence behind a verdict.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionIndicator {
    pub name: IndicatorKind,
    pub detected: bool,
    pub score: f64,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame_index: u64,
    pub confidence: f64,
    pub faces_detected: u32,
}

/// Final outcome of an analysis. Read-only once produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub indicators: Vec<DetectionIndicator>,
    pub frame_results: Vec<FrameResult>,
}

impl AggregatedResult {
    pub fn indicator(&self, kind: IndicatorKind) -> Option<&DetectionIndicator> {
        self.indicators.iter().find(|i| i.name == kind)
    }
}

/// Combines per-face scores into a thresholded verdict.
#[derive(Clone, Debug)]
pub struct ResultAggregator {
    threshold: f64,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ResultAggregator {
    pub fn new(threshold: f64) -> Result<Self> {
        let mut aggregator = Self::default();
        aggregator.set_threshold(threshold)?;
        Ok(aggregator)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Replace the threshold for subsequent `aggregate` calls.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectorError::ThresholdOutOfRange(threshold));
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Aggregate `scores` (one per face crop) taken from `frame_indices`.
    ///
    /// `faces_per_frame` defaults to one face per entry. Frame results pair
    /// scores and indices positionally and stop at the shorter of the two.
    pub fn aggregate(
        &self,
        scores: &[f64],
        frame_indices: &[u64],
        faces_per_frame: Option<&[u32]>,
    ) -> AggregatedResult {
        if scores.is_empty() {
            log::info!("Aggregator: no face scores; verdict UNKNOWN");
            return AggregatedResult {
                verdict: Verdict::Unknown,
                confidence: 0.0,
                indicators: vec![DetectionIndicator {
                    name: IndicatorKind::NoFaces,
                    detected: true,
                    score: 0.0,
                    description: "No faces detected in video".to_string(),
                }],
                frame_results: Vec::new(),
            };
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let confidence = (MEAN_WEIGHT * mean + MAX_WEIGHT * max).clamp(0.0, 1.0);
        let verdict = if confidence >= self.threshold {
            Verdict::Fake
        } else {
            Verdict::NotFake
        };

        let frame_results = scores
            .iter()
            .zip(frame_indices)
            .enumerate()
            .map(|(i, (&score, &frame_index))| FrameResult {
                frame_index,
                confidence: score,
                faces_detected: faces_per_frame
                    .and_then(|faces| faces.get(i).copied())
                    .unwrap_or(1),
            })
            .collect();

        let indicators = self.build_indicators(scores, mean, confidence);
        log::info!(
            "Aggregator: {} (confidence {:.1}%)",
            verdict,
            confidence * 100.0
        );

        AggregatedResult {
            verdict,
            confidence,
            indicators,
            frame_results,
        }
    }

    fn build_indicators(&self, scores: &[f64], mean: f64, confidence: f64) -> Vec<DetectionIndicator> {
        let mut indicators = Vec::with_capacity(3);

        let flagged = scores.iter().filter(|&&s| s > FRAME_FAKE_SCORE).count();
        let fraction = flagged as f64 / scores.len() as f64;
        indicators.push(DetectionIndicator {
            name: IndicatorKind::FaceManipulation,
            detected: fraction > MANIPULATED_FRACTION,
            score: fraction,
            description: format!(
                "Face manipulation detected in {}/{} frames",
                flagged,
                scores.len()
            ),
        });

        if scores.len() > 1 {
            let variance =
                scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / scores.len() as f64;
            let inconsistent = variance > TEMPORAL_VARIANCE;
            indicators.push(DetectionIndicator {
                name: IndicatorKind::TemporalConsistency,
                detected: inconsistent,
                score: (variance * 2.0).min(1.0),
                description: if inconsistent {
                    "Inconsistent detection across frames".to_string()
                } else {
                    "Consistent detection across frames".to_string()
                },
            });
        }

        indicators.push(DetectionIndicator {
            name: IndicatorKind::OverallConfidence,
            detected: confidence >= self.threshold,
            score: confidence,
            description: format!(
                "Overall confidence: {:.1}% (threshold: {:.1}%)",
                confidence * 100.0,
                self.threshold * 100.0
            ),
        });

        indicators
    }
}
