use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One entry of a classifier's output distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f64,
}

impl LabelProbability {
    pub fn new(label: impl Into<String>, probability: f64) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Image classifier producing an ordered label distribution for a face crop.
pub trait Classifier {
    /// Identifier used in logs and reports.
    fn name(&self) -> &str;

    fn classify(&mut self, image: &RgbImage) -> anyhow::Result<Vec<LabelProbability>>;
}

/// Fake-probability of a classifier distribution.
///
/// The first label containing "fake" (any case) wins; otherwise the label at
/// index 1; otherwise one minus the top probability. `None` for an empty
/// distribution or a non-finite probability.
pub fn fake_probability(distribution: &[LabelProbability]) -> Option<f64> {
    if distribution.is_empty() {
        return None;
    }
    let probability = if let Some(entry) = distribution
        .iter()
        .find(|entry| entry.label.to_lowercase().contains("fake"))
    {
        entry.probability
    } else if let Some(entry) = distribution.get(1) {
        entry.probability
    } else {
        let top = distribution
            .iter()
            .map(|entry| entry.probability)
            .fold(f64::NEG_INFINITY, f64::max);
        1.0 - top
    };
    if !probability.is_finite() {
        return None;
    }
    Some(probability.clamp(0.0, 1.0))
}

/// Convert raw logits into a probability distribution.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(entries: &[(&str, f64)]) -> Vec<LabelProbability> {
        entries
            .iter()
            .map(|(l, p)| LabelProbability::new(*l, *p))
            .collect()
    }

    #[test]
    fn fake_label_matches_case_insensitively() {
        let d = dist(&[("Real", 0.2), ("DEEPFAKE", 0.8)]);
        assert_eq!(fake_probability(&d), Some(0.8));

        let d = dist(&[("fake", 0.35), ("real", 0.65)]);
        assert_eq!(fake_probability(&d), Some(0.35));
    }

    #[test]
    fn falls_back_to_second_label() {
        let d = dist(&[("LABEL_0", 0.7), ("LABEL_1", 0.3)]);
        assert_eq!(fake_probability(&d), Some(0.3));
    }

    #[test]
    fn single_label_uses_complement_of_top() {
        let d = dist(&[("authentic", 0.9)]);
        let p = fake_probability(&d).unwrap();
        assert!((p - 0.1).abs() < 1e-12);
    }

    #[test]
    fn empty_distribution_has_no_probability() {
        assert_eq!(fake_probability(&[]), None);
    }

    #[test]
    fn non_finite_probability_is_rejected() {
        let d = dist(&[("real", 0.1), ("fake", f64::NAN)]);
        assert_eq!(fake_probability(&d), None);
        let d = dist(&[("LABEL_0", 0.0), ("LABEL_1", f64::INFINITY)]);
        assert_eq!(fake_probability(&d), None);
        let d = dist(&[("fake", 1.7)]);
        assert_eq!(fake_probability(&d), Some(1.0));
    }

    #[test]
    fn softmax_normalises() {
        let probs = softmax(&[1.0, 1.0]);
        assert_eq!(probs, vec![0.5, 0.5]);
        let probs = softmax(&[0.0, 10.0, -10.0]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[1] > 0.99);
    }
}
