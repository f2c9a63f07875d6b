use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::score::imageops;

/// Laplacian variance band: below reads as blurred, above as over-sharpened.
pub const SHARPNESS_VARIANCE_BAND: (f64, f64) = (50.0, 2000.0);
/// Per-channel histogram entropy (bits) under this reads as a flattened palette.
pub const HISTOGRAM_ENTROPY_FLOOR: f64 = 5.0;
/// Noise residual standard deviation outside this band is suspicious.
pub const NOISE_STD_BAND: (f64, f64) = (2.0, 20.0);

const BLURRY_SCORE: f64 = 0.3;
const OVERSHARPENED_SCORE: f64 = 0.2;
const HISTOGRAM_SCORE_PER_CHANNEL: f64 = 0.1;
const HISTOGRAM_SCORE_CAP: f64 = 0.3;
const EDGE_SCORE: f64 = 0.2;
const NOISE_SCORE: f64 = 0.15;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Border band width as a fraction of the shorter side.
const BORDER_FRACTION: f64 = 0.1;
const NEUTRAL_SCORE: f64 = 0.5;

/// Per-indicator breakdown for one crop. `None` means the indicator could not
/// be computed for this image.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ArtifactAnalysis {
    pub sharpness: Option<f64>,
    pub histogram: Option<f64>,
    pub edge_boundary: Option<f64>,
    pub noise: Option<f64>,
}

impl ArtifactAnalysis {
    /// Mean of the indicators that were computed, or the neutral 0.5 when none were.
    pub fn score(&self) -> f64 {
        let present: Vec<f64> = [self.sharpness, self.histogram, self.edge_boundary, self.noise]
            .into_iter()
            .flatten()
            .collect();
        if present.is_empty() {
            NEUTRAL_SCORE
        } else {
            imageops::mean(&present)
        }
    }
}

/// Training-free scorer that inspects a crop for common synthesis artifacts:
/// abnormal sharpness, flattened colour histograms, blending seams at the crop
/// border and out-of-band sensor noise.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, image: &RgbImage) -> ArtifactAnalysis {
        if image.width() == 0 || image.height() == 0 {
            return ArtifactAnalysis::default();
        }
        let gray = imageops::grayscale(image);
        ArtifactAnalysis {
            sharpness: Some(sharpness_indicator(&gray)),
            histogram: Some(histogram_indicator(image)),
            edge_boundary: edge_boundary_indicator(&gray),
            noise: Some(noise_indicator(&gray)),
        }
    }

    /// Manipulation likelihood in [0, 1]. Deterministic for identical input.
    pub fn score(&self, image: &RgbImage) -> f64 {
        let analysis = self.analyze(image);
        let score = analysis.score().clamp(0.0, 1.0);
        log::trace!(
            "Heuristic: {}x{} crop scored {:.4} ({:?})",
            image.width(),
            image.height(),
            score,
            analysis
        );
        score
    }
}

fn sharpness_indicator(gray: &GrayImage) -> f64 {
    let variance = imageops::variance(&imageops::laplacian(gray));
    if variance < SHARPNESS_VARIANCE_BAND.0 {
        BLURRY_SCORE
    } else if variance > SHARPNESS_VARIANCE_BAND.1 {
        OVERSHARPENED_SCORE
    } else {
        0.0
    }
}

fn histogram_indicator(image: &RgbImage) -> f64 {
    let total = (image.width() as f64) * (image.height() as f64);
    let mut score = 0.0;
    for channel in 0..3 {
        let mut hist = [0u64; 256];
        for pixel in image.pixels() {
            hist[pixel[channel] as usize] += 1;
        }
        let entropy: f64 = hist
            .iter()
            .map(|&count| {
                let p = count as f64 / (total + 1e-6);
                -p * (p + 1e-10).log2()
            })
            .sum();
        if entropy < HISTOGRAM_ENTROPY_FLOOR {
            score += HISTOGRAM_SCORE_PER_CHANNEL;
        }
    }
    score.min(HISTOGRAM_SCORE_CAP)
}

fn edge_boundary_indicator(gray: &GrayImage) -> Option<f64> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let border = (w.min(h) as f64 * BORDER_FRACTION).floor() as usize;
    if border == 0 || w <= 2 * border || h <= 2 * border {
        return None;
    }
    let edges = imageops::canny(gray, CANNY_LOW, CANNY_HIGH);
    let count = |xs: std::ops::Range<usize>, ys: std::ops::Range<usize>| -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| edges[y * w + x])
            .count()
    };

    // Top, bottom, left and right strips; corners belong to two strips each.
    let border_edges = count(0..w, 0..border)
        + count(0..w, h - border..h)
        + count(0..border, 0..h)
        + count(w - border..w, 0..h);
    let border_pixels = 2 * border * w + 2 * border * h;
    let center_edges = count(border..w - border, border..h - border);
    let center_pixels = (w - 2 * border) * (h - 2 * border);

    let border_density = border_edges as f64 / border_pixels as f64;
    let center_density = center_edges as f64 / center_pixels as f64;
    Some(if border_density > 2.0 * center_density {
        EDGE_SCORE
    } else {
        0.0
    })
}

fn noise_indicator(gray: &GrayImage) -> f64 {
    let std = imageops::variance(&imageops::noise_residual(gray)).sqrt();
    if std < NOISE_STD_BAND.0 || std > NOISE_STD_BAND.1 {
        NOISE_SCORE
    } else {
        0.0
    }
}
