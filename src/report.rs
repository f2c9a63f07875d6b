//! Human-readable and JSON renderings of an analysis report.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::aggregate::{DetectionIndicator, FrameResult, IndicatorKind, Verdict};
use crate::error::{DetectorError, Result};
use crate::ingest::SYNTHETIC_SCHEME;
use crate::pipeline::AnalysisReport;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub verdict: Verdict,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Vec<JsonIndicator<'a>>>,
    pub frames: &'a [FrameResult],
    pub metadata: JsonMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct JsonIndicator<'a> {
    pub indicator: IndicatorKind,
    pub detected: bool,
    pub score: f64,
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub struct JsonMetadata<'a> {
    pub video_path: &'a str,
    pub video_sha256: Option<String>,
    pub duration_seconds: f64,
    pub frames_analyzed: usize,
    pub faces_scored: usize,
    pub processing_time_seconds: f64,
    pub scoring: &'a str,
}

/// SHA-256 of a file's contents, hex encoded. The file is streamed.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of the analysed video; `None` for synthetic sources or when the
/// file cannot be read.
pub fn video_fingerprint(path: &str) -> Option<String> {
    if path.starts_with(SYNTHETIC_SCHEME) {
        return None;
    }
    match file_sha256(Path::new(path)) {
        Ok(digest) => Some(digest),
        Err(err) => {
            log::warn!("Report: could not fingerprint {}: {}", path, err);
            None
        }
    }
}

pub fn json_report<'a>(
    report: &'a AnalysisReport,
    include_reasoning: bool,
    video_sha256: Option<String>,
) -> JsonReport<'a> {
    let reasoning = include_reasoning.then(|| {
        report
            .result
            .indicators
            .iter()
            .map(|indicator| JsonIndicator {
                indicator: indicator.name,
                detected: indicator.detected,
                score: indicator.score,
                description: &indicator.description,
            })
            .collect()
    });
    JsonReport {
        verdict: report.result.verdict,
        confidence: report.result.confidence,
        reasoning,
        frames: &report.result.frame_results,
        metadata: JsonMetadata {
            video_path: &report.video.path,
            video_sha256,
            duration_seconds: report.video.duration,
            frames_analyzed: report.frames_sampled,
            faces_scored: report.crops_scored,
            processing_time_seconds: (report.processing_time_secs * 1000.0).round() / 1000.0,
            scoring: &report.scoring,
        },
    }
}

pub fn render_json(
    report: &AnalysisReport,
    include_reasoning: bool,
    video_sha256: Option<String>,
) -> Result<String> {
    serde_json::to_string_pretty(&json_report(report, include_reasoning, video_sha256))
        .map_err(|e| DetectorError::Io(io::Error::other(e)))
}

pub fn render_text(report: &AnalysisReport, include_reasoning: bool) -> String {
    let result = &report.result;
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut out = vec![
        String::new(),
        heavy.clone(),
        "  DEEPFAKE DETECTION RESULT".to_string(),
        heavy.clone(),
        format!("  Verdict: {}", result.verdict),
        String::new(),
        format!("  {}", verdict_summary(result.verdict)),
        String::new(),
        format!("  Confidence: {}", percent(result.confidence)),
        heavy,
        String::new(),
    ];

    if include_reasoning {
        out.push("EVIDENCE ANALYSIS:".to_string());
        out.push(light.clone());
        for indicator in &result.indicators {
            out.push(String::new());
            let tag = if indicator.detected { "[DETECTED]" } else { "[OK]" };
            out.push(format!("  {} {}", tag, indicator.name.as_str().to_uppercase()));
            out.push(format!("    Score: {}", percent(indicator.score)));
            out.push(format!("    {}", indicator.description));
            out.extend(explain(indicator, report));
        }
        out.push(String::new());
        out.push(light);
    }

    out.push("ANALYSIS SUMMARY:".to_string());
    out.push(format!("  - Video analyzed: {}", report.video.path));
    out.push(format!("  - Frames sampled: {}", report.frames_sampled));
    out.push(format!("  - Faces scored: {}", report.crops_scored));
    out.push(format!(
        "  - Processing time: {:.2} seconds",
        report.processing_time_secs
    ));
    out.push(format!("  - Scoring: {}", report.scoring));
    out.push(String::new());
    out.push("HOW TO INTERPRET:".to_string());
    out.push("  - Confidence 0-30%:   Likely AUTHENTIC".to_string());
    out.push("  - Confidence 30-50%:  UNCERTAIN, manual review recommended".to_string());
    out.push("  - Confidence 50-70%:  Likely MANIPULATED".to_string());
    out.push("  - Confidence 70-100%: High confidence DEEPFAKE".to_string());
    out.push(String::new());
    out.join("\n")
}

fn verdict_summary(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Fake => "This video shows signs of AI manipulation or deepfake generation.",
        Verdict::NotFake => "This video appears to be authentic with no manipulation detected.",
        Verdict::Unknown => "No faces were found, so no verdict could be reached.",
    }
}

fn explain(indicator: &DetectionIndicator, report: &AnalysisReport) -> Vec<String> {
    let frames = &report.result.frame_results;
    let any_high = frames.iter().any(|f| f.confidence > 0.5);
    let mut lines = vec![String::new(), "    EXPLANATION:".to_string()];
    match indicator.name {
        IndicatorKind::FaceManipulation => {
            let flagged = frames.iter().filter(|f| f.confidence > 0.5).count();
            lines.push(format!(
                "    The {} scorer analyzed {} face crops",
                report.scoring,
                frames.len()
            ));
            lines.push(format!("    and found manipulation artifacts in {flagged} of them."));
            if indicator.score > 0.7 {
                lines.push("    High detection rate across frames indicates systematic".to_string());
                lines.push("    face manipulation consistent with deepfake generation.".to_string());
            } else if indicator.score > 0.3 {
                lines.push("    Moderate detection suggests possible manipulation.".to_string());
                lines.push("    Manual review of flagged frames is recommended.".to_string());
            } else {
                lines.push("    Low detection rate suggests authentic facial content.".to_string());
            }
        }
        IndicatorKind::TemporalConsistency => {
            if indicator.detected {
                lines.push("    Frame-to-frame scores show HIGH VARIANCE, indicating".to_string());
                lines.push("    inconsistent manipulation or detection uncertainty.".to_string());
                lines.push("    This may suggest partial manipulation or edge cases.".to_string());
            } else {
                lines.push("    Frame-to-frame scores are CONSISTENT across the video.".to_string());
                if any_high {
                    lines.push("    Consistent high scores strongly suggest deepfake.".to_string());
                } else {
                    lines.push("    Consistent low scores suggest authentic video.".to_string());
                }
            }
        }
        IndicatorKind::OverallConfidence => {
            lines.push(format!(
                "    Combined score from all frames: {}",
                percent(indicator.score)
            ));
            lines.push("    Formula: 70% mean score + 30% max score across frames.".to_string());
            if indicator.detected {
                lines.push("    Score meets the threshold - classified as FAKE.".to_string());
            } else {
                lines.push("    Score BELOW threshold - classified as NOT FAKE.".to_string());
            }
        }
        IndicatorKind::NoFaces => {
            lines.push("    No face could be located in any sampled frame, so".to_string());
            lines.push("    there was nothing to score. Try more frames or a".to_string());
            lines.push("    video with a clearly visible face.".to_string());
        }
    }
    lines
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::frame::VideoInfo;
    use std::fs;
    use tempfile::tempdir;

    fn report(scores: &[f64]) -> AnalysisReport {
        let indices: Vec<u64> = (0..scores.len() as u64).map(|i| i * 10).collect();
        AnalysisReport {
            video: VideoInfo::new("clip.mp4", 30.0, 640, 480, 300),
            result: ResultAggregator::default().aggregate(scores, &indices, None),
            scoring: "heuristic".to_string(),
            frames_sampled: scores.len(),
            crops_scored: scores.len(),
            processing_time_secs: 1.23456,
        }
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(video_fingerprint("stub://clip"), None);
    }

    #[test]
    fn json_report_has_expected_shape() {
        let report = report(&[0.9, 0.9, 0.9]);
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&report, true, Some("00".into())).unwrap()).unwrap();
        assert_eq!(json["verdict"], "FAKE");
        assert_eq!(json["reasoning"][0]["indicator"], "face_manipulation");
        assert_eq!(json["frames"].as_array().unwrap().len(), 3);
        assert_eq!(json["metadata"]["frames_analyzed"], 3);
        assert_eq!(json["metadata"]["processing_time_seconds"], 1.235);
        assert_eq!(json["metadata"]["video_sha256"], "00");
        assert_eq!(json["metadata"]["scoring"], "heuristic");
    }

    #[test]
    fn reasoning_can_be_omitted() {
        let report = report(&[0.2]);
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&report, false, None).unwrap()).unwrap();
        assert!(json.get("reasoning").is_none());
        assert!(json["metadata"]["video_sha256"].is_null());
    }

    #[test]
    fn text_report_explains_indicators() {
        let text = render_text(&report(&[0.1, 0.9]), true);
        assert!(text.contains("Verdict: FAKE"));
        assert!(text.contains("[DETECTED] TEMPORAL_CONSISTENCY"));
        assert!(text.contains("Formula: 70% mean score + 30% max score"));
        assert!(text.contains("HOW TO INTERPRET:"));
    }

    #[test]
    fn text_report_for_unknown_verdict() {
        let text = render_text(&report(&[]), true);
        assert!(text.contains("Verdict: UNKNOWN"));
        assert!(text.contains("[DETECTED] NO_FACES"));
        let terse = render_text(&report(&[]), false);
        assert!(!terse.contains("EVIDENCE ANALYSIS"));
    }
}
