//! End-to-end analysis: load, sample, locate, score, aggregate.
//!
//! The `Analyzer` owns one instance of each stage and runs them strictly in
//! order. Stage progress is reported through a `PipelineObserver` so callers
//! decide how (or whether) to display it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::ImageFormat;
use serde::Serialize;

use crate::aggregate::{AggregatedResult, ResultAggregator};
use crate::config::Config;
use crate::detect::{FaceCrop, FaceLocator};
use crate::error::{DetectorError, Result};
use crate::frame::VideoInfo;
use crate::ingest::FrameSource;
use crate::score::FaceScorer;

const DEFAULT_NUM_FRAMES: usize = 30;
const DEFAULT_SAMPLE_RATE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    LoadVideo,
    ExtractFrames,
    LocateFaces,
    ScoreFaces,
    Aggregate,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::LoadVideo => "Load video",
            Stage::ExtractFrames => "Extract frames",
            Stage::LocateFaces => "Locate faces",
            Stage::ScoreFaces => "Score faces",
            Stage::Aggregate => "Aggregate evidence",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    StageStarted(Stage),
    StageFinished { stage: Stage, detail: String },
}

/// Receives stage progress from an `Analyzer`.
pub trait PipelineObserver {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F: FnMut(&PipelineEvent)> PipelineObserver for F {
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event)
    }
}

/// Observer that discards every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&mut self, _event: &PipelineEvent) {}
}

/// Everything a report needs from one analysis run.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub video: VideoInfo,
    pub result: AggregatedResult,
    /// `model:<name>` or `heuristic`.
    pub scoring: String,
    pub frames_sampled: usize,
    pub crops_scored: usize,
    pub processing_time_secs: f64,
}

pub struct Analyzer {
    source: FrameSource,
    locator: FaceLocator,
    scorer: FaceScorer,
    aggregator: ResultAggregator,
    num_frames: usize,
    sample_rate: usize,
    select_primary: bool,
    save_crops_dir: Option<PathBuf>,
}

impl Analyzer {
    pub fn new(
        source: FrameSource,
        locator: FaceLocator,
        scorer: FaceScorer,
        aggregator: ResultAggregator,
    ) -> Self {
        Self {
            source,
            locator,
            scorer,
            aggregator,
            num_frames: DEFAULT_NUM_FRAMES,
            sample_rate: DEFAULT_SAMPLE_RATE,
            select_primary: true,
            save_crops_dir: None,
        }
    }

    /// Build every stage from a validated configuration.
    ///
    /// Fails only when the face detector cannot be initialised; an
    /// unavailable classifier downgrades to heuristic scoring.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let source = FrameSource::new(cfg.video.max_duration_secs);
        let locator = FaceLocator::from_settings(&cfg.locator_settings())?;
        let scorer = FaceScorer::from_settings(&cfg.scorer_settings());
        let aggregator = ResultAggregator::new(cfg.detection.confidence_threshold)?;
        Ok(Self::new(source, locator, scorer, aggregator)
            .with_sampling(cfg.detection.num_frames, cfg.detection.sample_rate)
            .with_select_primary(cfg.detection.select_primary)
            .with_crops_dir(cfg.output.save_crops_dir.clone()))
    }

    /// `num_frames == 0` switches to stride sampling every `sample_rate` frames.
    pub fn with_sampling(mut self, num_frames: usize, sample_rate: usize) -> Self {
        self.num_frames = num_frames;
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_select_primary(mut self, select_primary: bool) -> Self {
        self.select_primary = select_primary;
        self
    }

    /// Write every scored crop as a JPEG into `dir`.
    pub fn with_crops_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.save_crops_dir = dir;
        self
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        self.aggregator.set_threshold(threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.aggregator.threshold()
    }

    pub fn scoring_strategy(&self) -> String {
        self.scorer.strategy_name()
    }

    pub fn analyze(
        &mut self,
        path: &str,
        observer: &mut dyn PipelineObserver,
    ) -> Result<AnalysisReport> {
        let started = Instant::now();
        log::info!("Analyzer: analyzing {}", path);

        observer.on_event(&PipelineEvent::StageStarted(Stage::LoadVideo));
        let video = self.source.load(path)?;
        observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::LoadVideo,
            detail: format!(
                "{}x{}, {:.1} fps, {} frames",
                video.width, video.height, video.fps, video.frame_count
            ),
        });

        observer.on_event(&PipelineEvent::StageStarted(Stage::ExtractFrames));
        let extracted = self.source.extract_frames(self.num_frames, self.sample_rate);
        self.source.close();
        let frames = extracted?;
        let frames_sampled = frames.len();
        observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::ExtractFrames,
            detail: format!("{} frames", frames.len()),
        });

        observer.on_event(&PipelineEvent::StageStarted(Stage::LocateFaces));
        let crops = self.locator.extract_from_frames(&frames, self.select_primary);
        drop(frames);
        if let Some(dir) = &self.save_crops_dir {
            save_crops(dir, &crops)?;
        }
        observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::LocateFaces,
            detail: format!("{} face crops", crops.len()),
        });

        observer.on_event(&PipelineEvent::StageStarted(Stage::ScoreFaces));
        let scores = self.scorer.score(&crops);
        observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::ScoreFaces,
            detail: self.scorer.strategy_name(),
        });

        observer.on_event(&PipelineEvent::StageStarted(Stage::Aggregate));
        let indices: Vec<u64> = crops.iter().map(|crop| crop.frame_index).collect();
        let faces = faces_per_entry(&indices);
        let result = self.aggregator.aggregate(&scores, &indices, Some(&faces));
        observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::Aggregate,
            detail: format!("{} ({:.1}%)", result.verdict, result.confidence * 100.0),
        });

        let report = AnalysisReport {
            video,
            result,
            scoring: self.scorer.strategy_name(),
            frames_sampled,
            crops_scored: crops.len(),
            processing_time_secs: started.elapsed().as_secs_f64(),
        };
        log::info!(
            "Analyzer: {} finished in {:.2}s",
            path,
            report.processing_time_secs
        );
        Ok(report)
    }
}

/// Number of crops sharing each entry's frame.
fn faces_per_entry(indices: &[u64]) -> Vec<u32> {
    let mut counts: HashMap<u64, u32> = HashMap::new();
    for index in indices {
        *counts.entry(*index).or_default() += 1;
    }
    indices
        .iter()
        .map(|index| counts.get(index).copied().unwrap_or(1))
        .collect()
}

/// Write crops as `frame_<index>_face_<n>.jpg` under `dir`.
pub fn save_crops(dir: &Path, crops: &[FaceCrop]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut per_frame: HashMap<u64, u32> = HashMap::new();
    let mut written = Vec::with_capacity(crops.len());
    for crop in crops {
        let n = per_frame.entry(crop.frame_index).or_default();
        let path = dir.join(format!("frame_{:06}_face_{}.jpg", crop.frame_index, n));
        *n += 1;
        crop.image
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| DetectorError::Io(std::io::Error::other(e)))?;
        written.push(path);
    }
    log::info!("Analyzer: saved {} crops to {}", written.len(), dir.display());
    Ok(written)
}
