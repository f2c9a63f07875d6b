//! Frame source: loads a video and extracts a bounded set of sampled frames.
//!
//! The frame source is responsible for:
//! - Opening the decoder and caching video metadata
//! - Enforcing the maximum analysed duration
//! - Choosing which frame indices to sample
//! - Releasing the decoder on every exit path (`close()` and `Drop`)
//!
//! A frame that fails to decode is logged and skipped. It never aborts the
//! extraction of the remaining frames.

use std::path::Path;

use super::decoder::{is_synthetic_path, open_decoder, DecoderFactory, VideoDecoder};
use crate::error::{DetectorError, Result};
use crate::frame::{Frame, VideoInfo};

pub const DEFAULT_MAX_DURATION_SECS: u64 = 300;

/// Indices chosen for extraction plus the facts that shaped them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplePlan {
    pub indices: Vec<u64>,
    /// Exclusive upper bound on sampled indices after the duration cap.
    pub max_frame: u64,
    /// True when `target_count` exceeded the available frames.
    pub clamped: bool,
}

/// Compute the frame indices to sample.
///
/// - `target_count == 0`: every `sample_rate`-th index in `[0, max_frame)`.
/// - otherwise: `min(target_count, max_frame)` indices evenly spaced over
///   `[0, max_frame - 1]`, rounded to the nearest index; `[0]` for a single frame.
pub fn sample_indices(
    total_frames: u64,
    fps: f64,
    max_duration_secs: u64,
    target_count: usize,
    sample_rate: usize,
) -> SamplePlan {
    let max_frame = if fps > 0.0 {
        let cap = (max_duration_secs as f64 * fps).floor() as u64;
        total_frames.min(cap)
    } else {
        total_frames
    };

    if target_count == 0 {
        let step = sample_rate.max(1);
        return SamplePlan {
            indices: (0..max_frame).step_by(step).collect(),
            max_frame,
            clamped: false,
        };
    }

    let requested = target_count as u64;
    let count = requested.min(max_frame);
    let clamped = count < requested;
    let indices = match count {
        0 => Vec::new(),
        1 => vec![0],
        n => {
            let last = (max_frame - 1) as f64;
            let step = last / (n - 1) as f64;
            (0..n)
                .map(|i| ((i as f64 * step).round() as u64).min(max_frame - 1))
                .collect()
        }
    };

    SamplePlan {
        indices,
        max_frame,
        clamped,
    }
}

/// Loads a video and extracts sampled frames.
pub struct FrameSource {
    max_duration_secs: u64,
    factory: DecoderFactory,
    decoder: Option<Box<dyn VideoDecoder>>,
    info: Option<VideoInfo>,
}

impl FrameSource {
    pub fn new(max_duration_secs: u64) -> Self {
        Self::with_factory(max_duration_secs, Box::new(open_decoder))
    }

    /// Use a custom decoder factory instead of the built-in backends.
    pub fn with_factory(max_duration_secs: u64, factory: DecoderFactory) -> Self {
        Self {
            max_duration_secs,
            factory,
            decoder: None,
            info: None,
        }
    }

    pub fn max_duration_secs(&self) -> u64 {
        self.max_duration_secs
    }

    /// Metadata of the loaded video, if any.
    pub fn video_info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    /// Open `path` and cache its metadata.
    ///
    /// A previously loaded video is released first.
    pub fn load(&mut self, path: &str) -> Result<VideoInfo> {
        self.close();

        if !is_synthetic_path(path) && !Path::new(path).exists() {
            return Err(DetectorError::NotFound(path.into()));
        }

        let decoder = (self.factory)(path)?;
        let meta = decoder.metadata();
        let info = VideoInfo::new(path, meta.fps, meta.width, meta.height, meta.frame_count);

        log::info!(
            "FrameSource: loaded {} ({:.1}s, {}x{}, {:.1} fps, {} frames, decoder={})",
            path,
            info.duration,
            info.width,
            info.height,
            info.fps,
            info.frame_count,
            decoder.name()
        );
        if info.duration > self.max_duration_secs as f64 {
            log::warn!(
                "FrameSource: video duration ({:.1}s) exceeds maximum ({}s); only the first {}s will be analyzed",
                info.duration,
                self.max_duration_secs,
                self.max_duration_secs
            );
        }

        self.decoder = Some(decoder);
        self.info = Some(info.clone());
        Ok(info)
    }

    /// Extract sampled frames from the loaded video.
    ///
    /// `target_count == 0` switches to stride sampling with `sample_rate`.
    pub fn extract_frames(&mut self, target_count: usize, sample_rate: usize) -> Result<Vec<Frame>> {
        let (Some(decoder), Some(info)) = (self.decoder.as_mut(), self.info.as_ref()) else {
            return Err(DetectorError::NotLoaded);
        };

        let plan = sample_indices(
            info.frame_count,
            info.fps,
            self.max_duration_secs,
            target_count,
            sample_rate,
        );
        if target_count == 0 {
            log::info!(
                "FrameSource: using sample_rate={}, extracting {} frames",
                sample_rate.max(1),
                plan.indices.len()
            );
        } else if plan.clamped {
            log::warn!(
                "FrameSource: video has fewer frames ({}) than requested ({}); extracting all available frames",
                plan.max_frame,
                target_count
            );
        }

        let mut frames = Vec::with_capacity(plan.indices.len());
        for index in plan.indices {
            match decoder.read_frame(index) {
                Ok(Some(image)) => frames.push(Frame {
                    index,
                    timestamp: info.timestamp_of(index),
                    image,
                }),
                Ok(None) => {
                    log::warn!("FrameSource: stream ended before frame {}", index);
                }
                Err(e) => {
                    log::warn!("FrameSource: failed to read frame {}: {}", index, e);
                }
            }
        }

        log::info!(
            "FrameSource: extracted {} frames (requested: {})",
            frames.len(),
            target_count
        );
        Ok(frames)
    }

    /// Release the decoder and clear cached metadata. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            log::debug!("FrameSource: releasing {} decoder", decoder.name());
        }
        self.info = None;
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
