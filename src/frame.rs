//! Video-level metadata and sampled frames.
//!
//! - `VideoInfo`: immutable metadata derived once when a video is loaded.
//! - `Frame`: one sampled frame with its source index and an owned RGB buffer.
//!
//! Frames own their pixels. They are copies of decoder output, never views into
//! decoder memory, so they stay valid after the decoder is released.

use image::RgbImage;
use serde::Serialize;

/// Metadata of a loaded video.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoInfo {
    pub path: String,
    /// Duration in seconds (0 when the frame rate is unknown).
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
}

impl VideoInfo {
    pub fn new(path: impl Into<String>, fps: f64, width: u32, height: u32, frame_count: u64) -> Self {
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            path: path.into(),
            duration,
            fps,
            width,
            height,
            frame_count,
        }
    }

    /// Timestamp in seconds of the frame at `index`.
    pub fn timestamp_of(&self, index: u64) -> f64 {
        if self.fps > 0.0 {
            index as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// A frame extracted from a video.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    /// Seconds from the start of the video (0 when fps is unknown).
    pub timestamp: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
