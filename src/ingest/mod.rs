//! Frame ingestion.
//!
//! This module provides the frame source and its decoder backends:
//! - Synthetic `stub://` videos (always available, used by tests)
//! - Local video files through FFmpeg (feature: ingest-ffmpeg)
//!
//! The ingestion layer is responsible for:
//! - Reading local files only (no URL schemes)
//! - Decoding frames in-memory into owned RGB buffers
//! - Sampling a bounded set of frames under the maximum-duration cap
//! - Releasing the decoder deterministically

mod cursor;
mod decoder;
#[cfg(feature = "ingest-ffmpeg")]
mod file_ffmpeg;
pub mod source;
mod synthetic;

pub use decoder::{open_decoder, DecoderFactory, DecoderMetadata, VideoDecoder, SYNTHETIC_SCHEME};
pub use source::{sample_indices, FrameSource, SamplePlan, DEFAULT_MAX_DURATION_SECS};
