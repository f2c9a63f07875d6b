use image::RgbImage;

use crate::error::{DetectorError, Result};

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegDecoder;
use super::synthetic::SyntheticDecoder;

/// Scheme prefix for in-process synthetic videos.
pub const SYNTHETIC_SCHEME: &str = "stub://";

/// Stream-level metadata reported by a decoder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecoderMetadata {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
}

/// Video decoder backend.
///
/// A decoder is an open handle on one video stream. Dropping it releases the
/// underlying resources, so a `Box<dyn VideoDecoder>` is the handle itself.
pub trait VideoDecoder {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn metadata(&self) -> DecoderMetadata;

    /// Seek to `index` and decode that frame as RGB.
    ///
    /// Returns `Ok(None)` when the stream ends before `index`.
    fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>>;
}

/// Opens a decoder for `path`.
///
/// Decoders are constructed by a factory so callers (and tests) can substitute
/// their own backend.
pub type DecoderFactory = Box<dyn Fn(&str) -> Result<Box<dyn VideoDecoder>>>;

/// Default factory: synthetic sources for `stub://` paths, FFmpeg for files.
pub fn open_decoder(path: &str) -> Result<Box<dyn VideoDecoder>> {
    if !is_local_video_path(path) {
        return Err(DetectorError::open(
            path,
            "only local video files are supported (no URL schemes)",
        ));
    }
    if is_synthetic_path(path) {
        return Ok(Box::new(SyntheticDecoder::from_path(path)?));
    }
    #[cfg(feature = "ingest-ffmpeg")]
    {
        Ok(Box::new(FfmpegDecoder::open(path)?))
    }
    #[cfg(not(feature = "ingest-ffmpeg"))]
    {
        Err(DetectorError::open(
            path,
            "file decoding requires the ingest-ffmpeg feature",
        ))
    }
}

pub(crate) fn is_synthetic_path(path: &str) -> bool {
    path.starts_with(SYNTHETIC_SCHEME)
}

fn is_local_video_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_synthetic_path(path) {
        return true;
    }
    !path.contains("://")
}
