//! Local video file decoder using FFmpeg.
//!
//! Frames are decoded in-memory and converted to RGB24. Seeking by index is
//! done by decoding forward from the current position; a request for an index
//! behind the current position rewinds the demuxer to the start first. The
//! sampler asks for ascending indices, so each file is normally decoded once.
//!
//! Each decoded frame is placed by its timestamp, so packets the decoder
//! rejects leave a gap instead of shifting every later index.

use anyhow::{anyhow, Context};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::cursor::{FrameCursor, Lookup};
use super::decoder::{DecoderMetadata, VideoDecoder};
use crate::error::{DetectorError, Result};

pub(crate) struct FfmpegDecoder {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    metadata: DecoderMetadata,
    /// Seconds per stream timestamp unit.
    time_base: f64,
    start_pts: i64,
    /// Position assumed for the next frame when it carries no timestamp.
    sequential: u64,
    cursor: FrameCursor<ffmpeg::frame::Video>,
    eof_sent: bool,
}

impl FfmpegDecoder {
    pub(crate) fn open(path: &str) -> Result<Self> {
        Self::open_inner(path).map_err(|e| DetectorError::open(path, format!("{e:#}")))
    }

    fn open_inner(path: &str) -> anyhow::Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();

        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let reported_frames = input_stream.frames();
        let tb = input_stream.time_base();
        let time_base = if tb.denominator() != 0 {
            tb.numerator() as f64 / tb.denominator() as f64
        } else {
            0.0
        };
        let start_pts = match input_stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let frame_count = if reported_frames > 0 {
            reported_frames as u64
        } else {
            // Containers without a frame count: estimate from the duration.
            let seconds = input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);
            if seconds > 0.0 && fps > 0.0 {
                (seconds * fps).floor() as u64
            } else {
                0
            }
        };

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let metadata = DecoderMetadata {
            fps,
            width: decoder.width(),
            height: decoder.height(),
            frame_count,
        };
        log::info!("FfmpegDecoder: opened {} ({:?})", path, metadata);

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            metadata,
            time_base,
            start_pts,
            sequential: 0,
            cursor: FrameCursor::default(),
            eof_sent: false,
        })
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        log::debug!("FfmpegDecoder: rewinding {}", self.path);
        self.input.seek(0, ..).context("seek to start")?;
        self.decoder.flush();
        self.cursor.reset();
        self.sequential = 0;
        self.eof_sent = false;
        Ok(())
    }

    /// Decode the next frame in stream order, or `None` at end of stream.
    fn decode_next(&mut self, decoded: &mut ffmpeg::frame::Video) -> anyhow::Result<bool> {
        loop {
            if self.decoder.receive_frame(decoded).is_ok() {
                return Ok(true);
            }
            if self.eof_sent {
                return Ok(false);
            }

            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) => {
                    if index != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::warn!(
                            "FfmpegDecoder: dropped packet at pts {:?} in {}: {}",
                            packet.pts(),
                            self.path,
                            e
                        );
                    }
                }
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    /// Stream position of a decoded frame, from its timestamp when it has one.
    fn position_of(&self, frame: &ffmpeg::frame::Video) -> u64 {
        frame
            .timestamp()
            .or_else(|| frame.pts())
            .and_then(|ts| {
                timestamp_to_index(ts, self.start_pts, self.time_base, self.metadata.fps)
            })
            .unwrap_or(self.sequential)
    }

    fn decode_positioned(&mut self) -> anyhow::Result<Option<(u64, ffmpeg::frame::Video)>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if !self.decode_next(&mut decoded)? {
            return Ok(None);
        }
        let position = self.position_of(&decoded);
        self.sequential = position + 1;
        Ok(Some((position, decoded)))
    }

    fn read_inner(&mut self, index: u64) -> anyhow::Result<Option<RgbImage>> {
        if self.cursor.needs_rewind(index) {
            self.rewind()?;
        }

        let mut cursor = std::mem::take(&mut self.cursor);
        let lookup = cursor.seek(index, || self.decode_positioned());
        self.cursor = cursor;

        match lookup? {
            Lookup::Found(decoded) => {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                frame_to_image(&rgb_frame).map(Some)
            }
            Lookup::Missing { next } => Err(anyhow!(
                "frame is missing from the stream (next decodable frame is {})",
                next
            )),
            Lookup::EndOfStream => Ok(None),
        }
    }
}

/// Frame index for a timestamp, or `None` when the stream timing is unknown.
fn timestamp_to_index(ts: i64, start_pts: i64, time_base: f64, fps: f64) -> Option<u64> {
    if time_base <= 0.0 || fps <= 0.0 {
        return None;
    }
    let seconds = ts.saturating_sub(start_pts) as f64 * time_base;
    Some((seconds * fps).round().max(0.0) as u64)
}

impl VideoDecoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn metadata(&self) -> DecoderMetadata {
        self.metadata
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        self.read_inner(index)
            .map_err(|e| DetectorError::decode(index, format!("{e:#}")))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        log::debug!("FfmpegDecoder: released {}", self.path);
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> anyhow::Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than expected")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            pixels.extend_from_slice(
                data.get(start..end)
                    .context("ffmpeg frame row is out of bounds")?,
            );
        }
        pixels
    };

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_map_to_frame_indices() {
        // 25 fps in a 1/12800 time base: 512 ticks per frame.
        let tb = 1.0 / 12_800.0;
        assert_eq!(timestamp_to_index(0, 0, tb, 25.0), Some(0));
        assert_eq!(timestamp_to_index(512 * 7, 0, tb, 25.0), Some(7));
        assert_eq!(timestamp_to_index(1024 + 512 * 3, 1024, tb, 25.0), Some(3));
        assert_eq!(timestamp_to_index(512 * 7 + 3, 0, tb, 25.0), Some(7));
        assert_eq!(timestamp_to_index(-100, 0, tb, 25.0), Some(0));
        assert_eq!(timestamp_to_index(512, 0, 0.0, 25.0), None);
        assert_eq!(timestamp_to_index(512, 0, tb, 0.0), None);
    }
}
