//! Synthetic video source (`stub://`) for tests and demos.
//!
//! Paths look like `stub://name?frames=90&fps=30&width=320&height=240&faces=1&fail=3,7`.
//! Every parameter is optional. Frames are deterministic functions of their
//! index: a blue-gray textured background with `faces` skin-toned ellipses, the
//! first one largest. Indices listed in `fail` report a decode error.

use image::{Rgb, RgbImage};

use super::decoder::{DecoderMetadata, VideoDecoder, SYNTHETIC_SCHEME};
use crate::error::{DetectorError, Result};

const DEFAULT_FRAMES: u64 = 300;
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FACES: u32 = 1;
const MAX_FACES: u32 = 4;

const SKIN: [f64; 3] = [224.0, 172.0, 140.0];
const BACKGROUND: [f64; 3] = [60.0, 90.0, 120.0];

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SyntheticConfig {
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub faces: u32,
    pub fail: Vec<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            faces: DEFAULT_FACES,
            fail: Vec::new(),
        }
    }
}

impl SyntheticConfig {
    pub(crate) fn parse(path: &str) -> Result<Self> {
        let rest = path.strip_prefix(SYNTHETIC_SCHEME).ok_or_else(|| {
            DetectorError::open(path, "synthetic paths must start with stub://")
        })?;
        let mut cfg = Self::default();
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(cfg);
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DetectorError::open(path, format!("malformed parameter '{pair}'")))?;
            let invalid = || DetectorError::open(path, format!("invalid value for '{key}': {value}"));
            match key {
                "frames" => cfg.frames = value.parse().map_err(|_| invalid())?,
                "fps" => cfg.fps = value.parse().map_err(|_| invalid())?,
                "width" => cfg.width = value.parse().map_err(|_| invalid())?,
                "height" => cfg.height = value.parse().map_err(|_| invalid())?,
                "faces" => cfg.faces = value.parse().map_err(|_| invalid())?,
                "fail" => {
                    cfg.fail = value
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(|v| v.parse().map_err(|_| invalid()))
                        .collect::<Result<Vec<u64>>>()?;
                }
                other => {
                    return Err(DetectorError::open(
                        path,
                        format!("unknown synthetic parameter '{other}'"),
                    ))
                }
            }
        }

        if cfg.width == 0 || cfg.height == 0 {
            return Err(DetectorError::open(path, "synthetic frame size must be non-zero"));
        }
        if cfg.faces > MAX_FACES {
            return Err(DetectorError::open(
                path,
                format!("at most {MAX_FACES} synthetic faces are supported"),
            ));
        }
        Ok(cfg)
    }
}

pub(crate) struct SyntheticDecoder {
    config: SyntheticConfig,
}

impl SyntheticDecoder {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub(crate) fn from_path(path: &str) -> Result<Self> {
        let config = SyntheticConfig::parse(path)?;
        log::info!(
            "SyntheticDecoder: opened {} ({} frames, {}x{}, {} fps, {} faces)",
            path,
            config.frames,
            config.width,
            config.height,
            config.fps,
            config.faces
        );
        Ok(Self::new(config))
    }

    fn render(&self, index: u64) -> RgbImage {
        let width = self.config.width;
        let height = self.config.height;
        let faces = self.face_layout(index);

        RgbImage::from_fn(width, height, |x, y| {
            let noise = texture(x, y, index);
            let (fx, fy) = (x as f64 + 0.5, y as f64 + 0.5);
            let inside = faces.iter().find(|face| face.contains(fx, fy));
            let rgb = match inside {
                Some(face) => {
                    // Vertical shading so the face region is not perfectly flat.
                    let shade = ((fy - face.cy) / face.ry) * 10.0;
                    [
                        SKIN[0] - shade + noise,
                        SKIN[1] - shade + noise,
                        SKIN[2] - shade + noise,
                    ]
                }
                None => {
                    let gradient = (fx / width as f64) * 30.0;
                    [
                        BACKGROUND[0] + gradient + noise,
                        BACKGROUND[1] + gradient + noise,
                        BACKGROUND[2] + noise,
                    ]
                }
            };
            Rgb([clamp_to_u8(rgb[0]), clamp_to_u8(rgb[1]), clamp_to_u8(rgb[2])])
        })
    }

    fn face_layout(&self, index: u64) -> Vec<Ellipse> {
        let w = self.config.width as f64;
        let h = self.config.height as f64;
        let drift = ((index % 20) as f64 - 10.0) * 0.5;
        let count = self.config.faces;

        (0..count)
            .map(|i| {
                let scale = if i == 0 { 1.0 } else { 0.6 };
                let slot = (i as f64 + 0.5) / count as f64;
                let ry = h * 0.22 * scale;
                Ellipse {
                    cx: w * slot + drift,
                    cy: h * 0.5,
                    rx: (ry * 0.85).min(w / count as f64 * 0.4),
                    ry,
                }
            })
            .collect()
    }
}

impl VideoDecoder for SyntheticDecoder {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn metadata(&self) -> DecoderMetadata {
        DecoderMetadata {
            fps: self.config.fps,
            width: self.config.width,
            height: self.config.height,
            frame_count: self.config.frames,
        }
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        if index >= self.config.frames {
            return Ok(None);
        }
        if self.config.fail.contains(&index) {
            return Err(DetectorError::decode(index, "synthetic decode failure"));
        }
        Ok(Some(self.render(index)))
    }
}

struct Ellipse {
    cx: f64,
    cy: f64,
    rx: f64,
    ry: f64,
}

impl Ellipse {
    fn contains(&self, x: f64, y: f64) -> bool {
        let dx = (x - self.cx) / self.rx;
        let dy = (y - self.cy) / self.ry;
        dx * dx + dy * dy <= 1.0
    }
}

/// Deterministic pixel texture in [-6, 6].
fn texture(x: u32, y: u32, index: u64) -> f64 {
    let mut h = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ index.wrapping_mul(0x1656_67B1_9E37_79F9);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    (h % 13) as f64 - 6.0
}

fn clamp_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters() {
        let cfg = SyntheticConfig::parse("stub://clip?frames=40&fps=0&width=64&height=48&faces=2&fail=1,5")
            .expect("parse");
        assert_eq!(cfg.frames, 40);
        assert_eq!(cfg.fps, 0.0);
        assert_eq!((cfg.width, cfg.height), (64, 48));
        assert_eq!(cfg.faces, 2);
        assert_eq!(cfg.fail, vec![1, 5]);
    }

    #[test]
    fn defaults_without_query() {
        let cfg = SyntheticConfig::parse("stub://front").expect("parse");
        assert_eq!(cfg, SyntheticConfig::default());
    }

    #[test]
    fn rejects_unknown_parameters() {
        assert!(SyntheticConfig::parse("stub://clip?colour=red").is_err());
        assert!(SyntheticConfig::parse("stub://clip?frames=abc").is_err());
    }

    #[test]
    fn frames_are_deterministic_and_bounded() {
        let mut decoder = SyntheticDecoder::new(SyntheticConfig {
            frames: 3,
            fail: vec![1],
            ..SyntheticConfig::default()
        });
        let a = decoder.read_frame(0).unwrap().unwrap();
        let b = decoder.read_frame(0).unwrap().unwrap();
        assert_eq!(a, b);
        assert!(decoder.read_frame(1).is_err());
        assert!(decoder.read_frame(3).unwrap().is_none());
    }

    #[test]
    fn face_pixels_are_skin_toned() {
        let mut decoder = SyntheticDecoder::new(SyntheticConfig::default());
        let frame = decoder.read_frame(10).unwrap().unwrap();
        let center = frame.get_pixel(160, 120);
        assert!(center[0] > 200 && center[1] > 150 && center[2] > 120);
        let corner = frame.get_pixel(0, 0);
        assert!(corner[2] > corner[0]);
    }
}
