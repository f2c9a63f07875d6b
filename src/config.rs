//! Layered configuration: built-in defaults, then a config file, then
//! `DEEPFAKE_*` environment variables, then validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::detect::{
    DetectorKind, LocatorSettings, DEFAULT_FACE_MODEL_INPUT, DEFAULT_FACE_PADDING, DEFAULT_TARGET_SIZE,
};
use crate::error::{DetectorError, Result};
use crate::ingest::DEFAULT_MAX_DURATION_SECS;
use crate::score::{ScorerSettings, DEFAULT_MODEL_CACHE_DIR, DEFAULT_MODEL_NAME};
use crate::validate;

pub const CONFIG_ENV: &str = "DEEPFAKE_CONFIG";
pub const LOCAL_CONFIG_FILE: &str = "deepfake-detector.toml";
const HOME_CONFIG_DIR: &str = ".deepfake-detector";
const HOME_CONFIG_FILE: &str = "config.toml";

const DEFAULT_NUM_FRAMES: usize = 30;
const DEFAULT_SAMPLE_RATE: usize = 10;
const DEFAULT_MIN_FACE_CONFIDENCE: f32 = 0.5;
const DEFAULT_DEVICE: &str = "auto";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    device: Option<String>,
    model_cache_dir: Option<PathBuf>,
    detection: Option<DetectionConfigFile>,
    video: Option<VideoConfigFile>,
    output: Option<OutputConfigFile>,
    logging: Option<LoggingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    model: Option<String>,
    confidence_threshold: Option<f64>,
    num_frames: Option<usize>,
    sample_rate: Option<usize>,
    face_model: Option<PathBuf>,
    face_detector: Option<DetectorKind>,
    face_cascade: Option<PathBuf>,
    min_face_confidence: Option<f32>,
    face_padding: Option<f32>,
    select_primary: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    max_duration_secs: Option<u64>,
    frame_size: Option<[u32; 2]>,
    supported_formats: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    format: Option<OutputFormat>,
    include_reasoning: Option<bool>,
    save_crops_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggingConfigFile {
    level: Option<String>,
    file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Both,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Both => "both",
        }
    }

    pub fn includes_text(&self) -> bool {
        matches!(self, OutputFormat::Text | OutputFormat::Both)
    }

    pub fn includes_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

impl FromStr for OutputFormat {
    type Err = DetectorError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "both" => Ok(OutputFormat::Both),
            other => Err(DetectorError::validation(format!(
                "invalid output format: {other}. Use 'text', 'json', or 'both'"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionSettings {
    pub model: String,
    pub confidence_threshold: f64,
    pub num_frames: usize,
    pub sample_rate: usize,
    pub face_model: Option<PathBuf>,
    pub face_detector: DetectorKind,
    pub face_cascade: Option<PathBuf>,
    pub min_face_confidence: f32,
    pub face_padding: f32,
    pub select_primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoSettings {
    pub max_duration_secs: u64,
    pub frame_size: [u32; 2],
    pub supported_formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub include_reasoning: bool,
    pub save_crops_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Effective configuration for one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub device: String,
    pub model_cache_dir: PathBuf,
    pub detection: DetectionSettings,
    pub video: VideoSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Config {
    /// Resolve the config file, layer environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let source = resolve_config_path(explicit)?;
        let file_cfg = match source.as_deref() {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.source = source;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let video = file.video.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let logging = file.logging.unwrap_or_default();

        Self {
            device: file.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            model_cache_dir: file
                .model_cache_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_CACHE_DIR)),
            detection: DetectionSettings {
                model: detection
                    .model
                    .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                num_frames: detection.num_frames.unwrap_or(DEFAULT_NUM_FRAMES),
                sample_rate: detection.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
                face_model: detection.face_model,
                face_detector: detection.face_detector.unwrap_or_default(),
                face_cascade: detection.face_cascade,
                min_face_confidence: detection
                    .min_face_confidence
                    .unwrap_or(DEFAULT_MIN_FACE_CONFIDENCE),
                face_padding: detection.face_padding.unwrap_or(DEFAULT_FACE_PADDING),
                select_primary: detection.select_primary.unwrap_or(true),
            },
            video: VideoSettings {
                max_duration_secs: video.max_duration_secs.unwrap_or(DEFAULT_MAX_DURATION_SECS),
                frame_size: video
                    .frame_size
                    .unwrap_or([DEFAULT_TARGET_SIZE.0, DEFAULT_TARGET_SIZE.1]),
                supported_formats: video.supported_formats.unwrap_or_else(|| {
                    validate::SUPPORTED_FORMATS
                        .iter()
                        .map(|f| f.to_string())
                        .collect()
                }),
            },
            output: OutputSettings {
                format: output.format.unwrap_or_default(),
                include_reasoning: output.include_reasoning.unwrap_or(true),
                save_crops_dir: output.save_crops_dir,
            },
            logging: LoggingSettings {
                level: logging
                    .level
                    .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
                file: logging.file,
            },
            source: None,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(model) = env_string("DEEPFAKE_MODEL") {
            self.detection.model = model;
        }
        if let Some(threshold) = env_parse::<f64>("DEEPFAKE_CONFIDENCE_THRESHOLD")? {
            self.detection.confidence_threshold = threshold;
        }
        if let Some(num_frames) = env_parse::<usize>("DEEPFAKE_NUM_FRAMES")? {
            self.detection.num_frames = num_frames;
        }
        if let Some(sample_rate) = env_parse::<usize>("DEEPFAKE_FRAME_SAMPLE_RATE")? {
            self.detection.sample_rate = sample_rate;
        }
        if let Some(seconds) = env_parse::<u64>("DEEPFAKE_MAX_VIDEO_DURATION")? {
            self.video.max_duration_secs = seconds;
        }
        if let Some(format) = env_string("DEEPFAKE_OUTPUT_FORMAT") {
            self.output.format = format
                .parse()
                .map_err(|e| DetectorError::config(format!("DEEPFAKE_OUTPUT_FORMAT: {e}")))?;
        }
        if let Some(verbose) = env_string("DEEPFAKE_VERBOSE_OUTPUT") {
            self.output.include_reasoning = parse_bool(&verbose).ok_or_else(|| {
                DetectorError::config("DEEPFAKE_VERBOSE_OUTPUT must be true or false")
            })?;
        }
        if let Some(level) = env_string("DEEPFAKE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(file) = env_string("DEEPFAKE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(device) = env_string("DEEPFAKE_DEVICE") {
            self.device = device;
        }
        if let Some(detector) = env_string("DEEPFAKE_FACE_DETECTOR") {
            self.detection.face_detector = detector
                .parse()
                .map_err(|e| DetectorError::config(format!("DEEPFAKE_FACE_DETECTOR: {e}")))?;
        }
        if let Some(dir) = env_string("DEEPFAKE_MODEL_CACHE_DIR") {
            self.model_cache_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check ranges and normalise case-insensitive fields.
    pub fn validate(&mut self) -> Result<()> {
        validate::validate_threshold(self.detection.confidence_threshold)?;
        validate::validate_num_frames(self.detection.num_frames)?;
        if self.detection.sample_rate == 0 {
            return Err(DetectorError::config("sample_rate must be at least 1"));
        }
        if self.detection.model.trim().is_empty() {
            return Err(DetectorError::config("model name must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.detection.face_padding) {
            return Err(DetectorError::config(format!(
                "face_padding must be between 0.0 and 1.0, got: {}",
                self.detection.face_padding
            )));
        }
        if !(0.0..=1.0).contains(&self.detection.min_face_confidence) {
            return Err(DetectorError::config(format!(
                "min_face_confidence must be between 0.0 and 1.0, got: {}",
                self.detection.min_face_confidence
            )));
        }
        if self.video.max_duration_secs == 0 {
            return Err(DetectorError::config(
                "max_duration_secs must be greater than zero",
            ));
        }
        if self.video.frame_size.contains(&0) {
            return Err(DetectorError::config("frame_size must be non-zero"));
        }
        self.video.supported_formats = self
            .video
            .supported_formats
            .iter()
            .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        if self.video.supported_formats.is_empty() {
            return Err(DetectorError::config(
                "supported_formats must list at least one extension",
            ));
        }
        self.device = validate::validate_device(&self.device)?;

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(DetectorError::config(format!(
                "invalid log level: {}. Use one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        self.logging.level = level;
        Ok(())
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.video.frame_size[0], self.video.frame_size[1])
    }

    pub fn locator_settings(&self) -> LocatorSettings {
        LocatorSettings {
            face_model: self.detection.face_model.clone(),
            detector: self.detection.face_detector,
            face_cascade: self.detection.face_cascade.clone(),
            face_model_input: DEFAULT_FACE_MODEL_INPUT,
            min_confidence: self.detection.min_face_confidence,
            target_size: self.target_size(),
            padding: self.detection.face_padding,
            ..LocatorSettings::default()
        }
    }

    pub fn scorer_settings(&self) -> ScorerSettings {
        ScorerSettings {
            model: self.detection.model.clone(),
            model_cache_dir: self.model_cache_dir.clone(),
            device: self.device.clone(),
            input_size: self.target_size(),
        }
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DetectorError::config(format!("failed to render configuration: {e}")))
    }
}

/// Config file to read: explicit path, then `DEEPFAKE_CONFIG`, then
/// `./deepfake-detector.toml`, then `$HOME/.deepfake-detector/config.toml`.
/// Explicitly named files must exist; discovered ones are optional.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_string(CONFIG_ENV).map(PathBuf::from));
    if let Some(path) = named {
        if !path.is_file() {
            return Err(DetectorError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(Some(local));
    }
    if let Some(home) = env_string("HOME") {
        let user = PathBuf::from(home).join(HOME_CONFIG_DIR).join(HOME_CONFIG_FILE);
        if user.is_file() {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        DetectorError::config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    } else {
        toml::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        DetectorError::config(format!("invalid config file {}: {}", path.display(), e))
    })
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| DetectorError::config(format!("{key} has an invalid value: {value}"))),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.detection.model, "vit-deepfake");
        assert_eq!(cfg.detection.confidence_threshold, 0.5);
        assert_eq!(cfg.detection.num_frames, 30);
        assert_eq!(cfg.detection.sample_rate, 10);
        assert_eq!(cfg.video.max_duration_secs, 300);
        assert_eq!(cfg.video.frame_size, [224, 224]);
        assert_eq!(cfg.output.format, OutputFormat::Text);
        assert!(cfg.output.include_reasoning);
        assert_eq!(cfg.device, "auto");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let mut cfg = Config::default();
        cfg.detection.confidence_threshold = 1.2;
        assert!(matches!(
            cfg.validate(),
            Err(DetectorError::ThresholdOutOfRange(_))
        ));

        let mut cfg = Config::default();
        cfg.detection.num_frames = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.detection.face_padding = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.device = "tpu".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.logging.level = "loud".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_normalises_case() {
        let mut cfg = Config::default();
        cfg.device = "CUDA:0".to_string();
        cfg.logging.level = "DEBUG".to_string();
        cfg.video.supported_formats = vec![".MP4".to_string(), "webm".to_string()];
        cfg.validate().unwrap();
        assert_eq!(cfg.device, "cuda:0");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.video.supported_formats, vec!["mp4", "webm"]);
    }

    #[test]
    fn settings_bridge_to_stages() {
        let mut cfg = Config::default();
        cfg.video.frame_size = [128, 96];
        cfg.detection.face_padding = 0.1;
        let locator = cfg.locator_settings();
        assert_eq!(locator.target_size, (128, 96));
        assert_eq!(locator.padding, 0.1);
        let scorer = cfg.scorer_settings();
        assert_eq!(scorer.input_size, (128, 96));
        assert_eq!(scorer.model, "vit-deepfake");
    }

    #[test]
    fn renders_as_toml() {
        let rendered = Config::default().to_toml_string().unwrap();
        assert!(rendered.contains("[detection]"));
        assert!(rendered.contains("model = \"vit-deepfake\""));
        assert!(rendered.contains("format = \"text\""));
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
