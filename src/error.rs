//! Error types for the analysis pipeline.
//!
//! Errors fall into two categories:
//! - Input errors: the request itself is unusable (missing file, bad format,
//!   out-of-range configuration).
//! - Processing errors: the request was valid but a stage could not run
//!   (decoder open failure, face detector initialization failure).
//!
//! Per-item anomalies (one frame failing to decode, an empty crop, no faces at
//! all) are never raised. They are logged and absorbed by the stage that sees
//! them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Broad class of a [`DetectorError`], used to pick a process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Processing,
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("video file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to open video '{path}': {reason}")]
    Open { path: String, reason: String },

    #[error("no video loaded; call load() first")]
    NotLoaded,

    #[error("{0}")]
    Validation(String),

    #[error("unsupported video format: {extension}. Supported formats: {supported}")]
    UnsupportedFormat { extension: String, supported: String },

    #[error("threshold must be between 0.0 and 1.0, got: {0}")]
    ThresholdOutOfRange(f64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("face detector initialization failed: {0}")]
    DetectorInit(String),

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("frame {index} could not be decoded: {reason}")]
    Decode { index: u64, reason: String },

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectorError {
    pub fn open(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn detector_init(reason: impl std::fmt::Display) -> Self {
        Self::DetectorInit(reason.to_string())
    }

    pub fn detection(reason: impl std::fmt::Display) -> Self {
        Self::Detection(reason.to_string())
    }

    pub fn decode(index: u64, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            index,
            reason: reason.to_string(),
        }
    }

    pub fn classifier(reason: impl std::fmt::Display) -> Self {
        Self::Classifier(reason.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_)
            | Self::Validation(_)
            | Self::UnsupportedFormat { .. }
            | Self::ThresholdOutOfRange(_)
            | Self::Config(_) => ErrorCategory::Input,
            Self::Open { .. }
            | Self::NotLoaded
            | Self::DetectorInit(_)
            | Self::Detection(_)
            | Self::Decode { .. }
            | Self::Classifier(_)
            | Self::Io(_) => ErrorCategory::Processing,
        }
    }

    /// Process exit code for this error: 1 for input errors, 2 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Input => 1,
            ErrorCategory::Processing => 2,
        }
    }
}
