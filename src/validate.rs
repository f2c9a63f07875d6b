//! Validators for user-supplied analysis inputs.

use std::path::{Path, PathBuf};

use crate::config::OutputFormat;
use crate::error::{DetectorError, Result};
use crate::ingest::SYNTHETIC_SCHEME;

pub const SUPPORTED_FORMATS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];
pub const MAX_NUM_FRAMES: usize = 1000;
/// Files above this size are accepted with a warning.
pub const LARGE_FILE_WARNING_BYTES: u64 = 500 * 1024 * 1024;

/// Lower-cased file extension of `path`, if any.
pub fn video_format(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Check that `path` names an existing file with a supported container
/// extension. Synthetic `stub://` sources skip the filesystem checks.
pub fn validate_video_path<S: AsRef<str>>(path: &str, supported: &[S]) -> Result<PathBuf> {
    if path.starts_with(SYNTHETIC_SCHEME) {
        return Ok(PathBuf::from(path));
    }
    let candidate = PathBuf::from(path);
    if !candidate.exists() {
        return Err(DetectorError::NotFound(candidate));
    }
    if !candidate.is_file() {
        return Err(DetectorError::validation(format!(
            "path is not a file: {}",
            candidate.display()
        )));
    }

    let extension = video_format(&candidate).unwrap_or_default();
    if !supported
        .iter()
        .any(|format| format.as_ref().eq_ignore_ascii_case(&extension))
    {
        let list = supported
            .iter()
            .map(|format| format.as_ref())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(DetectorError::UnsupportedFormat {
            extension: if extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{extension}")
            },
            supported: list,
        });
    }

    let size = candidate.metadata()?.len();
    if size > LARGE_FILE_WARNING_BYTES {
        log::warn!(
            "Validate: large video file ({:.1} MB) may take a while to process",
            size as f64 / (1024.0 * 1024.0)
        );
    }
    Ok(candidate)
}

pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(DetectorError::ThresholdOutOfRange(threshold));
    }
    Ok(threshold)
}

pub fn validate_num_frames(num_frames: usize) -> Result<usize> {
    if num_frames == 0 {
        return Err(DetectorError::validation(
            "number of frames must be at least 1",
        ));
    }
    if num_frames > MAX_NUM_FRAMES {
        return Err(DetectorError::validation(format!(
            "number of frames cannot exceed {MAX_NUM_FRAMES}"
        )));
    }
    Ok(num_frames)
}

/// Accepts `cpu`, `cuda`, `cuda:N` and `auto` in any case; returns the
/// lower-cased form.
pub fn validate_device(device: &str) -> Result<String> {
    let device = device.trim().to_ascii_lowercase();
    let valid = match device.as_str() {
        "cpu" | "cuda" | "auto" => true,
        other => other
            .strip_prefix("cuda:")
            .map(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
    };
    if !valid {
        return Err(DetectorError::validation(format!(
            "invalid device: {device}. Use 'cpu', 'cuda', 'cuda:N', or 'auto'"
        )));
    }
    Ok(device)
}

pub fn validate_output_format(format: &str) -> Result<OutputFormat> {
    format.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_video_path("/definitely/not/here.mp4", &SUPPORTED_FORMATS).unwrap_err();
        assert!(matches!(err, DetectorError::NotFound(_)));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.MP4");
        fs::write(&path, b"not really a video").unwrap();
        let ok = validate_video_path(path.to_str().unwrap(), &SUPPORTED_FORMATS).unwrap();
        assert_eq!(ok, path);
        assert_eq!(video_format(&path).as_deref(), Some("mp4"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        let err = validate_video_path(path.to_str().unwrap(), &SUPPORTED_FORMATS).unwrap_err();
        match err {
            DetectorError::UnsupportedFormat { extension, supported } => {
                assert_eq!(extension, ".txt");
                assert!(supported.contains("webm"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn directory_is_not_a_video() {
        let dir = tempdir().unwrap();
        let err = validate_video_path(dir.path().to_str().unwrap(), &SUPPORTED_FORMATS).unwrap_err();
        assert!(matches!(err, DetectorError::Validation(_)));
    }

    #[test]
    fn synthetic_sources_bypass_filesystem() {
        let path = validate_video_path("stub://clip?frames=10", &SUPPORTED_FORMATS).unwrap();
        assert_eq!(path, PathBuf::from("stub://clip?frames=10"));
    }

    #[test]
    fn numeric_ranges() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_num_frames(1).is_ok());
        assert!(validate_num_frames(1000).is_ok());
        assert!(validate_num_frames(0).is_err());
        assert!(validate_num_frames(1001).is_err());
    }

    #[test]
    fn devices_are_normalised() {
        assert_eq!(validate_device("CPU").unwrap(), "cpu");
        assert_eq!(validate_device("cuda:1").unwrap(), "cuda:1");
        assert_eq!(validate_device("Auto").unwrap(), "auto");
        assert!(validate_device("cuda:").is_err());
        assert!(validate_device("tpu").is_err());
    }

    #[test]
    fn output_formats() {
        assert_eq!(validate_output_format("JSON").unwrap(), OutputFormat::Json);
        assert!(validate_output_format("xml").is_err());
    }
}
