use std::sync::Mutex;

use tempfile::{tempdir, NamedTempFile};

use deepfake_detector::config::{Config, OutputFormat};
use deepfake_detector::detect::DetectorKind;
use deepfake_detector::{DetectorError, ErrorCategory};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DEEPFAKE_CONFIG",
        "DEEPFAKE_MODEL",
        "DEEPFAKE_CONFIDENCE_THRESHOLD",
        "DEEPFAKE_NUM_FRAMES",
        "DEEPFAKE_FRAME_SAMPLE_RATE",
        "DEEPFAKE_MAX_VIDEO_DURATION",
        "DEEPFAKE_OUTPUT_FORMAT",
        "DEEPFAKE_VERBOSE_OUTPUT",
        "DEEPFAKE_LOG_LEVEL",
        "DEEPFAKE_LOG_FILE",
        "DEEPFAKE_DEVICE",
        "DEEPFAKE_MODEL_CACHE_DIR",
        "DEEPFAKE_FACE_DETECTOR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
device = "cpu"
model_cache_dir = "/opt/models"

[detection]
model = "heuristic"
face_detector = "haar"
face_cascade = "/opt/cascades/frontalface.xml"
confidence_threshold = 0.65
num_frames = 12
face_padding = 0.3
select_primary = false

[video]
max_duration_secs = 60
frame_size = [160, 160]

[output]
format = "both"
include_reasoning = false

[logging]
level = "warn"
"#,
    );

    std::env::set_var("DEEPFAKE_CONFIG", file.path());
    std::env::set_var("DEEPFAKE_NUM_FRAMES", "20");
    std::env::set_var("DEEPFAKE_DEVICE", "CUDA:1");

    let cfg = Config::load(None).expect("load config");
    assert_eq!(cfg.source.as_deref(), Some(file.path()));
    assert_eq!(cfg.detection.model, "heuristic");
    assert_eq!(cfg.detection.face_detector, DetectorKind::Haar);
    assert_eq!(
        cfg.locator_settings().face_cascade.as_deref(),
        Some(std::path::Path::new("/opt/cascades/frontalface.xml"))
    );
    assert_eq!(cfg.detection.confidence_threshold, 0.65);
    assert_eq!(cfg.detection.num_frames, 20);
    assert_eq!(cfg.detection.face_padding, 0.3);
    assert!(!cfg.detection.select_primary);
    assert_eq!(cfg.video.max_duration_secs, 60);
    assert_eq!(cfg.video.frame_size, [160, 160]);
    assert_eq!(cfg.output.format, OutputFormat::Both);
    assert!(!cfg.output.include_reasoning);
    assert_eq!(cfg.logging.level, "warn");
    assert_eq!(cfg.device, "cuda:1");
    assert_eq!(cfg.model_cache_dir, std::path::PathBuf::from("/opt/models"));

    clear_env();
}

#[test]
fn explicit_json_file_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = write_config(".toml", "[detection]\nmodel = \"from-env\"\n");
    let explicit = write_config(".json", r#"{"detection": {"model": "from-flag"}}"#);
    std::env::set_var("DEEPFAKE_CONFIG", env_file.path());

    let cfg = Config::load(Some(explicit.path())).expect("load config");
    assert_eq!(cfg.detection.model, "from-flag");

    clear_env();
}

#[test]
fn defaults_apply_without_any_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let home = tempdir().unwrap();
    let previous_home = std::env::var_os("HOME");
    std::env::set_var("HOME", home.path());

    let cfg = Config::load(None).expect("load defaults");
    assert!(cfg.source.is_none());
    assert_eq!(cfg.detection.num_frames, 30);
    assert_eq!(cfg.output.format, OutputFormat::Text);

    match previous_home {
        Some(value) => std::env::set_var("HOME", value),
        None => std::env::remove_var("HOME"),
    }
}

#[test]
fn env_overrides_cover_output_and_logging() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config(".toml", "");
    std::env::set_var("DEEPFAKE_CONFIG", file.path());
    std::env::set_var("DEEPFAKE_OUTPUT_FORMAT", "JSON");
    std::env::set_var("DEEPFAKE_VERBOSE_OUTPUT", "false");
    std::env::set_var("DEEPFAKE_LOG_LEVEL", "debug");
    std::env::set_var("DEEPFAKE_FRAME_SAMPLE_RATE", "5");
    std::env::set_var("DEEPFAKE_MAX_VIDEO_DURATION", "90");
    std::env::set_var("DEEPFAKE_CONFIDENCE_THRESHOLD", "0.7");
    std::env::set_var("DEEPFAKE_FACE_DETECTOR", "Haar");

    let cfg = Config::load(None).expect("load config");
    assert_eq!(cfg.detection.face_detector, DetectorKind::Haar);
    assert_eq!(cfg.output.format, OutputFormat::Json);
    assert!(!cfg.output.include_reasoning);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.detection.sample_rate, 5);
    assert_eq!(cfg.video.max_duration_secs, 90);
    assert_eq!(cfg.detection.confidence_threshold, 0.7);

    clear_env();
}

#[test]
fn invalid_env_number_is_an_input_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config(".toml", "");
    std::env::set_var("DEEPFAKE_CONFIG", file.path());
    std::env::set_var("DEEPFAKE_NUM_FRAMES", "lots");

    let err = Config::load(None).unwrap_err();
    assert!(matches!(err, DetectorError::Config(_)));
    assert_eq!(err.category(), ErrorCategory::Input);
    assert_eq!(err.exit_code(), 1);

    clear_env();
}

#[test]
fn out_of_range_file_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".toml", "[detection]\nconfidence_threshold = 1.5\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, DetectorError::ThresholdOutOfRange(_)));

    let file = write_config(".toml", "[detection]\nnum_frames = 5000\n");
    assert!(Config::load(Some(file.path())).is_err());

    let file = write_config(".toml", "[output]\nformat = \"xml\"\n");
    assert!(Config::load(Some(file.path())).is_err());

    let file = write_config(".toml", "[detection]\nunknown_key = 1\n");
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
fn missing_explicit_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("config file not found"));
}
