//! deepfake-detector - analyze a video file for AI-manipulated faces
//!
//! Exit codes: 0 on success, 1 for input errors (missing file, unsupported
//! format, bad configuration), 2 for processing errors.

use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use deepfake_detector::report::{render_json, render_text, video_fingerprint};
use deepfake_detector::validate::validate_video_path;
use deepfake_detector::{Analyzer, Config, DetectorError, ErrorCategory, OutputFormat, Result};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "deepfake-detector", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a video for deepfake content.
    Analyze(AnalyzeArgs),
    /// Validate or show the effective configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Path to the video file to analyze.
    video: String,
    /// Confidence threshold for a FAKE verdict (0.0-1.0).
    #[arg(short = 't', long)]
    threshold: Option<f64>,
    /// Number of frames to sample.
    #[arg(short = 'n', long)]
    num_frames: Option<usize>,
    /// Compute device (cpu|cuda|cuda:N|auto).
    #[arg(short = 'd', long)]
    device: Option<String>,
    /// Output format (text|json|both).
    #[arg(short = 'o', long = "output", value_name = "FORMAT")]
    output_format: Option<String>,
    /// Output results as JSON (shorthand for -o json).
    #[arg(long)]
    json: bool,
    /// Enable debug logging.
    #[arg(short = 'v', long)]
    verbose: bool,
    /// Path to a configuration file.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// Directory to write the scored face crops into.
    #[arg(long, value_name = "DIR")]
    save_crops: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty|quiet)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Check that the configuration loads and validates.
    #[arg(long)]
    validate: bool,
    /// Print the effective configuration as TOML.
    #[arg(long)]
    show: bool,
    /// Path to a configuration file.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Config(args) => config_cmd(args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let label = match err.category() {
                ErrorCategory::Input => "Input error",
                ErrorCategory::Processing => "Processing error",
            };
            log::debug!("exiting after {label}: {err:?}");
            eprintln!("{label}: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let mut cfg = Config::load(args.config.as_deref())?;
    let level = if args.verbose {
        "debug"
    } else {
        cfg.logging.level.as_str()
    };
    init_logging(level, cfg.logging.file.as_deref())?;

    if let Some(threshold) = args.threshold {
        cfg.detection.confidence_threshold = threshold;
    }
    if let Some(num_frames) = args.num_frames {
        cfg.detection.num_frames = num_frames;
    }
    if let Some(device) = args.device {
        cfg.device = device;
    }
    if let Some(format) = args.output_format.as_deref() {
        cfg.output.format = format.parse()?;
    }
    if args.json {
        cfg.output.format = OutputFormat::Json;
    }
    if args.save_crops.is_some() {
        cfg.output.save_crops_dir = args.save_crops;
    }
    cfg.validate()?;
    validate_video_path(&args.video, &cfg.video.supported_formats)?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    if cfg.output.format == OutputFormat::Text {
        println!("DeepFake Video Detector v{}", env!("CARGO_PKG_VERSION"));
        println!("Analyzing: {}", args.video);
    }

    let mut analyzer = {
        let _stage = ui.stage("Prepare detector");
        Analyzer::from_config(&cfg)?
    };
    let mut observer = ui.observer();
    let report = analyzer.analyze(&args.video, &mut observer)?;
    drop(observer);

    if cfg.output.format.includes_text() {
        println!("{}", render_text(&report, cfg.output.include_reasoning));
    }
    if cfg.output.format.includes_json() {
        let fingerprint = video_fingerprint(&args.video);
        println!(
            "{}",
            render_json(&report, cfg.output.include_reasoning, fingerprint)?
        );
    }
    Ok(())
}

fn config_cmd(args: ConfigArgs) -> Result<()> {
    let cfg = Config::load(args.config.as_deref())?;
    init_logging(&cfg.logging.level, cfg.logging.file.as_deref())?;

    if args.validate || !args.show {
        match &cfg.source {
            Some(path) => println!("Configuration is valid ({}).", path.display()),
            None => println!("Configuration is valid (built-in defaults)."),
        }
    }
    if args.show {
        println!("{}", cfg.to_toml_string()?);
    }
    Ok(())
}

fn init_logging(level: &str, file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                DetectorError::config(format!("cannot open log file {}: {}", path.display(), e))
            })?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    // A logger may already be installed when running under a test harness.
    let _ = builder.try_init();
    Ok(())
}
