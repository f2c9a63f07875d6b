//! Deepfake video detector
//!
//! Offline, single-shot analysis of a video file. A handful of frames are
//! sampled, the primary face in each is located and cropped, every crop gets a
//! manipulation score, and the scores are aggregated into an explainable
//! verdict.
//!
//! # Pipeline
//!
//! `FrameSource → FaceLocator → FaceScorer → ResultAggregator`
//!
//! The stages form a strict line with no feedback. `Analyzer` wires them
//! together from a `Config` and reports progress through a `PipelineObserver`.
//!
//! # Module Structure
//!
//! - `ingest`: decoders (synthetic `stub://`, FFmpeg) and frame sampling
//! - `detect`: face detection backends, cropping, primary-face selection
//! - `score`: classifier-backed or heuristic per-face scoring
//! - `aggregate`: verdict, confidence, and named evidence indicators
//! - `pipeline`: the end-to-end `Analyzer`
//! - `report`: text and JSON renderings
//! - `config`, `validate`, `error`: ambient configuration and input checks
//!
//! The library never installs a logger. It emits through the `log` facade and
//! leaves setup to the binary.

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod validate;

pub use aggregate::{
    AggregatedResult, DetectionIndicator, FrameResult, IndicatorKind, ResultAggregator, Verdict,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use config::{Config, OutputFormat};
pub use detect::{BoundingBox, FaceCrop, FaceDetectorBackend, FaceLocator, LocatorSettings};
pub use error::{DetectorError, ErrorCategory, Result};
pub use frame::{Frame, VideoInfo};
pub use ingest::{open_decoder, FrameSource, VideoDecoder};
pub use pipeline::{AnalysisReport, Analyzer, NoopObserver, PipelineEvent, PipelineObserver, Stage};
pub use score::{Classifier, FaceScorer, HeuristicScorer, LabelProbability, ScorerSettings};
