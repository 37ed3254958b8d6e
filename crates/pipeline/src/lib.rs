//! Generation pipeline: engine, generators, frame extraction, scene
//! chaining and merging.
//!
//! Flow for one request: generator -> [`engine::GenerationEngine`]
//! (submit, poll, download) -> store updates. For a project:
//! [`orchestrator::SceneChainOrchestrator`] drives the generators scene by
//! scene, calling the [`extractor::FrameExtractor`] between chained scenes,
//! and [`merger::Merger`] concatenates the finished clips.

pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod image;
pub mod media;
pub mod merger;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod text;

pub use config::{EngineConfig, FrameMismatchPolicy, PipelineConfig};
pub use engine::{GenerationEngine, JobHandle, JobOutcome, RunContext};
pub use error::GenerationError;
pub use extractor::{ExtractionError, FrameExtractor};
pub use image::ImageGenerator;
pub use media::{FfmpegToolkit, MediaToolkit};
pub use merger::{MergeError, MergeResult, Merger};
pub use orchestrator::{OrchestratorError, SceneChainOrchestrator, SceneOutcome};
pub use progress::{ProgressSink, SequenceProgress, SequenceStage};
pub use text::TextGenerator;
