//! Pipeline tunables.
//!
//! Defaults mirror the production service limits: poll every 2s for at
//! most 150 attempts (5 minutes), 60s per download, three retries at
//! 2s/4s/6s. Tests shrink these to milliseconds.

use std::path::PathBuf;
use std::time::Duration;

use vidchain_core::image_prep::PreprocessConfig;
use vidchain_core::retry::RetryPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 150;
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when the two transition frames have different dimensions
/// after preprocessing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameMismatchPolicy {
    /// Log a warning and submit anyway.
    #[default]
    Warn,
    /// Fail the request with a validation error.
    Reject,
}

impl FrameMismatchPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Settings for [`GenerationEngine`](crate::engine::GenerationEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory downloaded clips are written to.
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub download_timeout: Duration,
    /// Retry schedule for transient submission failures.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Upper bound on time spent polling one job.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_poll_attempts)
    }
}

/// Everything the worker needs to assemble a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub preprocess: PreprocessConfig,
    pub frame_mismatch: FrameMismatchPolicy,
    pub frames_dir: PathBuf,
    pub merged_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            preprocess: PreprocessConfig::default(),
            frame_mismatch: FrameMismatchPolicy::default(),
            frames_dir: PathBuf::from("outputs/frames"),
            merged_dir: PathBuf::from("outputs/merged"),
        }
    }
}
