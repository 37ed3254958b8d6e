use std::path::PathBuf;
use std::time::Duration;

use vidchain_core::image_prep::PreprocessConfig;
use vidchain_core::models::DEFAULT_MODEL;
use vidchain_core::retry::RetryPolicy;
use vidchain_pipeline::{EngineConfig, FrameMismatchPolicy, PipelineConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected} (got {value:?})")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Worker configuration loaded from environment variables.
///
/// Every field has a default suitable for local development; only
/// `DATABASE_URL` switches behavior (Postgres instead of the in-memory
/// store).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// `None` keeps job and scene records in memory.
    pub database_url: Option<String>,
    pub output_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub merged_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub download_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Per-request timeout for calls to the generation service.
    pub request_timeout: Duration,
    pub frame_mismatch: FrameMismatchPolicy,
    pub default_model: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `GEN_API_URL`           | `http://localhost:8080/v1` |
    /// | `GEN_API_KEY`           | unset                      |
    /// | `DATABASE_URL`          | unset (in-memory store)    |
    /// | `OUTPUT_DIR`            | `outputs`                  |
    /// | `FRAMES_DIR`            | `outputs/frames`           |
    /// | `MERGED_DIR`            | `outputs/merged`           |
    /// | `POLL_INTERVAL_SECS`    | `2`                        |
    /// | `MAX_POLL_ATTEMPTS`     | `150`                      |
    /// | `DOWNLOAD_TIMEOUT_SECS` | `60`                       |
    /// | `MAX_RETRIES`           | `3`                        |
    /// | `RETRY_DELAY_SECS`      | `2`                        |
    /// | `REQUEST_TIMEOUT_SECS`  | `300`                      |
    /// | `FRAME_MISMATCH_POLICY` | `warn`                     |
    /// | `DEFAULT_MODEL`         | `veo-2.0`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let frame_mismatch = match var("FRAME_MISMATCH_POLICY") {
            None => FrameMismatchPolicy::default(),
            Some(value) => {
                FrameMismatchPolicy::parse(&value).ok_or(ConfigError::Invalid {
                    key: "FRAME_MISMATCH_POLICY",
                    value,
                    expected: "`warn` or `reject`",
                })?
            }
        };

        Ok(Self {
            api_url: text("GEN_API_URL", "http://localhost:8080/v1"),
            api_key: var("GEN_API_KEY"),
            database_url: var("DATABASE_URL"),
            output_dir: PathBuf::from(text("OUTPUT_DIR", "outputs")),
            frames_dir: PathBuf::from(text("FRAMES_DIR", "outputs/frames")),
            merged_dir: PathBuf::from(text("MERGED_DIR", "outputs/merged")),
            poll_interval: Duration::from_secs(number(&var, "POLL_INTERVAL_SECS", 2)?),
            max_poll_attempts: number(&var, "MAX_POLL_ATTEMPTS", 150)?,
            download_timeout: Duration::from_secs(number(&var, "DOWNLOAD_TIMEOUT_SECS", 60)?),
            max_retries: number(&var, "MAX_RETRIES", 3)?,
            retry_delay: Duration::from_secs(number(&var, "RETRY_DELAY_SECS", 2)?),
            request_timeout: Duration::from_secs(number(&var, "REQUEST_TIMEOUT_SECS", 300)?),
            frame_mismatch,
            default_model: text("DEFAULT_MODEL", DEFAULT_MODEL),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            output_dir: self.output_dir.clone(),
            poll_interval: self.poll_interval,
            max_poll_attempts: self.max_poll_attempts,
            download_timeout: self.download_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: self.retry_delay,
            },
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            engine: self.engine_config(),
            preprocess: PreprocessConfig::default(),
            frame_mismatch: self.frame_mismatch,
            frames_dir: self.frames_dir.clone(),
            merged_dir: self.merged_dir.clone(),
        }
    }
}

fn number<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected: "a non-negative integer",
        }),
    }
}
