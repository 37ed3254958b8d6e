//! Still frames from finished clips.
//!
//! Tool availability is checked once and cached, so the orchestrator can
//! refuse a chained sequence up front instead of failing mid-way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use vidchain_core::ffmpeg::{last_frame_timestamp, FfmpegError, VideoInfo};
use vidchain_core::naming;

use crate::media::MediaToolkit;

/// Thumbnail bounding box.
pub const THUMBNAIL_WIDTH: u32 = 320;
pub const THUMBNAIL_HEIGHT: u32 = 180;
/// Default thumbnail position.
pub const THUMBNAIL_AT_SECS: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("ffmpeg/ffprobe is not available")]
    Unavailable,

    #[error("source video not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("invalid timestamp {0}s")]
    InvalidTimestamp(f64),

    #[error(transparent)]
    Tool(#[from] FfmpegError),
}

pub struct FrameExtractor {
    toolkit: Arc<dyn MediaToolkit>,
    frames_dir: PathBuf,
    available: OnceCell<bool>,
}

impl FrameExtractor {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, frames_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolkit,
            frames_dir: frames_dir.into(),
            available: OnceCell::new(),
        }
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    /// Whether the media tool can run. Probed on first call only.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                match self.toolkit.check_available().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "ffmpeg unavailable, scene chaining disabled");
                        false
                    }
                }
            })
            .await
    }

    async fn ensure_ready(&self, video: &Path) -> Result<(), ExtractionError> {
        if !self.is_available().await {
            return Err(ExtractionError::Unavailable);
        }
        if !video.is_file() {
            return Err(ExtractionError::SourceMissing(video.to_path_buf()));
        }
        Ok(())
    }

    pub async fn probe(&self, video: &Path) -> Result<VideoInfo, ExtractionError> {
        self.ensure_ready(video).await?;
        Ok(self.toolkit.probe(video).await?)
    }

    /// Extract the frame 0.1s before the end of `video` as
    /// `scene_{label}_last_frame.jpg`.
    pub async fn extract_last_frame(
        &self,
        video: &Path,
        label: &str,
    ) -> Result<PathBuf, ExtractionError> {
        self.ensure_ready(video).await?;
        let info = self.toolkit.probe(video).await?;
        let timestamp = last_frame_timestamp(info.duration_secs);
        let output = self.frames_dir.join(naming::last_frame_filename(label));

        self.toolkit.extract_frame(video, &output, timestamp).await?;
        tracing::debug!(
            video = %video.display(),
            output = %output.display(),
            timestamp,
            "Extracted last frame"
        );
        Ok(output)
    }

    /// Extract the frame at `timestamp_secs` as `frame_{label}_{ts}s.jpg`.
    pub async fn extract_frame_at(
        &self,
        video: &Path,
        timestamp_secs: f64,
        label: &str,
    ) -> Result<PathBuf, ExtractionError> {
        if !timestamp_secs.is_finite() || timestamp_secs < 0.0 {
            return Err(ExtractionError::InvalidTimestamp(timestamp_secs));
        }
        self.ensure_ready(video).await?;
        let output = self
            .frames_dir
            .join(naming::frame_at_filename(label, timestamp_secs));
        self.toolkit
            .extract_frame(video, &output, timestamp_secs)
            .await?;
        Ok(output)
    }

    /// Extract a frame (default 1s in) scaled to fit 320x180.
    pub async fn generate_thumbnail(
        &self,
        video: &Path,
        at_secs: Option<f64>,
        label: &str,
    ) -> Result<PathBuf, ExtractionError> {
        let at = at_secs.unwrap_or(THUMBNAIL_AT_SECS);
        if !at.is_finite() || at < 0.0 {
            return Err(ExtractionError::InvalidTimestamp(at));
        }
        self.ensure_ready(video).await?;
        let output = self.frames_dir.join(naming::thumbnail_filename(label));
        self.toolkit
            .extract_thumbnail(video, &output, at, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
            .await?;
        Ok(output)
    }
}
