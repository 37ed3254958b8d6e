//! The external media tool seam.
//!
//! The extractor and merger talk to ffmpeg only through [`MediaToolkit`],
//! so tests can swap in a fake that writes files without spawning
//! processes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vidchain_core::ffmpeg::{self, FfmpegError, VideoInfo};

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Succeeds only if both the encoder and the probe tool run.
    async fn check_available(&self) -> Result<(), FfmpegError>;

    async fn probe(&self, video: &Path) -> Result<VideoInfo, FfmpegError>;

    /// Write one full-size JPEG frame taken at `timestamp_secs`.
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
    ) -> Result<(), FfmpegError>;

    /// Write one frame scaled to fit inside `max_width` x `max_height`.
    async fn extract_thumbnail(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<(), FfmpegError>;

    /// Concatenate `inputs` in order with stream copy, using `list_path`
    /// as the scratch list file.
    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output: &Path,
    ) -> Result<(), FfmpegError>;
}

/// [`MediaToolkit`] backed by the `ffmpeg` and `ffprobe` binaries on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegToolkit;

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn check_available(&self) -> Result<(), FfmpegError> {
        ffmpeg::check_available().await
    }

    async fn probe(&self, video: &Path) -> Result<VideoInfo, FfmpegError> {
        ffmpeg::probe_info(video).await
    }

    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
    ) -> Result<(), FfmpegError> {
        ffmpeg::extract_frame(video, output, timestamp_secs).await
    }

    async fn extract_thumbnail(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<(), FfmpegError> {
        ffmpeg::extract_scaled_frame(video, output, timestamp_secs, max_width, max_height).await
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        ffmpeg::concat_videos(inputs, list_path, output).await
    }
}
