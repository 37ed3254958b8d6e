//! FFmpeg/FFprobe command utilities.
//!
//! Shared by the frame extractor (single-frame grabs, thumbnails) and the
//! merger (probe + concat demuxer). Every invocation runs with
//! `kill_on_drop(true)` under a wall-clock limit so a wedged tool cannot
//! hold a sequence forever.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Wall-clock limit for one ffmpeg/ffprobe invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Offset from the end of a clip used for "last frame" extraction.
pub const LAST_FRAME_OFFSET_SECS: f64 = 0.1;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffprobe/ffmpeg timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

/// Summary of a video file used for chaining and merge compatibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

impl VideoInfo {
    pub fn from_probe(probe: &FfprobeOutput) -> Self {
        let (width, height) = parse_resolution(probe);
        Self {
            duration_secs: parse_duration(probe),
            width,
            height,
            fps: parse_framerate(probe),
            codec: parse_video_codec(probe),
        }
    }

    /// Timestamp of the frame treated as the clip's last frame.
    pub fn last_frame_timestamp(&self) -> f64 {
        last_frame_timestamp(self.duration_secs)
    }
}

/// `max(0, duration - 0.1)`.
pub fn last_frame_timestamp(duration_secs: f64) -> f64 {
    (duration_secs - LAST_FRAME_OFFSET_SECS).max(0.0)
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

/// Run `cmd` to completion under `limit`, returning stdout on success.
///
/// The child is killed if the limit expires.
async fn run_tool(cmd: &mut Command, limit: Duration) -> Result<Vec<u8>, FfmpegError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = match tokio::time::timeout(limit, cmd.output()).await {
        Ok(result) => result.map_err(FfmpegError::NotFound)?,
        Err(_elapsed) => {
            return Err(FfmpegError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    };

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FfmpegError::VideoNotFound(path.to_string_lossy().to_string()))
    }
}

async fn ensure_parent(path: &Path) -> Result<(), FfmpegError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check that both `ffmpeg` and `ffprobe` can be executed.
pub async fn check_available() -> Result<(), FfmpegError> {
    for tool in ["ffmpeg", "ffprobe"] {
        run_tool(Command::new(tool).arg("-version"), Duration::from_secs(10)).await?;
    }
    Ok(())
}

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    ensure_exists(path)?;

    let stdout = run_tool(
        Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path),
        DEFAULT_TOOL_TIMEOUT,
    )
    .await?;

    let stdout = String::from_utf8_lossy(&stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Probe a video and summarize it as [`VideoInfo`].
pub async fn probe_info(path: &Path) -> Result<VideoInfo, FfmpegError> {
    let probe = probe_video(path).await?;
    Ok(VideoInfo::from_probe(&probe))
}

/// Extract a single full-size JPEG frame at `timestamp_secs`.
pub async fn extract_frame(
    video_path: &Path,
    output_path: &Path,
    timestamp_secs: f64,
) -> Result<(), FfmpegError> {
    ensure_exists(video_path)?;
    ensure_parent(output_path).await?;

    run_tool(
        Command::new("ffmpeg")
            .args(["-ss", &format!("{timestamp_secs:.3}"), "-i"])
            .arg(video_path)
            .args(["-vframes", "1", "-q:v", "2", "-y"])
            .arg(output_path),
        DEFAULT_TOOL_TIMEOUT,
    )
    .await?;

    if !output_path.is_file() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: Some(0),
            stderr: format!("no frame written to {}", output_path.display()),
        });
    }
    Ok(())
}

/// Extract one frame scaled down to fit inside `max_width` x `max_height`.
pub async fn extract_scaled_frame(
    video_path: &Path,
    output_path: &Path,
    timestamp_secs: f64,
    max_width: u32,
    max_height: u32,
) -> Result<(), FfmpegError> {
    ensure_exists(video_path)?;
    ensure_parent(output_path).await?;

    let scale = format!(
        "scale={max_width}:{max_height}:force_original_aspect_ratio=decrease"
    );
    run_tool(
        Command::new("ffmpeg")
            .args(["-ss", &format!("{timestamp_secs:.3}"), "-i"])
            .arg(video_path)
            .args(["-vframes", "1", "-vf", &scale, "-q:v", "2", "-y"])
            .arg(output_path),
        DEFAULT_TOOL_TIMEOUT,
    )
    .await?;
    Ok(())
}

/// Body of a concat-demuxer list file for `inputs`, in order.
///
/// Single quotes inside paths are escaped as `'\''`.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let path = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}

/// Concatenate `inputs` into `output_path` with stream copy.
///
/// `list_path` is written before the call and removed afterwards whether
/// or not ffmpeg succeeded.
pub async fn concat_videos(
    inputs: &[PathBuf],
    list_path: &Path,
    output_path: &Path,
) -> Result<(), FfmpegError> {
    for input in inputs {
        ensure_exists(input)?;
    }
    ensure_parent(output_path).await?;
    tokio::fs::write(list_path, concat_list(inputs)).await?;

    let result = run_tool(
        Command::new("ffmpeg")
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_path)
            .args(["-c", "copy", "-y"])
            .arg(output_path),
        DEFAULT_TOOL_TIMEOUT,
    )
    .await;

    if let Err(e) = tokio::fs::remove_file(list_path).await {
        tracing::debug!(path = %list_path.display(), error = %e, "Failed to remove concat list");
    }
    result.map(|_| ())
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then the video stream's.
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            first_video_stream(probe)
                .and_then(|s| s.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

/// Parse the video framerate from ffprobe output.
///
/// The `r_frame_rate` field is a fraction like `"30/1"` or `"24000/1001"`.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse::<f64>().unwrap_or(0.0),
    }
}

/// Find the first video stream's codec name.
pub fn parse_video_codec(probe: &FfprobeOutput) -> String {
    first_video_stream(probe)
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_default()
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (u32, u32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}
