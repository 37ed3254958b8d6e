//! Concatenation of finished clips.
//!
//! Merging uses the concat demuxer with stream copy, so inputs must share
//! resolution and frame rate. [`Merger::validate_compatible`] checks that
//! up front but never blocks a merge on its own; the result just records
//! whether the inputs looked compatible.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use vidchain_core::ffmpeg::{FfmpegError, VideoInfo};
use vidchain_core::naming;
use vidchain_core::scene::Project;
use vidchain_events::{EventBus, PipelineEvent};

use crate::media::MediaToolkit;

/// Frame rates closer than this are treated as equal.
const FPS_TOLERANCE: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("No videos to merge")]
    NoInputs,

    /// Merging was requested before every scene finished. Carries the
    /// 1-based numbers of the offending scenes.
    #[error("Cannot merge: scenes {ordinals:?} are not completed")]
    ScenesIncomplete { ordinals: Vec<usize> },

    #[error("Video not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Merge failed: {0}")]
    Tool(#[from] FfmpegError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    /// Inputs in concatenation order.
    pub sources: Vec<PathBuf>,
    pub output_path: PathBuf,
    /// Whether the inputs passed [`Merger::validate_compatible`].
    pub compatible: bool,
}

pub struct Merger {
    toolkit: Arc<dyn MediaToolkit>,
    merged_dir: PathBuf,
    events: Option<Arc<EventBus>>,
}

impl Merger {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, merged_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolkit,
            merged_dir: merged_dir.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn merged_dir(&self) -> &Path {
        &self.merged_dir
    }

    /// True when every input shares the first input's resolution and frame
    /// rate. A codec mismatch only warns. Never errors: a probe failure
    /// counts as incompatible.
    pub async fn validate_compatible(&self, videos: &[PathBuf]) -> bool {
        if videos.len() < 2 {
            return true;
        }

        let mut infos = Vec::with_capacity(videos.len());
        for video in videos {
            match self.toolkit.probe(video).await {
                Ok(info) => infos.push(info),
                Err(e) => {
                    tracing::warn!(
                        video = %video.display(),
                        error = %e,
                        "Probe failed, treating as incompatible"
                    );
                    return false;
                }
            }
        }

        let Some((reference, rest)) = infos.split_first() else {
            return true;
        };
        rest.iter()
            .zip(videos.iter().skip(1))
            .all(|(info, path)| compatible_with(reference, info, path))
    }

    /// Concatenate `videos` in order.
    ///
    /// `output` defaults to `merged_{timestamp}.mp4` in the merged
    /// directory. The list file is written next to the output and removed
    /// afterwards.
    pub async fn merge(
        &self,
        videos: &[PathBuf],
        output: Option<PathBuf>,
    ) -> Result<MergeResult, MergeError> {
        if videos.is_empty() {
            return Err(MergeError::NoInputs);
        }
        if let Some(missing) = videos.iter().find(|v| !v.is_file()) {
            return Err(MergeError::InputMissing(missing.clone()));
        }

        let compatible = self.validate_compatible(videos).await;
        if !compatible {
            tracing::warn!(inputs = videos.len(), "Inputs may not concatenate cleanly");
        }

        let output = match output {
            Some(path) => path,
            None => self
                .merged_dir
                .join(naming::merged_filename(chrono::Utc::now())),
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let list_path = list_path_for(&output);

        self.toolkit.concat(videos, &list_path, &output).await?;

        tracing::info!(
            inputs = videos.len(),
            output = %output.display(),
            compatible,
            "Videos merged"
        );
        if let Some(bus) = &self.events {
            bus.publish(PipelineEvent::merge_completed().with_payload(
                serde_json::json!({
                    "output_path": output.to_string_lossy(),
                    "inputs": videos.len(),
                    "compatible": compatible,
                }),
            ));
        }

        Ok(MergeResult {
            sources: videos.to_vec(),
            output_path: output,
            compatible,
        })
    }

    /// Merge every scene of `project` in ordinal order.
    ///
    /// Rejected without invoking the tool unless every scene is completed.
    pub async fn merge_sequence(
        &self,
        project: &Project,
        output: Option<PathBuf>,
    ) -> Result<MergeResult, MergeError> {
        if project.is_empty() {
            return Err(MergeError::NoInputs);
        }

        let incomplete: Vec<usize> = project
            .scenes()
            .iter()
            .filter(|s| !s.is_completed())
            .map(|s| s.ordinal + 1)
            .collect();
        if !incomplete.is_empty() {
            return Err(MergeError::ScenesIncomplete {
                ordinals: incomplete,
            });
        }

        let videos: Vec<PathBuf> = project
            .scenes()
            .iter()
            .filter_map(|s| s.asset_path.clone())
            .collect();
        self.merge(&videos, output).await
    }
}

fn compatible_with(reference: &VideoInfo, info: &VideoInfo, path: &Path) -> bool {
    if (reference.width, reference.height) != (info.width, info.height) {
        tracing::warn!(
            video = %path.display(),
            expected = ?(reference.width, reference.height),
            actual = ?(info.width, info.height),
            "Resolution mismatch"
        );
        return false;
    }
    if (reference.fps - info.fps).abs() > FPS_TOLERANCE {
        tracing::warn!(
            video = %path.display(),
            expected = reference.fps,
            actual = info.fps,
            "Frame rate mismatch"
        );
        return false;
    }
    if reference.codec != info.codec {
        tracing::warn!(
            video = %path.display(),
            expected = %reference.codec,
            actual = %info.codec,
            "Codec mismatch, concatenation may re-time streams"
        );
    }
    true
}

/// `{stem}_concat.txt` beside `output`.
fn list_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "merged".to_string());
    output.with_file_name(format!("{stem}_concat.txt"))
}
