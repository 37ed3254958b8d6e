//! Shared fakes for pipeline integration tests.
//!
//! - [`ScriptedService`]: replays queued submit/status results.
//! - [`FakeDownloader`]: writes fixed bytes, or fails, or never finishes.
//! - [`FakeToolkit`]: stands in for ffmpeg; extracted frames are real JPEGs
//!   so they survive image preprocessing.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tempfile::TempDir;
use vidchain_core::ffmpeg::{FfmpegError, VideoInfo};
use vidchain_core::request::SubmitPayload;
use vidchain_core::retry::RetryPolicy;
use vidchain_core::store::MemoryStore;
use vidchain_genapi::{
    AssetDownloader, DownloadError, GenerationService, OperationStatus, ServiceError,
};
use vidchain_pipeline::{
    EngineConfig, FrameExtractor, GenerationEngine, ImageGenerator, MediaToolkit, Merger,
    SceneChainOrchestrator, TextGenerator,
};

pub const RESULT_URL: &str = "https://cdn.example.test/clip.mp4";

// ---------------------------------------------------------------------------
// Generation service
// ---------------------------------------------------------------------------

pub struct ScriptedService {
    submits: Mutex<VecDeque<Result<String, ServiceError>>>,
    statuses: Mutex<VecDeque<Result<OperationStatus, ServiceError>>>,
    /// Returned once the status queue is empty.
    fallback: OperationStatus,
    payloads: Mutex<Vec<SubmitPayload>>,
    pub submit_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub cancel_calls: AtomicU32,
}

impl ScriptedService {
    /// Every operation stays in flight forever.
    pub fn in_flight() -> Self {
        Self::with_fallback(OperationStatus::in_flight(None))
    }

    /// Every operation succeeds on its first status check.
    pub fn succeeding() -> Self {
        Self::with_fallback(OperationStatus::succeeded(RESULT_URL))
    }

    fn with_fallback(fallback: OperationStatus) -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            fallback,
            payloads: Mutex::new(Vec::new()),
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    pub fn push_submit(self, result: Result<String, ServiceError>) -> Self {
        self.submits.lock().unwrap().push_back(result);
        self
    }

    pub fn push_status(self, result: Result<OperationStatus, ServiceError>) -> Self {
        self.statuses.lock().unwrap().push_back(result);
        self
    }

    pub fn payloads(&self) -> Vec<SubmitPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn submits(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn submit(&self, payload: &SubmitPayload) -> Result<String, ServiceError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(payload.clone());
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("operations/op-{n}")))
    }

    async fn get_status(&self, _operation_id: &str) -> Result<OperationStatus, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn cancel(&self, _operation_id: &str) -> Result<bool, ServiceError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Write,
    /// Write a few bytes, then fail.
    FailPartway,
    Hang,
}

pub struct FakeDownloader {
    mode: DownloadMode,
    bytes: Vec<u8>,
    pub calls: AtomicU32,
}

impl FakeDownloader {
    pub fn new(mode: DownloadMode) -> Self {
        Self {
            mode,
            bytes: b"\x00\x00\x00\x18ftypmp42fake-video-bytes".to_vec(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(DownloadMode::Write)
    }
}

#[async_trait]
impl AssetDownloader for FakeDownloader {
    async fn download(&self, _url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            DownloadMode::Write => {
                tokio::fs::write(dest, &self.bytes).await?;
                Ok(self.bytes.len() as u64)
            }
            DownloadMode::FailPartway => {
                tokio::fs::write(dest, &self.bytes[..4]).await?;
                Err(DownloadError::Http { status: 502 })
            }
            DownloadMode::Hang => {
                tokio::fs::write(dest, &self.bytes[..4]).await?;
                std::future::pending().await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Media toolkit
// ---------------------------------------------------------------------------

pub fn clip_info(width: u32, height: u32, fps: f64) -> VideoInfo {
    VideoInfo {
        duration_secs: 5.0,
        width,
        height,
        fps,
        codec: "h264".to_string(),
    }
}

pub struct FakeToolkit {
    available: bool,
    default_info: VideoInfo,
    infos: Mutex<HashMap<PathBuf, VideoInfo>>,
    fail_concat: bool,
    /// `(video, timestamp)` per extraction.
    extractions: Mutex<Vec<(PathBuf, f64)>>,
    /// Output path per extraction.
    frames: Mutex<Vec<PathBuf>>,
    concats: Mutex<Vec<Vec<PathBuf>>>,
    pub availability_checks: AtomicU32,
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self {
            available: true,
            default_info: clip_info(1280, 720, 24.0),
            infos: Mutex::new(HashMap::new()),
            fail_concat: false,
            extractions: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            concats: Mutex::new(Vec::new()),
            availability_checks: AtomicU32::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn failing_concat() -> Self {
        Self {
            fail_concat: true,
            ..Self::new()
        }
    }

    pub fn set_info(&self, video: &Path, info: VideoInfo) {
        self.infos.lock().unwrap().insert(video.to_path_buf(), info);
    }

    pub fn extractions(&self) -> Vec<(PathBuf, f64)> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<PathBuf> {
        self.frames.lock().unwrap().clone()
    }

    pub fn concats(&self) -> Vec<Vec<PathBuf>> {
        self.concats.lock().unwrap().clone()
    }

    fn write_frame(output: &Path, width: u32, height: u32) -> Result<(), FfmpegError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        RgbImage::from_pixel(width, height, Rgb([200, 120, 40]))
            .save(output)
            .map_err(|e| FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: e.to_string(),
            })
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn check_available(&self) -> Result<(), FfmpegError> {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(FfmpegError::NotFound(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ffmpeg",
            )))
        }
    }

    async fn probe(&self, video: &Path) -> Result<VideoInfo, FfmpegError> {
        if !video.is_file() {
            return Err(FfmpegError::VideoNotFound(video.display().to_string()));
        }
        Ok(self
            .infos
            .lock()
            .unwrap()
            .get(video)
            .cloned()
            .unwrap_or_else(|| self.default_info.clone()))
    }

    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
    ) -> Result<(), FfmpegError> {
        self.extractions
            .lock()
            .unwrap()
            .push((video.to_path_buf(), timestamp_secs));
        self.frames.lock().unwrap().push(output.to_path_buf());
        Self::write_frame(output, 64, 36)
    }

    async fn extract_thumbnail(
        &self,
        video: &Path,
        output: &Path,
        timestamp_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<(), FfmpegError> {
        self.extractions
            .lock()
            .unwrap()
            .push((video.to_path_buf(), timestamp_secs));
        Self::write_frame(output, max_width, max_height)
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        _list_path: &Path,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        self.concats.lock().unwrap().push(inputs.to_vec());
        if self.fail_concat {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        tokio::fs::write(output, b"merged").await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Engine settings scaled down to milliseconds.
pub fn fast_config(output_dir: &Path) -> EngineConfig {
    EngineConfig {
        output_dir: output_dir.to_path_buf(),
        poll_interval: Duration::from_millis(5),
        max_poll_attempts: 5,
        download_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        },
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub service: Arc<ScriptedService>,
    pub downloader: Arc<FakeDownloader>,
    pub toolkit: Arc<FakeToolkit>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<GenerationEngine>,
}

impl Harness {
    pub fn new(service: ScriptedService, downloader: FakeDownloader, toolkit: FakeToolkit) -> Self {
        Self::with_config(service, downloader, toolkit, |c| c)
    }

    pub fn with_config(
        service: ScriptedService,
        downloader: FakeDownloader,
        toolkit: FakeToolkit,
        tweak: impl FnOnce(EngineConfig) -> EngineConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(service);
        let downloader = Arc::new(downloader);
        let store = Arc::new(MemoryStore::new());
        let engine = GenerationEngine::new(
            service.clone(),
            downloader.clone(),
            store.clone(),
            tweak(fast_config(&dir.path().join("videos"))),
        );
        Self {
            dir,
            service,
            downloader,
            toolkit: Arc::new(toolkit),
            store,
            engine: Arc::new(engine),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn text(&self) -> TextGenerator {
        TextGenerator::new(self.engine.clone())
    }

    pub fn image(&self) -> ImageGenerator {
        ImageGenerator::new(self.engine.clone())
    }

    pub fn extractor(&self) -> Arc<FrameExtractor> {
        Arc::new(FrameExtractor::new(
            self.toolkit.clone(),
            self.dir.path().join("frames"),
        ))
    }

    pub fn orchestrator(&self) -> SceneChainOrchestrator {
        SceneChainOrchestrator::new(self.text(), self.image(), self.extractor())
    }

    pub fn merger(&self) -> Merger {
        Merger::new(self.toolkit.clone(), self.dir.path().join("merged"))
    }

    /// Write a solid-color image fixture.
    pub fn write_image(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.path(name);
        RgbImage::from_pixel(width, height, Rgb([30, 60, 90]))
            .save(&path)
            .unwrap();
        path
    }

    /// Write a placeholder clip file.
    pub fn write_clip(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, b"clip").unwrap();
        path
    }
}
