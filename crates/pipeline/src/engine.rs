//! Base generation engine: submit, poll, download for one request.
//!
//! Every job transition is one [`JobStore::update_job`] call:
//!
//! ```text
//! Pending -> Processing -> Completed
//!        \            \-> Failed | TimedOut | Cancelled
//!         \-> Failed | Cancelled
//! ```
//!
//! [`GenerationEngine::run`] never returns an error. Whatever happens, the
//! caller gets a [`JobOutcome`] with a terminal status and, on failure, a
//! `{kind, message}` detail.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vidchain_core::naming;
use vidchain_core::outcome::FailureDetail;
use vidchain_core::progress::{
    poll_progress, PROGRESS_COMPLETE, PROGRESS_DOWNLOADING, PROGRESS_POLL_MAX, PROGRESS_STARTED,
    PROGRESS_SUBMITTED,
};
use vidchain_core::request::{GenerationRequest, SubmitPayload};
use vidchain_core::status::JobStatus;
use vidchain_core::store::{JobStore, JobUpdate, NewJobRecord};
use vidchain_core::types::DbId;
use vidchain_events::{event_types, EventBus, PipelineEvent};
use vidchain_genapi::{AssetDownloader, GenerationService, OperationStage};

use crate::config::EngineConfig;
use crate::error::GenerationError;
use crate::progress::{NoProgress, ProgressReporter, ProgressSink};
use crate::retry::with_retry;

// ---------------------------------------------------------------------------
// Run context and outcome
// ---------------------------------------------------------------------------

/// Per-run inputs that are not part of the request itself.
#[derive(Clone)]
pub struct RunContext {
    /// Scene the job belongs to, if any.
    pub scene_id: Option<DbId>,
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            scene_id: None,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }
}

impl RunContext {
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_scene(mut self, scene_id: Option<DbId>) -> Self {
        self.scene_id = scene_id;
        self
    }
}

/// A job accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: DbId,
    pub operation_id: String,
}

/// Terminal result of [`GenerationEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    /// `None` when the request was rejected before a record was created.
    pub job_id: Option<DbId>,
    pub operation_id: Option<String>,
    pub status: JobStatus,
    pub asset_path: Option<PathBuf>,
    pub failure: Option<FailureDetail>,
}

impl JobOutcome {
    /// A request that failed before any job record existed.
    pub fn rejected(error: &GenerationError) -> Self {
        Self {
            job_id: None,
            operation_id: None,
            status: terminal_status_for(error),
            asset_path: None,
            failure: Some(error.detail()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed && self.asset_path.is_some()
    }
}

fn terminal_status_for(error: &GenerationError) -> JobStatus {
    match error {
        GenerationError::Timeout { .. } => JobStatus::TimedOut,
        GenerationError::Cancelled => JobStatus::Cancelled,
        _ => JobStatus::Failed,
    }
}

// ---------------------------------------------------------------------------
// Poll guard
// ---------------------------------------------------------------------------

/// Marks a job as being polled; removed again on drop.
struct PollGuard<'a> {
    active: &'a Mutex<HashSet<DbId>>,
    job_id: DbId,
}

impl<'a> PollGuard<'a> {
    fn acquire(active: &'a Mutex<HashSet<DbId>>, job_id: DbId) -> Result<Self, GenerationError> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id);
        if inserted {
            Ok(Self { active, job_id })
        } else {
            Err(GenerationError::AlreadyPolling(job_id))
        }
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GenerationEngine {
    service: Arc<dyn GenerationService>,
    downloader: Arc<dyn AssetDownloader>,
    store: Arc<dyn JobStore>,
    events: Option<Arc<EventBus>>,
    config: EngineConfig,
    /// Jobs with a live poll loop in this process. Guards against double
    /// polling only; job state lives in the store.
    active_polls: Mutex<HashSet<DbId>>,
}

impl GenerationEngine {
    pub fn new(
        service: Arc<dyn GenerationService>,
        downloader: Arc<dyn AssetDownloader>,
        store: Arc<dyn JobStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            service,
            downloader,
            store,
            events: None,
            config,
            active_polls: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    fn publish(&self, event_type: &'static str, job_id: DbId, payload: serde_json::Value) {
        if let Some(bus) = &self.events {
            bus.publish(PipelineEvent::job(event_type, job_id).with_payload(payload));
        }
    }

    /// Raise progress for a job: observer, store and bus.
    async fn report(
        &self,
        job_id: DbId,
        reporter: &mut ProgressReporter<'_>,
        percent: u8,
        label: &str,
    ) {
        let Some(percent) = reporter.report(percent, label) else {
            return;
        };
        if let Err(e) = self.store.update_progress(job_id, percent).await {
            tracing::warn!(job_id, error = %e, "Failed to record progress");
        }
        self.publish(
            event_types::JOB_PROGRESS,
            job_id,
            serde_json::json!({ "percent": percent, "label": label }),
        );
    }

    // ---- submit ----

    /// Validate a request and create its `Pending` job record.
    ///
    /// Validation runs before any store or service call, so a rejected
    /// request leaves no record behind.
    pub async fn create_job(
        &self,
        request: &GenerationRequest,
        ctx: &RunContext,
    ) -> Result<DbId, GenerationError> {
        request.validate()?;

        let job_id = self
            .store
            .create_job(NewJobRecord {
                scene_id: ctx.scene_id,
                kind: request.kind_label().to_string(),
                model: request.model().to_string(),
                prompt: request.prompt().to_string(),
                request: serde_json::to_value(request)
                    .map_err(|e| GenerationError::Internal(e.to_string()))?,
            })
            .await?;
        Ok(job_id)
    }

    /// Submit a recorded job, retrying transient failures.
    ///
    /// On acceptance the job moves to `Processing` with the operation id.
    /// If submission fails the record is moved to its terminal status here.
    pub async fn submit_job(
        &self,
        job_id: DbId,
        request: &GenerationRequest,
        payload: &SubmitPayload,
        ctx: &RunContext,
    ) -> Result<JobHandle, GenerationError> {
        let submitted = with_retry(&self.config.retry, &ctx.cancel, "submit", || async {
            self.service
                .submit(payload)
                .await
                .map_err(GenerationError::from)
        })
        .await;

        let operation_id = match submitted {
            Ok(op) => op,
            Err(e) => {
                self.finish_failed(job_id, None, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .store
            .update_job(
                job_id,
                JobUpdate::processing(operation_id.clone(), PROGRESS_SUBMITTED),
            )
            .await
        {
            let e = GenerationError::from(e);
            self.cancel_remote(job_id, &operation_id).await;
            self.finish_failed(job_id, Some(&operation_id), &e).await;
            return Err(e);
        }

        tracing::info!(
            job_id,
            operation_id = %operation_id,
            model = request.model(),
            kind = request.kind_label(),
            "Generation submitted"
        );
        self.publish(
            event_types::JOB_SUBMITTED,
            job_id,
            serde_json::json!({
                "operation_id": operation_id,
                "model": request.model(),
                "kind": request.kind_label(),
            }),
        );

        Ok(JobHandle {
            job_id,
            operation_id,
        })
    }

    /// [`create_job`](Self::create_job) followed by
    /// [`submit_job`](Self::submit_job).
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        payload: &SubmitPayload,
        ctx: &RunContext,
    ) -> Result<JobHandle, GenerationError> {
        let job_id = self.create_job(request, ctx).await?;
        self.submit_job(job_id, request, payload, ctx).await
    }

    // ---- poll ----

    /// Poll the operation until the service reports a terminal stage.
    ///
    /// Returns the result URL on success. Each attempt waits one poll
    /// interval first; transient status errors are logged and consume an
    /// attempt. Only one poll loop per job may run at a time.
    pub async fn poll_until_terminal(
        &self,
        job: &JobHandle,
        reporter: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let _guard = PollGuard::acquire(&self.active_polls, job.job_id)?;
        let max_attempts = self.config.max_poll_attempts;

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                status = self.service.get_status(&job.operation_id) => status,
            };

            let status = match status {
                Ok(status) => status,
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        job_id = job.job_id,
                        attempt,
                        error = %e,
                        "Status check failed, will retry"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match status.stage {
                OperationStage::Succeeded => {
                    let url = status
                        .result_url
                        .filter(|u| !u.trim().is_empty())
                        .ok_or_else(|| {
                            GenerationError::GenerationFailed(
                                "operation finished without a result".to_string(),
                            )
                        })?;
                    self.report(
                        job.job_id,
                        reporter,
                        PROGRESS_POLL_MAX,
                        "Generation complete",
                    )
                    .await;
                    tracing::info!(job_id = job.job_id, attempt, "Generation finished");
                    return Ok(url);
                }
                OperationStage::Failed => {
                    let code = status.error.as_ref().and_then(|e| e.code);
                    return Err(GenerationError::from_operation_failure(
                        code,
                        status.error_message(),
                    ));
                }
                OperationStage::Cancelled => return Err(GenerationError::Cancelled),
                OperationStage::Queued | OperationStage::Running | OperationStage::Unknown => {
                    let percent = poll_progress(attempt, max_attempts, status.progress_hint);
                    let label = status
                        .stage_label
                        .unwrap_or_else(|| format!("Generating ({attempt}/{max_attempts})"));
                    self.report(job.job_id, reporter, percent, &label).await;
                }
            }
        }

        tracing::warn!(
            job_id = job.job_id,
            attempts = max_attempts,
            "Generation timed out"
        );
        Err(GenerationError::Timeout {
            attempts: max_attempts,
        })
    }

    // ---- download ----

    /// Stream the finished asset into the output directory.
    ///
    /// Bounded by the download timeout; a partial file is removed on any
    /// failure.
    pub async fn download(
        &self,
        job: &JobHandle,
        url: &str,
        prompt: &str,
        reporter: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, GenerationError> {
        self.report(job.job_id, reporter, PROGRESS_DOWNLOADING, "Downloading")
            .await;

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| GenerationError::Download(format!("cannot create output dir: {e}")))?;
        let dest = self
            .config
            .output_dir
            .join(naming::video_filename(prompt, chrono::Utc::now()));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            res = tokio::time::timeout(
                self.config.download_timeout,
                self.downloader.download(url, &dest),
            ) => match res {
                Ok(Ok(0)) => Err(GenerationError::Download("downloaded asset is empty".to_string())),
                Ok(Ok(_bytes)) => Ok(()),
                Ok(Err(e)) => Err(GenerationError::Download(e.to_string())),
                Err(_elapsed) => Err(GenerationError::Download(format!(
                    "timed out after {}s",
                    self.config.download_timeout.as_secs_f64()
                ))),
            },
        };

        match result {
            Ok(()) => {
                tracing::info!(job_id = job.job_id, path = %dest.display(), "Asset downloaded");
                Ok(dest)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&dest).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %dest.display(), error = %rm, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }

    // ---- terminal writes ----

    /// Best-effort remote cancel. Failures are logged only.
    async fn cancel_remote(&self, job_id: DbId, operation_id: &str) {
        match self.service.cancel(operation_id).await {
            Ok(true) => tracing::info!(job_id, operation_id, "Remote operation cancelled"),
            Ok(false) => tracing::debug!(job_id, operation_id, "Remote operation already finished"),
            Err(e) => tracing::warn!(job_id, operation_id, error = %e, "Remote cancel failed"),
        }
    }

    /// Move a job to the terminal status matching `error`.
    async fn finish_failed(&self, job_id: DbId, operation_id: Option<&str>, error: &GenerationError) {
        let detail = error.detail();
        let (update, event) = match error {
            GenerationError::Timeout { .. } => {
                (JobUpdate::timed_out(detail.clone()), event_types::JOB_TIMED_OUT)
            }
            GenerationError::Cancelled => {
                (JobUpdate::cancelled(detail.clone()), event_types::JOB_CANCELLED)
            }
            _ => (JobUpdate::failed(detail.clone()), event_types::JOB_FAILED),
        };

        if let Err(e) = self.store.update_job(job_id, update).await {
            tracing::error!(job_id, error = %e, "Failed to record job failure");
        }
        tracing::warn!(
            job_id,
            operation_id,
            kind = %detail.kind,
            message = %detail.message,
            "Generation job ended without a result"
        );
        self.publish(
            event,
            job_id,
            serde_json::json!({ "kind": detail.kind, "message": detail.message }),
        );
    }

    /// Failed outcome for a job that exists in the store.
    async fn fail(
        &self,
        job: &JobHandle,
        error: GenerationError,
        asset_path: Option<PathBuf>,
    ) -> JobOutcome {
        if matches!(error, GenerationError::Cancelled) {
            self.cancel_remote(job.job_id, &job.operation_id).await;
        }
        self.finish_failed(job.job_id, Some(&job.operation_id), &error)
            .await;
        JobOutcome {
            job_id: Some(job.job_id),
            operation_id: Some(job.operation_id.clone()),
            status: terminal_status_for(&error),
            asset_path,
            failure: Some(error.detail()),
        }
    }

    // ---- full run ----

    /// Submit, poll and download one request, returning its terminal
    /// outcome.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        payload: &SubmitPayload,
        ctx: &RunContext,
    ) -> JobOutcome {
        let mut reporter = ProgressReporter::new(&*ctx.progress);
        reporter.report(PROGRESS_STARTED, "Starting");

        let job_id = match self.create_job(request, ctx).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Generation request rejected");
                return JobOutcome::rejected(&e);
            }
        };

        let job = match self.submit_job(job_id, request, payload, ctx).await {
            Ok(job) => job,
            Err(e) => {
                // Terminal status already written by submit_job.
                return JobOutcome {
                    job_id: Some(job_id),
                    ..JobOutcome::rejected(&e)
                };
            }
        };
        // Processing already carries the submitted progress.
        reporter.report(PROGRESS_SUBMITTED, "Submitted");

        let url = match self
            .poll_until_terminal(&job, &mut reporter, &ctx.cancel)
            .await
        {
            Ok(url) => url,
            Err(e) => return self.fail(&job, e, None).await,
        };

        let path = match self
            .download(&job, &url, request.prompt(), &mut reporter, &ctx.cancel)
            .await
        {
            Ok(path) => path,
            Err(e) => return self.fail(&job, e, None).await,
        };

        let asset = path.to_string_lossy().to_string();
        if let Err(e) = self
            .store
            .update_job(job.job_id, JobUpdate::completed(asset.clone()))
            .await
        {
            tracing::error!(job_id = job.job_id, error = %e, "Failed to record completion");
            return JobOutcome {
                job_id: Some(job.job_id),
                operation_id: Some(job.operation_id),
                status: JobStatus::Failed,
                asset_path: Some(path),
                failure: Some(GenerationError::from(e).detail()),
            };
        }

        reporter.report(PROGRESS_COMPLETE, "Complete");
        self.publish(
            event_types::JOB_COMPLETED,
            job.job_id,
            serde_json::json!({ "asset_path": asset }),
        );

        JobOutcome {
            job_id: Some(job.job_id),
            operation_id: Some(job.operation_id),
            status: JobStatus::Completed,
            asset_path: Some(path),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_guard_rejects_second_loop() {
        let active = Mutex::new(HashSet::new());
        let first = PollGuard::acquire(&active, 7).unwrap();
        assert!(matches!(
            PollGuard::acquire(&active, 7),
            Err(GenerationError::AlreadyPolling(7))
        ));
        assert!(PollGuard::acquire(&active, 8).is_ok());
        drop(first);
        assert!(PollGuard::acquire(&active, 7).is_ok());
    }

    #[test]
    fn rejected_outcome_has_no_job() {
        let outcome = JobOutcome::rejected(&GenerationError::Validation("Prompt too long".into()));
        assert_eq!(outcome.job_id, None);
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(!outcome.is_completed());
    }

    #[test]
    fn terminal_status_mapping() {
        assert_eq!(
            terminal_status_for(&GenerationError::Timeout { attempts: 3 }),
            JobStatus::TimedOut
        );
        assert_eq!(
            terminal_status_for(&GenerationError::Cancelled),
            JobStatus::Cancelled
        );
        assert_eq!(
            terminal_status_for(&GenerationError::Download("x".into())),
            JobStatus::Failed
        );
    }
}
