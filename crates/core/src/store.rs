//! Persistence seam for jobs and scenes.
//!
//! The pipeline writes every job transition through [`JobStore::update_job`]
//! as one record update; the store, not any in-process registry, is the
//! source of truth for job state. [`MemoryStore`] backs tests and
//! database-less runs; the Postgres implementation lives in `vidchain-db`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use crate::outcome::FailureDetail;
use crate::scene::ChainMode;
use crate::status::{JobStatus, SceneStatus};
use crate::types::{DbId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: DbId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Fields supplied when a job record is created. Jobs start `Pending`.
#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub scene_id: Option<DbId>,
    /// Request mode label (`text_to_video`, `image_to_video`, `transition`).
    pub kind: String,
    pub model: String,
    pub prompt: String,
    /// Serialized request, kept for audit.
    pub request: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: DbId,
    pub scene_id: Option<DbId>,
    pub kind: String,
    pub model: String,
    pub prompt: String,
    pub request: serde_json::Value,
    pub operation_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub asset_path: Option<String>,
    pub failure: Option<FailureDetail>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One atomic job transition. `None` fields keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub operation_id: Option<String>,
    pub progress: Option<u8>,
    pub asset_path: Option<String>,
    pub failure: Option<FailureDetail>,
}

impl JobUpdate {
    fn status(status: JobStatus) -> Self {
        Self {
            status,
            operation_id: None,
            progress: None,
            asset_path: None,
            failure: None,
        }
    }

    pub fn processing(operation_id: impl Into<String>, progress: u8) -> Self {
        Self {
            operation_id: Some(operation_id.into()),
            progress: Some(progress),
            ..Self::status(JobStatus::Processing)
        }
    }

    pub fn completed(asset_path: impl Into<String>) -> Self {
        Self {
            asset_path: Some(asset_path.into()),
            progress: Some(100),
            ..Self::status(JobStatus::Completed)
        }
    }

    pub fn failed(failure: FailureDetail) -> Self {
        Self {
            failure: Some(failure),
            ..Self::status(JobStatus::Failed)
        }
    }

    pub fn timed_out(failure: FailureDetail) -> Self {
        Self {
            failure: Some(failure),
            ..Self::status(JobStatus::TimedOut)
        }
    }

    pub fn cancelled(failure: FailureDetail) -> Self {
        Self {
            failure: Some(failure),
            ..Self::status(JobStatus::Cancelled)
        }
    }
}

/// Fields supplied when a scene record is created. Scenes start `Pending`.
#[derive(Debug, Clone)]
pub struct NewSceneRecord {
    pub project: String,
    pub ordinal: usize,
    pub prompt: String,
    pub chain_mode: ChainMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneRecord {
    pub id: DbId,
    pub project: String,
    pub ordinal: usize,
    pub prompt: String,
    pub chain_mode: ChainMode,
    pub status: SceneStatus,
    pub job_id: Option<DbId>,
    pub asset_path: Option<String>,
    pub failure: Option<FailureDetail>,
    pub updated_at: Timestamp,
}

/// A scene transition. `None` fields keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneUpdate {
    pub status: SceneStatus,
    pub job_id: Option<DbId>,
    pub asset_path: Option<String>,
    pub failure: Option<FailureDetail>,
}

impl SceneUpdate {
    pub fn status(status: SceneStatus) -> Self {
        Self {
            status,
            job_id: None,
            asset_path: None,
            failure: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `Pending` job with progress 0 and return its id.
    async fn create_job(&self, job: NewJobRecord) -> Result<DbId, StoreError>;

    /// Apply one transition atomically. Fails with
    /// [`StoreError::InvalidTransition`] unless the stored status is an
    /// allowed predecessor of `update.status`.
    async fn update_job(&self, id: DbId, update: JobUpdate) -> Result<(), StoreError>;

    /// Raise the stored progress to `progress`; lower values are ignored.
    async fn update_progress(&self, id: DbId, progress: u8) -> Result<(), StoreError>;

    async fn get_job(&self, id: DbId) -> Result<JobRecord, StoreError>;

    async fn create_scene(&self, scene: NewSceneRecord) -> Result<DbId, StoreError>;

    /// Overwrite a scene's status. Scene statuses are not monotonic: a
    /// project re-run takes terminal scenes back to `Generating`.
    async fn update_scene(&self, id: DbId, update: SceneUpdate) -> Result<(), StoreError>;

    async fn get_scene(&self, id: DbId) -> Result<SceneRecord, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    next_id: DbId,
    jobs: HashMap<DbId, JobRecord>,
    scenes: HashMap<DbId, SceneRecord>,
    history: HashMap<DbId, Vec<JobStatus>>,
}

impl MemoryInner {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded maps implementing [`JobStore`] with the same transition
/// rules as the database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every status a job has held, in order, starting with `Pending`.
    pub fn status_history(&self, id: DbId) -> Vec<JobStatus> {
        self.lock().history.get(&id).cloned().unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Job ids in creation order.
    pub fn job_ids(&self) -> Vec<DbId> {
        let mut ids: Vec<DbId> = self.lock().jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: NewJobRecord) -> Result<DbId, StoreError> {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        let now = chrono::Utc::now();
        inner.jobs.insert(
            id,
            JobRecord {
                id,
                scene_id: job.scene_id,
                kind: job.kind,
                model: job.model,
                prompt: job.prompt,
                request: job.request,
                operation_id: None,
                status: JobStatus::Pending,
                progress: 0,
                asset_path: None,
                failure: None,
                created_at: now,
                updated_at: now,
            },
        );
        inner.history.insert(id, vec![JobStatus::Pending]);
        Ok(id)
    }

    async fn update_job(&self, id: DbId, update: JobUpdate) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "job", id })?;

        if !record.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: record.status,
                to: update.status,
            });
        }

        record.status = update.status;
        if let Some(op) = update.operation_id {
            record.operation_id = Some(op);
        }
        if let Some(p) = update.progress {
            record.progress = record.progress.max(p.min(100));
        }
        if let Some(path) = update.asset_path {
            record.asset_path = Some(path);
        }
        if let Some(f) = update.failure {
            record.failure = Some(f);
        }
        record.updated_at = chrono::Utc::now();

        inner.history.entry(id).or_default().push(update.status);
        Ok(())
    }

    async fn update_progress(&self, id: DbId, progress: u8) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "job", id })?;
        let progress = progress.min(100);
        if progress > record.progress {
            record.progress = progress;
            record.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_job(&self, id: DbId) -> Result<JobRecord, StoreError> {
        self.lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "job", id })
    }

    async fn create_scene(&self, scene: NewSceneRecord) -> Result<DbId, StoreError> {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        inner.scenes.insert(
            id,
            SceneRecord {
                id,
                project: scene.project,
                ordinal: scene.ordinal,
                prompt: scene.prompt,
                chain_mode: scene.chain_mode,
                status: SceneStatus::Pending,
                job_id: None,
                asset_path: None,
                failure: None,
                updated_at: chrono::Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_scene(&self, id: DbId, update: SceneUpdate) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .scenes
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "scene", id })?;

        // A fresh attempt clears the previous outcome.
        if update.status == SceneStatus::Generating {
            record.asset_path = None;
            record.failure = None;
        }
        record.status = update.status;
        if let Some(job) = update.job_id {
            record.job_id = Some(job);
        }
        if let Some(path) = update.asset_path {
            record.asset_path = Some(path);
        }
        if let Some(f) = update.failure {
            record.failure = Some(f);
        }
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn get_scene(&self, id: DbId) -> Result<SceneRecord, StoreError> {
        self.lock()
            .scenes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "scene", id })
    }
}
