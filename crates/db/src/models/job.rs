//! Row model for the `generation_jobs` table.

use sqlx::FromRow;
use vidchain_core::status::{JobStatus, StatusId};
use vidchain_core::store::{JobRecord, StoreError};
use vidchain_core::types::{DbId, Timestamp};

use super::failure_from_columns;

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationJobRow {
    pub id: DbId,
    pub scene_id: Option<DbId>,
    pub kind: String,
    pub model: String,
    pub prompt: String,
    pub request: serde_json::Value,
    pub operation_id: Option<String>,
    pub status_id: StatusId,
    pub progress: i16,
    pub asset_path: Option<String>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationJobRow {
    pub fn status(&self) -> Result<JobStatus, StoreError> {
        JobStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!(
                "job {} has unknown status id {}",
                self.id, self.status_id
            ))
        })
    }

    pub fn into_record(self) -> Result<JobRecord, StoreError> {
        let status = self.status()?;
        let failure =
            failure_from_columns(self.failure_kind.as_deref(), self.failure_message.as_deref());
        Ok(JobRecord {
            id: self.id,
            scene_id: self.scene_id,
            kind: self.kind,
            model: self.model,
            prompt: self.prompt,
            request: self.request,
            operation_id: self.operation_id,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            asset_path: self.asset_path,
            failure,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
