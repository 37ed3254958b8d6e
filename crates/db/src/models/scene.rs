//! Row model for the `scenes` table.

use sqlx::FromRow;
use vidchain_core::scene::ChainMode;
use vidchain_core::status::{SceneStatus, StatusId};
use vidchain_core::store::{SceneRecord, StoreError};
use vidchain_core::types::{DbId, Timestamp};

use super::failure_from_columns;

#[derive(Debug, Clone, FromRow)]
pub struct SceneRow {
    pub id: DbId,
    pub project: String,
    pub ordinal: i32,
    pub prompt: String,
    pub chain_mode: String,
    pub status_id: StatusId,
    pub job_id: Option<DbId>,
    pub asset_path: Option<String>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SceneRow {
    pub fn into_record(self) -> Result<SceneRecord, StoreError> {
        let status = SceneStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!(
                "scene {} has unknown status id {}",
                self.id, self.status_id
            ))
        })?;
        let chain_mode = ChainMode::parse(&self.chain_mode).ok_or_else(|| {
            StoreError::Backend(format!(
                "scene {} has unknown chain mode '{}'",
                self.id, self.chain_mode
            ))
        })?;
        let failure =
            failure_from_columns(self.failure_kind.as_deref(), self.failure_message.as_deref());
        Ok(SceneRecord {
            id: self.id,
            project: self.project,
            ordinal: self.ordinal.max(0) as usize,
            prompt: self.prompt,
            chain_mode,
            status,
            job_id: self.job_id,
            asset_path: self.asset_path,
            failure,
            updated_at: self.updated_at,
        })
    }
}
