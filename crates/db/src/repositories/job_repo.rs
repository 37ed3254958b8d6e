//! Repository for the `generation_jobs` table.
//!
//! Status transitions are single conditional updates: the `WHERE` clause
//! only matches rows whose current status is an allowed predecessor of the
//! new one, so concurrent writers can never move a job backwards.

use sqlx::PgPool;
use vidchain_core::status::{JobStatus, StatusId};
use vidchain_core::store::{JobUpdate, NewJobRecord};
use vidchain_core::types::DbId;

use crate::models::job::GenerationJobRow;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, scene_id, kind, model, prompt, request, operation_id, status_id, \
    progress, asset_path, failure_kind, failure_message, created_at, updated_at";

pub struct JobRepo;

impl JobRepo {
    /// Insert a pending job with progress 0.
    pub async fn insert(pool: &PgPool, input: &NewJobRecord) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as(
            "INSERT INTO generation_jobs (scene_id, kind, model, prompt, request, status_id, progress) \
             VALUES ($1, $2, $3, $4, $5, $6, 0) \
             RETURNING id",
        )
        .bind(input.scene_id)
        .bind(&input.kind)
        .bind(&input.model)
        .bind(&input.prompt)
        .bind(&input.request)
        .bind(JobStatus::Pending.id())
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, GenerationJobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a transition if the stored status allows it.
    ///
    /// Returns `false` when no row matched: either the job does not exist
    /// or its status is not a predecessor of `update.status`.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        update: &JobUpdate,
    ) -> Result<bool, sqlx::Error> {
        let allowed: Vec<StatusId> = JobStatus::predecessors(update.status)
            .iter()
            .map(|s| s.id())
            .collect();
        let (failure_kind, failure_message) = match &update.failure {
            Some(f) => (Some(f.kind.as_str()), Some(f.message.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            "UPDATE generation_jobs SET \
                 status_id = $2, \
                 operation_id = COALESCE($3, operation_id), \
                 progress = GREATEST(progress, COALESCE($4, progress)), \
                 asset_path = COALESCE($5, asset_path), \
                 failure_kind = COALESCE($6, failure_kind), \
                 failure_message = COALESCE($7, failure_message), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($8)",
        )
        .bind(id)
        .bind(update.status.id())
        .bind(update.operation_id.as_deref())
        .bind(update.progress.map(|p| i16::from(p.min(100))))
        .bind(update.asset_path.as_deref())
        .bind(failure_kind)
        .bind(failure_message)
        .bind(allowed.as_slice())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Raise progress; never lowers it. Returns `false` if the job is missing.
    pub async fn raise_progress(
        pool: &PgPool,
        id: DbId,
        progress: u8,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET progress = GREATEST(progress, $2), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(i16::from(progress.min(100)))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
