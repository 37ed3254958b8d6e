//! Repository for the `scenes` table.

use sqlx::PgPool;
use vidchain_core::status::SceneStatus;
use vidchain_core::store::{NewSceneRecord, SceneUpdate};
use vidchain_core::types::DbId;

use crate::models::scene::SceneRow;

const COLUMNS: &str = "\
    id, project, ordinal, prompt, chain_mode, status_id, job_id, asset_path, \
    failure_kind, failure_message, created_at, updated_at";

pub struct SceneRepo;

impl SceneRepo {
    pub async fn insert(pool: &PgPool, input: &NewSceneRecord) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as(
            "INSERT INTO scenes (project, ordinal, prompt, chain_mode, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(&input.project)
        .bind(i32::try_from(input.ordinal).unwrap_or(i32::MAX))
        .bind(&input.prompt)
        .bind(input.chain_mode.as_str())
        .bind(SceneStatus::Pending.id())
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SceneRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scenes WHERE id = $1");
        sqlx::query_as::<_, SceneRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the scene status and any supplied outcome fields.
    ///
    /// Moving to `Generating` clears the previous run's asset and failure.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        update: &SceneUpdate,
    ) -> Result<bool, sqlx::Error> {
        let (failure_kind, failure_message) = match &update.failure {
            Some(f) => (Some(f.kind.as_str()), Some(f.message.as_str())),
            None => (None, None),
        };
        let reset = update.status == SceneStatus::Generating;

        let result = sqlx::query(
            "UPDATE scenes SET \
                 status_id = $2, \
                 job_id = COALESCE($3, job_id), \
                 asset_path = CASE WHEN $7 THEN $4 ELSE COALESCE($4, asset_path) END, \
                 failure_kind = CASE WHEN $7 THEN $5 ELSE COALESCE($5, failure_kind) END, \
                 failure_message = CASE WHEN $7 THEN $6 ELSE COALESCE($6, failure_message) END, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.status.id())
        .bind(update.job_id)
        .bind(update.asset_path.as_deref())
        .bind(failure_kind)
        .bind(failure_message)
        .bind(reset)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
