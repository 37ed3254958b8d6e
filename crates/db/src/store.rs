//! [`JobStore`] backed by Postgres.

use async_trait::async_trait;
use vidchain_core::store::{
    JobRecord, JobStore, JobUpdate, NewJobRecord, NewSceneRecord, SceneRecord, SceneUpdate,
    StoreError,
};
use vidchain_core::types::DbId;

use crate::repositories::{JobRepo, SceneRepo};
use crate::DbPool;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: NewJobRecord) -> Result<DbId, StoreError> {
        JobRepo::insert(&self.pool, &job).await.map_err(backend)
    }

    async fn update_job(&self, id: DbId, update: JobUpdate) -> Result<(), StoreError> {
        if JobRepo::transition(&self.pool, id, &update)
            .await
            .map_err(backend)?
        {
            return Ok(());
        }

        // Nothing matched: tell a missing job apart from a rejected move.
        match JobRepo::find_by_id(&self.pool, id).await.map_err(backend)? {
            None => Err(StoreError::NotFound { entity: "job", id }),
            Some(row) => Err(StoreError::InvalidTransition {
                id,
                from: row.status()?,
                to: update.status,
            }),
        }
    }

    async fn update_progress(&self, id: DbId, progress: u8) -> Result<(), StoreError> {
        if JobRepo::raise_progress(&self.pool, id, progress)
            .await
            .map_err(backend)?
        {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "job", id })
        }
    }

    async fn get_job(&self, id: DbId) -> Result<JobRecord, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound { entity: "job", id })?
            .into_record()
    }

    async fn create_scene(&self, scene: NewSceneRecord) -> Result<DbId, StoreError> {
        SceneRepo::insert(&self.pool, &scene).await.map_err(backend)
    }

    async fn update_scene(&self, id: DbId, update: SceneUpdate) -> Result<(), StoreError> {
        if SceneRepo::update(&self.pool, id, &update)
            .await
            .map_err(backend)?
        {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "scene", id })
        }
    }

    async fn get_scene(&self, id: DbId) -> Result<SceneRecord, StoreError> {
        SceneRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound { entity: "scene", id })?
            .into_record()
    }
}
