//! Postgres store tests. Run with `DATABASE_URL` set and `--ignored`.

use assert_matches::assert_matches;
use sqlx::PgPool;
use vidchain_core::outcome::{FailureDetail, FailureKind};
use vidchain_core::scene::ChainMode;
use vidchain_core::status::{JobStatus, SceneStatus};
use vidchain_core::store::{
    JobStore, JobUpdate, NewJobRecord, NewSceneRecord, SceneUpdate, StoreError,
};
use vidchain_db::PgStore;

fn new_job(scene_id: Option<i64>) -> NewJobRecord {
    NewJobRecord {
        scene_id,
        kind: "text_to_video".into(),
        model: "m1".into(),
        prompt: "A cat walks".into(),
        request: serde_json::json!({"prompt": "A cat walks"}),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lookup_tables_seeded(pool: PgPool) {
    vidchain_db::health_check(&pool).await.unwrap();
    for table in ["job_statuses", "scene_statuses"] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 6, "{table} should have six rows");
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn job_moves_forward_only(pool: PgPool) {
    let store = PgStore::new(pool);
    let id = store.create_job(new_job(None)).await.unwrap();

    store
        .update_job(id, JobUpdate::processing("op-1", 10))
        .await
        .unwrap();
    store.update_progress(id, 55).await.unwrap();
    store.update_progress(id, 30).await.unwrap();
    assert_eq!(store.get_job(id).await.unwrap().progress, 55);

    store
        .update_job(id, JobUpdate::completed("outputs/a.mp4"))
        .await
        .unwrap();

    let err = store
        .update_job(
            id,
            JobUpdate::failed(FailureDetail::new(FailureKind::GenerationFailed, "late")),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        StoreError::InvalidTransition { from: JobStatus::Completed, to: JobStatus::Failed, .. }
    );

    let job = store.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.operation_id.as_deref(), Some("op-1"));
    assert!(job.failure.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn missing_job_is_not_found(pool: PgPool) {
    let store = PgStore::new(pool);
    assert_matches!(
        store.update_job(404, JobUpdate::processing("op", 10)).await,
        Err(StoreError::NotFound { entity: "job", id: 404 })
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn scene_records_outcome(pool: PgPool) {
    let store = PgStore::new(pool);
    let scene_id = store
        .create_scene(NewSceneRecord {
            project: "trip".into(),
            ordinal: 1,
            prompt: "drive".into(),
            chain_mode: ChainMode::UsePreviousFrame,
        })
        .await
        .unwrap();
    let job_id = store.create_job(new_job(Some(scene_id))).await.unwrap();

    store
        .update_scene(
            scene_id,
            SceneUpdate {
                job_id: Some(job_id),
                failure: Some(FailureDetail::new(FailureKind::DependencyFailed, "scene 1 failed")),
                ..SceneUpdate::status(SceneStatus::Failed)
            },
        )
        .await
        .unwrap();

    let scene = store.get_scene(scene_id).await.unwrap();
    assert_eq!(scene.status, SceneStatus::Failed);
    assert_eq!(scene.chain_mode, ChainMode::UsePreviousFrame);
    assert_eq!(scene.job_id, Some(job_id));
    assert_eq!(scene.failure.unwrap().kind, FailureKind::DependencyFailed);

    store
        .update_scene(scene_id, SceneUpdate::status(SceneStatus::Generating))
        .await
        .unwrap();
    assert!(store.get_scene(scene_id).await.unwrap().failure.is_none());
}
