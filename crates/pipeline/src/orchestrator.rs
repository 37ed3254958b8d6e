//! Scene chain orchestration.
//!
//! Scenes run strictly in ordinal order. Before each scene the
//! orchestrator resolves its inputs:
//!
//! | Chain mode           | Prerequisite             | Input                                |
//! |----------------------|--------------------------|--------------------------------------|
//! | `None`               | none                     | scene's own frames, else text        |
//! | `UsePreviousFrame`   | previous scene Completed | previous last frame as source image  |
//! | `ExtendFromPrevious` | previous scene Completed | as above, aspect locked to previous  |
//!
//! A scene whose prerequisite did not complete fails with a
//! `dependency_failed` outcome without touching the service, which in turn
//! fails any scene chained to it. Independent scenes after a failure still
//! run. Generation failures never abort the sequence; only an invalid
//! project, missing chaining support or a store failure while creating
//! scene records do.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vidchain_core::error::CoreError;
use vidchain_core::outcome::FailureDetail;
use vidchain_core::request::{GenerationRequest, RequestKind};
use vidchain_core::scene::{ChainMode, Project};
use vidchain_core::status::SceneStatus;
use vidchain_core::store::{JobStore, NewSceneRecord, SceneUpdate, StoreError};
use vidchain_core::types::DbId;
use vidchain_events::{event_types, EventBus, PipelineEvent};

use crate::engine::{JobOutcome, RunContext};
use crate::error::GenerationError;
use crate::extractor::FrameExtractor;
use crate::image::ImageGenerator;
use crate::progress::{ChannelProgress, ProgressUpdate, SequenceProgress, SequenceStage};
use crate::text::TextGenerator;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid project: {0}")]
    InvalidProject(#[from] CoreError),

    #[error("Project uses scene chaining but ffmpeg/ffprobe is not available")]
    ChainingUnavailable,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of one scene in a sequence run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneOutcome {
    pub scene_id: Option<DbId>,
    pub ordinal: usize,
    pub status: SceneStatus,
    pub asset_path: Option<PathBuf>,
    pub job_id: Option<DbId>,
    pub failure: Option<FailureDetail>,
}

impl SceneOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == SceneStatus::Completed
    }
}

pub struct SceneChainOrchestrator {
    text: TextGenerator,
    image: ImageGenerator,
    extractor: Arc<FrameExtractor>,
    store: Arc<dyn JobStore>,
    events: Option<Arc<EventBus>>,
}

impl SceneChainOrchestrator {
    pub fn new(text: TextGenerator, image: ImageGenerator, extractor: Arc<FrameExtractor>) -> Self {
        let store = text.engine().store().clone();
        Self {
            text,
            image,
            extractor,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Generate every scene of `project` in order, recording outcomes on
    /// the project's scenes and in the store.
    ///
    /// `progress` receives `processing` before each scene and for every
    /// progress report of the scene's job, then the scene's terminal stage,
    /// and a final `done`. Once `cancel` fires the running
    /// scene ends `Cancelled` and the remaining scenes are `Skipped`.
    pub async fn generate_sequence(
        &self,
        project: &mut Project,
        progress: &dyn SequenceProgress,
        cancel: CancellationToken,
    ) -> Result<Vec<SceneOutcome>, OrchestratorError> {
        project.validate()?;

        if project.has_chained_scenes() && !self.extractor.is_available().await {
            tracing::error!(project = %project.name, "Scene chaining requires ffmpeg");
            return Err(OrchestratorError::ChainingUnavailable);
        }

        project.reset_outcomes();
        self.ensure_scene_records(project).await?;

        let total = project.len();
        tracing::info!(project = %project.name, scenes = total, "Starting sequence");
        let mut outcomes = Vec::with_capacity(total);

        for index in 0..total {
            let scene_id = project.scene(index).and_then(|s| s.id);
            let number = index + 1;

            if cancel.is_cancelled() {
                self.record(project, index, SceneStatus::Skipped, None).await;
                let message = format!("Scene {number}/{total} skipped");
                progress.on_scene(index, total, SequenceStage::Skipped, &message);
                self.publish(PipelineEvent::scene(event_types::SCENE_SKIPPED, scene_id, index));
                outcomes.push(self.outcome_of(project, index));
                continue;
            }

            progress.on_scene(
                index,
                total,
                SequenceStage::Processing,
                &format!("Generating scene {number}/{total}"),
            );
            self.record(project, index, SceneStatus::Generating, None).await;
            self.publish(PipelineEvent::scene(event_types::SCENE_STARTED, scene_id, index));

            let result = match self.build_request(project, index).await {
                Ok(request) => {
                    lock_extended_aspect(project, index, &request);
                    let ctx = RunContext::default()
                        .with_scene(scene_id)
                        .with_cancel(cancel.clone());
                    let scene = SceneProgress {
                        progress,
                        index,
                        total,
                    };
                    self.run_forwarding(&request, ctx, &scene).await
                }
                Err(e) => {
                    tracing::warn!(scene = number, error = %e, "Scene not attempted");
                    JobOutcome::rejected(&e)
                }
            };

            let (status, result) = settle(result);
            self.record(project, index, status, Some(&result)).await;

            let (stage, event, message) = match status {
                SceneStatus::Completed => (
                    SequenceStage::Completed,
                    event_types::SCENE_COMPLETED,
                    format!("Scene {number}/{total} completed"),
                ),
                SceneStatus::Cancelled => (
                    SequenceStage::Cancelled,
                    event_types::SCENE_FAILED,
                    format!("Scene {number}/{total} cancelled"),
                ),
                _ => (
                    SequenceStage::Failed,
                    event_types::SCENE_FAILED,
                    format!(
                        "Scene {number}/{total} failed: {}",
                        result
                            .failure
                            .as_ref()
                            .map(|f| f.message.as_str())
                            .unwrap_or("unknown error")
                    ),
                ),
            };
            progress.on_scene(index, total, stage, &message);
            self.publish(PipelineEvent::scene(event, scene_id, index).with_payload(
                serde_json::json!({
                    "status": status.as_str(),
                    "job_id": result.job_id,
                }),
            ));
            outcomes.push(self.outcome_of(project, index));
        }

        let succeeded = outcomes.iter().filter(|o| o.is_completed()).count();
        let summary = format!("Sequence complete: {succeeded}/{total} scenes successful");
        tracing::info!(project = %project.name, succeeded, total, "Sequence finished");
        progress.on_scene(total, total, SequenceStage::Done, &summary);
        self.publish(
            PipelineEvent::project(event_types::SEQUENCE_COMPLETED, project.id, &project.name)
                .with_payload(serde_json::json!({ "succeeded": succeeded, "total": total })),
        );

        Ok(outcomes)
    }

    async fn ensure_scene_records(&self, project: &mut Project) -> Result<(), StoreError> {
        let name = project.name.clone();
        for index in 0..project.len() {
            let Some(scene) = project.scene_mut(index) else {
                continue;
            };
            if scene.id.is_some() {
                continue;
            }
            let id = self
                .store
                .create_scene(NewSceneRecord {
                    project: name.clone(),
                    ordinal: scene.ordinal,
                    prompt: scene.prompt.clone(),
                    chain_mode: scene.chain_mode,
                })
                .await?;
            scene.id = Some(id);
        }
        Ok(())
    }

    /// Run `request` while relaying its job progress to the sequence
    /// observer as `processing` updates for the scene.
    async fn run_forwarding(
        &self,
        request: &GenerationRequest,
        ctx: RunContext,
        scene: &SceneProgress<'_>,
    ) -> JobOutcome {
        let (sink, mut updates) = ChannelProgress::new();
        let ctx = ctx.with_progress(Arc::new(sink));

        let run = self.run_request(request, &ctx);
        tokio::pin!(run);
        let outcome = loop {
            tokio::select! {
                biased;
                Some(update) = updates.recv() => scene.forward(&update),
                outcome = &mut run => break outcome,
            }
        };
        while let Ok(update) = updates.try_recv() {
            scene.forward(&update);
        }
        outcome
    }

    async fn run_request(&self, request: &GenerationRequest, ctx: &RunContext) -> JobOutcome {
        match request.kind() {
            RequestKind::Text => self.text.generate_request(request, ctx).await,
            RequestKind::Image { .. } | RequestKind::Transition { .. } => {
                self.image.generate(request, ctx).await
            }
        }
    }

    /// Resolve the scene at `index` into a request, extracting the previous
    /// scene's last frame when the scene is chained.
    async fn build_request(
        &self,
        project: &Project,
        index: usize,
    ) -> Result<GenerationRequest, GenerationError> {
        let scene = project
            .scene(index)
            .ok_or_else(|| GenerationError::Internal(format!("no scene at {index}")))?;
        let prompt = project.scene_prompt(index).unwrap_or_default();
        let model = project.scene_model(index).unwrap_or_default().to_string();
        let mut config = scene.config.clone();

        let request = match scene.chain_mode {
            ChainMode::None => match (&scene.first_frame, &scene.last_frame) {
                (Some(first), Some(last)) => {
                    GenerationRequest::transition(model, prompt, config, first, last)
                }
                (Some(first), None) => {
                    GenerationRequest::image(model, prompt, config, first, scene.references.clone())
                }
                (None, Some(_)) => {
                    return Err(GenerationError::Validation(format!(
                        "Scene {}: a last frame needs a first frame",
                        index + 1
                    )));
                }
                (None, None) if !scene.references.is_empty() => {
                    return Err(GenerationError::Validation(format!(
                        "Scene {}: reference images need a source image",
                        index + 1
                    )));
                }
                (None, None) => GenerationRequest::text(model, prompt, config),
            },
            mode @ (ChainMode::UsePreviousFrame | ChainMode::ExtendFromPrevious) => {
                let previous = index
                    .checked_sub(1)
                    .and_then(|i| project.scene(i))
                    .ok_or_else(|| {
                        GenerationError::DependencyFailed(format!(
                            "Scene {} has no previous scene to chain from",
                            index + 1
                        ))
                    })?;
                let Some(video) = previous.asset_path.as_ref().filter(|_| previous.is_completed())
                else {
                    return Err(GenerationError::DependencyFailed(format!(
                        "Scene {} depends on scene {}, which did not complete",
                        index + 1,
                        index
                    )));
                };

                // Frames are keyed by the store id so concurrent runs never share a file.
                let label = match previous.id {
                    Some(id) => id.to_string(),
                    None => format!("{}_{}", project.name, index - 1),
                };
                let frame = self
                    .extractor
                    .extract_last_frame(video, &label)
                    .await
                    .map_err(|e| GenerationError::Extraction(e.to_string()))?;

                // The previous scene's config already holds the ratio it was
                // generated with; see `lock_extended_aspect`.
                if mode == ChainMode::ExtendFromPrevious {
                    config.aspect_ratio = previous.config.aspect_ratio;
                }

                match &scene.last_frame {
                    Some(last) => GenerationRequest::transition(model, prompt, config, frame, last),
                    None => GenerationRequest::image(
                        model,
                        prompt,
                        config,
                        frame,
                        scene.references.clone(),
                    ),
                }
            }
        };

        Ok(request?)
    }

    /// Apply a scene transition to the project and the store.
    ///
    /// Store failures are logged; the in-memory project stays authoritative
    /// for the rest of the run.
    async fn record(
        &self,
        project: &mut Project,
        index: usize,
        status: SceneStatus,
        result: Option<&JobOutcome>,
    ) {
        let Some(scene) = project.scene_mut(index) else {
            return;
        };
        scene.status = status;
        if let Some(result) = result {
            scene.job_id = result.job_id;
            scene.asset_path = result.asset_path.clone();
            scene.failure = result.failure.clone();
        }

        let Some(id) = scene.id else {
            return;
        };
        let update = SceneUpdate {
            status,
            job_id: scene.job_id,
            asset_path: scene
                .asset_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            failure: scene.failure.clone(),
        };
        if let Err(e) = self.store.update_scene(id, update).await {
            tracing::warn!(
                scene_id = id,
                status = status.as_str(),
                error = %e,
                "Failed to record scene status"
            );
        }
    }

    fn outcome_of(&self, project: &Project, index: usize) -> SceneOutcome {
        match project.scene(index) {
            Some(scene) => SceneOutcome {
                scene_id: scene.id,
                ordinal: scene.ordinal,
                status: scene.status,
                asset_path: scene.asset_path.clone(),
                job_id: scene.job_id,
                failure: scene.failure.clone(),
            },
            None => SceneOutcome {
                scene_id: None,
                ordinal: index,
                status: SceneStatus::Failed,
                asset_path: None,
                job_id: None,
                failure: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Relays one scene's job progress to a [`SequenceProgress`].
struct SceneProgress<'a> {
    progress: &'a dyn SequenceProgress,
    index: usize,
    total: usize,
}

impl SceneProgress<'_> {
    fn forward(&self, update: &ProgressUpdate) {
        let message = format!(
            "Scene {}/{}: {}% - {}",
            self.index + 1,
            self.total,
            update.percent,
            update.label
        );
        self.progress
            .on_scene(self.index, self.total, SequenceStage::Processing, &message);
    }
}

/// Store the ratio an extended scene is generated with back on the scene,
/// so a later scene extending it locks to the same ratio.
fn lock_extended_aspect(project: &mut Project, index: usize, request: &GenerationRequest) {
    if let Some(scene) = project.scene_mut(index) {
        if scene.chain_mode == ChainMode::ExtendFromPrevious {
            scene.config.aspect_ratio = request.config().aspect_ratio;
        }
    }
}

/// Scene status for a finished job. A job that reports success without an
/// asset counts as failed.
fn settle(mut result: JobOutcome) -> (SceneStatus, JobOutcome) {
    let status = match SceneStatus::from_job(result.status) {
        SceneStatus::Completed if result.asset_path.is_none() => {
            if result.failure.is_none() {
                result.failure = Some(
                    GenerationError::Internal("job completed without an asset".into()).detail(),
                );
            }
            SceneStatus::Failed
        }
        status => status,
    };
    (status, result)
}
