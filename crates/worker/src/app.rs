//! Wires the pipeline components from a [`WorkerConfig`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use vidchain_core::scene::Project;
use vidchain_core::store::{JobStore, MemoryStore};
use vidchain_core::template::PromptTemplate;
use vidchain_events::{EventBus, EventLogger};
use vidchain_genapi::{GenerationApi, HttpDownloader};
use vidchain_pipeline::{
    FfmpegToolkit, FrameExtractor, GenerationEngine, ImageGenerator, MediaToolkit, Merger,
    PipelineConfig, SceneChainOrchestrator, TextGenerator,
};

use crate::config::WorkerConfig;

/// Every long-lived component the commands need.
pub struct App {
    pub config: WorkerConfig,
    pub events: Arc<EventBus>,
    pub engine: Arc<GenerationEngine>,
    pub toolkit: Arc<dyn MediaToolkit>,
    pipeline: PipelineConfig,
    logger: JoinHandle<u64>,
}

impl App {
    pub async fn build(config: WorkerConfig) -> anyhow::Result<Self> {
        let store = open_store(&config).await?;

        let service = GenerationApi::new(
            config.api_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )
        .context("Failed to build generation API client")?;
        // Download deadlines are enforced by the engine, not the client.
        let downloader = HttpDownloader::new(
            reqwest::Client::new(),
            config.api_key.clone(),
            &config.api_url,
        );

        let events = Arc::new(EventBus::default());
        let logger = tokio::spawn(EventLogger::run(events.subscribe()));

        let pipeline = config.pipeline_config();
        let engine = Arc::new(
            GenerationEngine::new(
                Arc::new(service),
                Arc::new(downloader),
                store,
                pipeline.engine.clone(),
            )
            .with_events(Arc::clone(&events)),
        );

        tracing::info!(
            api_url = %config.api_url,
            output_dir = %pipeline.engine.output_dir.display(),
            "Worker ready"
        );

        Ok(Self {
            config,
            events,
            engine,
            toolkit: Arc::new(FfmpegToolkit),
            pipeline,
            logger,
        })
    }

    pub fn text(&self) -> TextGenerator {
        TextGenerator::new(Arc::clone(&self.engine))
    }

    pub fn image(&self) -> ImageGenerator {
        ImageGenerator::new(Arc::clone(&self.engine))
            .with_preprocess(self.pipeline.preprocess.clone())
            .with_mismatch_policy(self.pipeline.frame_mismatch)
    }

    pub fn extractor(&self) -> FrameExtractor {
        FrameExtractor::new(Arc::clone(&self.toolkit), self.pipeline.frames_dir.clone())
    }

    pub fn orchestrator(&self) -> SceneChainOrchestrator {
        SceneChainOrchestrator::new(self.text(), self.image(), Arc::new(self.extractor()))
            .with_events(Arc::clone(&self.events))
    }

    pub fn merger(&self) -> Merger {
        Merger::new(Arc::clone(&self.toolkit), self.pipeline.merged_dir.clone())
            .with_events(Arc::clone(&self.events))
    }

    /// Drop the bus and wait for the logger to drain it.
    pub async fn shutdown(self) {
        let Self { events, engine, logger, .. } = self;
        drop(engine);
        drop(events);
        match logger.await {
            Ok(seen) => tracing::debug!(events = seen, "Event logger stopped"),
            Err(e) => tracing::warn!(error = %e, "Event logger task failed"),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-process store.
async fn open_store(config: &WorkerConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, keeping job records in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = vidchain_db::create_pool(url)
        .await
        .context("Failed to connect to database")?;
    vidchain_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    vidchain_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database connected and migrations applied");

    Ok(Arc::new(vidchain_db::PgStore::new(pool)))
}

pub fn load_project(path: &Path) -> anyhow::Result<Project> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid project file {}", path.display()))
}

pub fn save_project(path: &Path, project: &Project) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(project).context("Failed to serialize project")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write project file {}", path.display()))
}

pub fn load_template(path: &Path) -> anyhow::Result<PromptTemplate> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid template file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use vidchain_core::request::OutputConfig;
    use vidchain_core::scene::{ChainMode, Scene};

    use super::*;

    #[test]
    fn project_file_round_trips_scene_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");

        let mut project = Project::new("Coast").with_template("golden hour");
        project
            .add_scene(Scene::new("Waves roll in", OutputConfig::default()))
            .unwrap();
        project
            .add_scene(
                Scene::new("Gulls take off", OutputConfig::default())
                    .with_chain_mode(ChainMode::ExtendFromPrevious),
            )
            .unwrap();

        save_project(&path, &project).unwrap();
        let loaded = load_project(&path).unwrap();

        assert_eq!(loaded, project);
        assert_eq!(loaded.scenes()[1].chain_mode, ChainMode::ExtendFromPrevious);
    }

    #[test]
    fn minimal_project_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"name": "Short", "scenes": [{"prompt": "A lighthouse at night"}]}"#,
        )
        .unwrap();

        let project = load_project(&path).unwrap();

        assert_eq!(project.default_model, "veo-2.0");
        assert_eq!(project.scenes()[0].config, OutputConfig::default());
        assert_eq!(project.scenes()[0].chain_mode, ChainMode::None);
    }

    #[test]
    fn template_file_loads_partial_components() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warm.json");
        std::fs::write(
            &path,
            r#"{"name": "Warm", "base_style": "cinematic", "color": "amber tones"}"#,
        )
        .unwrap();

        let template = load_template(&path).unwrap();

        assert_eq!(template.name, "Warm");
        assert_eq!(template.apply("A market"), "A market. cinematic. amber tones.");
    }

    #[test]
    fn project_style_survives_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("styled.json");
        let mut project =
            Project::new("Styled").with_style(PromptTemplate::new("Soft").with_lighting("diffuse"));
        project
            .add_scene(Scene::new("A garden", OutputConfig::default()))
            .unwrap();

        save_project(&path, &project).unwrap();
        let loaded = load_project(&path).unwrap();

        assert_eq!(loaded.scene_prompt(0).unwrap(), "A garden. diffuse.");
    }

    #[test]
    fn unreadable_project_names_the_file() {
        let err = load_project(Path::new("/nonexistent/project.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/project.json"));
    }
}
