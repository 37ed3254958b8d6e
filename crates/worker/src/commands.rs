//! One handler per subcommand. Each prints its JSON result to stdout and
//! reports whether the run succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vidchain_core::request::RequestKind;
use vidchain_pipeline::{ProgressSink, RunContext, SequenceStage};

use crate::app::{self, App};
use crate::cli::GenerateArgs;

pub async fn generate(
    app: &App,
    args: &GenerateArgs,
    cancel: CancellationToken,
) -> anyhow::Result<bool> {
    let args = match &args.template {
        Some(path) => args.clone().styled(&app::load_template(path)?),
        None => args.clone(),
    };
    let request = args
        .to_request(&app.config.default_model)
        .context("Invalid generation arguments")?;

    let progress: Arc<dyn ProgressSink> = Arc::new(|percent: u8, label: &str| {
        tracing::info!(percent, label, "Progress");
    });
    let ctx = RunContext::default()
        .with_progress(progress)
        .with_cancel(cancel);

    let outcome = match request.kind() {
        RequestKind::Text => app.text().generate_request(&request, &ctx).await,
        _ => app.image().generate(&request, &ctx).await,
    };

    print_json(&outcome)?;
    Ok(outcome.is_completed())
}

pub async fn sequence(
    app: &App,
    project_path: &Path,
    merge: bool,
    output: Option<PathBuf>,
    save: bool,
    cancel: CancellationToken,
) -> anyhow::Result<bool> {
    let mut project = app::load_project(project_path)?;

    let progress = |index: usize, total: usize, stage: SequenceStage, message: &str| {
        tracing::info!(scene = index + 1, total, stage = %stage, "{message}");
    };
    let outcomes = app
        .orchestrator()
        .generate_sequence(&mut project, &progress, cancel)
        .await
        .context("Sequence could not start")?;

    if save {
        app::save_project(project_path, &project)?;
    }

    let all_completed = outcomes.iter().all(|o| o.is_completed());
    let merged = if merge && all_completed {
        Some(
            app.merger()
                .merge_sequence(&project, output)
                .await
                .context("Failed to merge scenes")?,
        )
    } else {
        if merge {
            tracing::warn!("Skipping merge, not every scene completed");
        }
        None
    };

    print_json(&serde_json::json!({
        "project": project.name,
        "scenes": outcomes,
        "merged": merged,
    }))?;
    Ok(all_completed)
}

pub async fn merge(app: &App, videos: &[PathBuf], output: Option<PathBuf>) -> anyhow::Result<bool> {
    let result = app
        .merger()
        .merge(videos, output)
        .await
        .context("Failed to merge videos")?;
    if !result.compatible {
        tracing::warn!("Inputs differ in resolution or frame rate, output may not play cleanly");
    }
    print_json(&result)?;
    Ok(true)
}

pub async fn probe(app: &App, video: &Path) -> anyhow::Result<bool> {
    let info = app
        .extractor()
        .probe(video)
        .await
        .with_context(|| format!("Failed to probe {}", video.display()))?;
    print_json(&info)?;
    Ok(true)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
