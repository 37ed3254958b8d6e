use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidchain_worker::app::App;
use vidchain_worker::cli::{Cli, Command};
use vidchain_worker::commands;
use vidchain_worker::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let app = App::build(config).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let succeeded = match &cli.command {
        Command::Generate(args) => commands::generate(&app, args, cancel).await,
        Command::Sequence {
            project,
            merge,
            output,
            save,
        } => commands::sequence(&app, project, *merge, output.clone(), *save, cancel).await,
        Command::Merge { videos, output } => commands::merge(&app, videos, output.clone()).await,
        Command::Probe { video } => commands::probe(&app, video).await,
    };

    app.shutdown().await;

    Ok(if succeeded? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "vidchain_worker=debug,vidchain_pipeline=debug,vidchain_events=info".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
