//! tinyci server

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tinyci_core::Notifier;
use tinyci_executor::LocalProcessRunner;
use tinyci_scheduler::CiService;
use tinyci_server::services::{GitHubNotifier, LogNotifier};
use tinyci_server::{AppState, Config, LogFormat, routes};
use tinyci_store::FileBuildRepo;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    let repo = FileBuildRepo::open(&config.builds_root)
        .await
        .context("Failed to open build store")?
        .with_max_slice_bytes(config.log_slice_max);
    info!(root = %repo.root().display(), "Build store ready");

    let runner = LocalProcessRunner::new(&config.workspace_root)
        .context("Failed to resolve workspace root")?;

    let notifier: Arc<dyn Notifier> = match &config.github_token {
        Some(token) => {
            info!(api = %config.github_api_url, "Publishing commit statuses to GitHub");
            Arc::new(GitHubNotifier::new(&config.github_api_url, token))
        }
        None => {
            info!("No GitHub token configured, commit statuses are only logged");
            Arc::new(LogNotifier)
        }
    };

    let service = Arc::new(CiService::new(Arc::new(repo), Arc::new(runner), notifier));
    service.report_unfinished().await?;
    service.start().await?;

    let app = routes::router(AppState::new(service.clone())).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.bind);
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for the current build to finish");
    service.stop().await;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
