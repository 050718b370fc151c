mod cluster;
mod config;
mod engine;
mod metrics;
mod models;
mod net;
mod notify;
mod reconciler;
mod registry;
mod version;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "updraft=info,kube=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Updraft - Kubernetes image version operator");

    let config = config::OperatorConfig::from_env();

    // Initialize metrics server
    let metrics_handle = metrics::start_metrics_server().await?;

    // Start the handler supervisor
    let client = kube::Client::try_default().await?;
    let supervisor_handle = reconciler::start(client, config).await?;

    info!("Updraft is running");

    // Wait for all services
    tokio::select! {
        _ = metrics_handle => info!("Metrics server stopped"),
        _ = supervisor_handle => info!("Handler supervisor stopped"),
    }

    Ok(())
}
