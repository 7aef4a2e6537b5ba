mod api;
mod config;
mod engine;
mod orchestrator;
mod prompt;
mod secrets;
mod sinkin;
mod stability;
mod uploader;

use anyhow::{Context, Result};
use api::{start_api_server, AppState};
use catalog::artists::{ArtistDirectory, GenreStore};
use catalog::signal::TableSignal;
use catalog::store::{dynamo_client, DynamoTable, Table};
use config::Config;
use engine::EngineRegistry;
use orchestrator::Orchestrator;
use sinkin::SinkinEngine;
use stability::StabilityEngine;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uploader::ArtifactUploader;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Generator Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Table adapters
    let client = dynamo_client(&config.store.region, config.store.endpoint_url.as_deref()).await;
    let images: Arc<dyn Table> = Arc::new(DynamoTable::new(
        client.clone(),
        &config.store.images_table,
        "filename",
        Some("create_time"),
    ));
    let artists_table: Arc<dyn Table> = Arc::new(DynamoTable::new(
        client.clone(),
        &config.store.artists_table,
        "id",
        None,
    ));
    let genres_table: Arc<dyn Table> = Arc::new(DynamoTable::new(
        client.clone(),
        &config.store.genres_table,
        "artist_id",
        Some("name"),
    ));
    let control_table: Arc<dyn Table> = Arc::new(DynamoTable::new(
        client,
        &config.store.control_table,
        "name",
        None,
    ));

    let directory = Arc::new(ArtistDirectory::new(artists_table));
    directory
        .load()
        .await
        .context("Failed to load artist directory")?;
    if directory.is_empty() {
        warn!("Artist directory is empty, generation jobs will fail");
    }

    // Generation backends, keyed by model id. A missing API key disables
    // that backend's models.
    let api_keys = secrets::fetch_api_keys(&config.secrets)
        .await
        .context("Failed to fetch API keys")?;
    let mut registry = EngineRegistry::new();
    if let Some(ref key) = api_keys.stability {
        let engine = Arc::new(StabilityEngine::new(
            &config.engines.stability_host,
            key,
            &config.engines.save_directory,
        )?);
        for model in &config.engines.stability_models {
            registry.register(model, engine.clone());
        }
    }
    if let Some(ref key) = api_keys.sinkin {
        let engine = Arc::new(SinkinEngine::new(
            &config.engines.sinkin_host,
            key,
            &config.engines.save_directory,
        )?);
        for model in &config.engines.sinkin_models {
            registry.register(model, engine.clone());
        }
    }
    if registry.is_empty() {
        warn!("No generation backends registered, every job will fail");
    } else {
        info!(models = ?registry.models(), "Generation backends registered");
    }

    let uploader = Arc::new(
        ArtifactUploader::new(&config.s3)
            .await
            .context("Failed to initialize artifact uploader")?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        directory,
        Arc::new(GenreStore::new(genres_table)),
        Arc::new(registry),
        uploader,
        images,
        Arc::new(TableSignal::new(control_table, "images")),
        &config.engines.default_model,
    ));

    // Spawn API server task
    let state = AppState { orchestrator };
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    info!("Generator service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down generator service");
    api_handle.abort();
    info!("Generator service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
