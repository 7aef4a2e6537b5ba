mod api;
mod config;
mod curation;
mod error;
mod image_search;
mod selection;
mod snapshot;
mod trigger;

use anyhow::{Context, Result};
use api::{start_api_server, AppState};
use catalog::artists::{ArtistDirectory, GenreStore};
use catalog::signal::TableSignal;
use catalog::store::{dynamo_client, DynamoTable, Table};
use config::Config;
use image_search::SearchClient;
use snapshot::SnapshotCache;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trigger::LambdaTrigger;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        dev_mode = config.api.dev_mode,
        "Starting Gallery Service"
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

    // Artist directory and snapshot cache, loaded before serving
    let directory = Arc::new(ArtistDirectory::new(artists_table.clone()));
    directory
        .load()
        .await
        .context("Failed to load artist directory")?;

    let cache = Arc::new(SnapshotCache::new(
        images.clone(),
        Arc::new(TableSignal::new(control_table, "images")),
        config.version_cutovers(),
        config.refresh_interval(),
    ));
    cache.load().await.context("Failed to load image snapshot")?;

    let search = Arc::new(SearchClient::new(&config.search).context("Failed to build search client")?);
    let trigger = Arc::new(
        LambdaTrigger::new(&config.store.region, &config.generator.function_name).await,
    );

    let state = AppState {
        images,
        artists_table,
        directory,
        genres: Arc::new(GenreStore::new(genres_table)),
        cache,
        search,
        trigger,
        search_endpoint: config.search.endpoint.clone(),
        search_default_limit: config.search.default_limit,
        dev_mode: config.api.dev_mode,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    info!("Gallery service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down gallery service");
    api_handle.abort();
    info!("Gallery service stopped");

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
