//! Configuration management for the gallery service.
//!
//! Configuration is layered: file sources first, then `GALLERY__`-prefixed
//! environment variables (e.g. `GALLERY__STORE__REGION` maps to
//! `store.region`).

use catalog::VersionCutovers;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the gallery service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Table store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Snapshot cache configuration
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// External image search configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Generation dispatch configuration
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Table store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack)
    pub endpoint_url: Option<String>,
    /// Image records table
    #[serde(default = "default_images_table")]
    pub images_table: String,
    /// Artist records table
    #[serde(default = "default_artists_table")]
    pub artists_table: String,
    /// Genre records table
    #[serde(default = "default_genres_table")]
    pub genres_table: String,
    /// Control table holding change signals
    #[serde(default = "default_control_table")]
    pub control_table: String,
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Reload interval in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Version bucket cutover: last id of version 1
    #[serde(default = "default_v1_max")]
    pub version1_max_id: i64,
    /// Version bucket cutover: last id of version 2
    #[serde(default = "default_v2_max")]
    pub version2_max_id: i64,
    /// Version bucket cutover: last id of version 3
    #[serde(default = "default_v3_max")]
    pub version3_max_id: i64,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Dev environment flag gating mutating actions
    #[serde(default)]
    pub dev_mode: bool,
}

/// External image search configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint base URL
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Search region hint
    #[serde(default = "default_search_region")]
    pub region: String,
    /// Default result limit
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
}

/// Generation dispatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Name of the generator function to invoke
    #[serde(default = "default_generator_function")]
    pub function_name: String,
}

// Default value functions
fn default_service_name() -> String {
    "gallery-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_images_table() -> String {
    "gallery-images".to_string()
}

fn default_artists_table() -> String {
    "gallery-artists".to_string()
}

fn default_genres_table() -> String {
    "gallery-genres".to_string()
}

fn default_control_table() -> String {
    "gallery-control".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_v1_max() -> i64 {
    VersionCutovers::default().v1_max
}

fn default_v2_max() -> i64 {
    VersionCutovers::default().v2_max
}

fn default_v3_max() -> i64 {
    VersionCutovers::default().v3_max
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_search_endpoint() -> String {
    "https://duckduckgo.com".to_string()
}

fn default_search_region() -> String {
    "us-en".to_string()
}

fn default_search_limit() -> i64 {
    8
}

fn default_generator_function() -> String {
    "gallery-generator".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/gallery/gallery").required(false))
            // GALLERY__STORE__REGION -> store.region
            .add_source(
                config::Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the snapshot refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot.refresh_interval_secs)
    }

    /// Version bucket cutovers for record derivation
    pub fn version_cutovers(&self) -> VersionCutovers {
        VersionCutovers {
            v1_max: self.snapshot.version1_max_id,
            v2_max: self.snapshot.version2_max_id,
            v3_max: self.snapshot.version3_max_id,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            images_table: default_images_table(),
            artists_table: default_artists_table(),
            genres_table: default_genres_table(),
            control_table: default_control_table(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            version1_max_id: default_v1_max(),
            version2_max_id: default_v2_max(),
            version3_max_id: default_v3_max(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            dev_mode: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            region: default_search_region(),
            default_limit: default_search_limit(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            function_name: default_generator_function(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_refresh_interval_secs(), 300);
        assert_eq!(default_search_limit(), 8);
        assert_eq!(default_v1_max(), 1_690_216_293);
    }

    #[test]
    fn test_cutovers_from_config() {
        let config = SnapshotConfig::default();
        let cutovers = Config {
            service: ServiceConfig::default(),
            store: StoreConfig::default(),
            snapshot: config,
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            generator: GeneratorConfig::default(),
        }
        .version_cutovers();
        assert_eq!(cutovers, VersionCutovers::default());
    }
}
