//! Configuration management for the generator service.
//!
//! Layered like the gallery: file sources first, then
//! `GENERATOR__`-prefixed environment variables (e.g.
//! `GENERATOR__S3__BUCKET` maps to `s3.bucket`).

use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the generator service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Table store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Artwork bucket configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Secrets store configuration
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Generation engine configuration
    #[serde(default)]
    pub engines: EnginesConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
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

/// Artwork bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving generated artwork
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO/LocalStack)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Key prefix for uploaded artwork
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
}

/// Secrets store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Secret holding the generation API keys
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
}

/// Generation engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnginesConfig {
    /// Directory generated artifacts are written to before upload
    #[serde(default = "default_save_directory")]
    pub save_directory: String,
    /// Model used when an artist has no preference
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Stability API base URL
    #[serde(default = "default_stability_host")]
    pub stability_host: String,
    /// Model ids served by the Stability backend
    #[serde(default = "default_stability_models")]
    pub stability_models: Vec<String>,
    /// Sinkin API base URL
    #[serde(default = "default_sinkin_host")]
    pub sinkin_host: String,
    /// Model ids served by the Sinkin backend
    #[serde(default = "default_sinkin_models")]
    pub sinkin_models: Vec<String>,
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
}

// Default value functions
fn default_service_name() -> String {
    "generator-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9091
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

fn default_bucket() -> String {
    "gallery-artwork".to_string()
}

fn default_key_prefix() -> String {
    "images".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_secret_name() -> String {
    "gallery/api_keys".to_string()
}

fn default_save_directory() -> String {
    "/tmp".to_string()
}

fn default_model() -> String {
    "sdxl".to_string()
}

fn default_stability_host() -> String {
    "https://api.stability.ai".to_string()
}

fn default_stability_models() -> Vec<String> {
    vec!["sd-1.5".to_string(), "sdxl".to_string(), "sdxl-1.0".to_string()]
}

fn default_sinkin_host() -> String {
    "https://sinkin.ai".to_string()
}

fn default_sinkin_models() -> Vec<String> {
    vec!["deliberate".to_string(), "rev-animated".to_string()]
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8081
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/generator").required(false))
            .add_source(config::File::with_name("/etc/gallery/generator").required(false))
            // GENERATOR__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("GENERATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
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

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            key_prefix: default_key_prefix(),
            presigned_url_expiry_secs: default_presigned_url_expiry_secs(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            secret_name: default_secret_name(),
            region: default_region(),
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            default_model: default_model(),
            stability_host: default_stability_host(),
            stability_models: default_stability_models(),
            sinkin_host: default_sinkin_host(),
            sinkin_models: default_sinkin_models(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_presigned_url_expiry_secs(), 3600);
        assert_eq!(default_key_prefix(), "images");
        assert!(default_stability_models().contains(&"sdxl".to_string()));
    }
}
