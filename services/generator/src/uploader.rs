//! Artwork upload to the gallery bucket.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::S3Config;
use crate::engine::ImageArtifact;

/// Destination for generated artifacts. The production sink is the S3
/// artwork bucket; tests substitute an in-memory one.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store the artifact and return its public URL.
    async fn upload(&self, artifact: &ImageArtifact) -> Result<String>;
}

pub struct ArtifactUploader {
    client: S3Client,
    bucket: String,
    key_prefix: String,
    presigned_url_expiry: Duration,
}

impl ArtifactUploader {
    /// Create a new uploader against the artwork bucket.
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Artifact uploader initialized"
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            presigned_url_expiry: Duration::from_secs(config.presigned_url_expiry_secs),
        })
    }

    fn object_key(&self, filename: &str) -> String {
        format!("{}/{}", self.key_prefix, filename)
    }

    /// Time-limited GET URL for one uploaded artifact.
    pub async fn presigned_url(&self, filename: &str) -> Result<(String, DateTime<Utc>)> {
        let presigning_config = PresigningConfig::expires_in(self.presigned_url_expiry)
            .context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(filename))
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.presigned_url_expiry)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));

        Ok((presigned.uri().to_string(), expires_at))
    }
}

#[async_trait]
impl ArtifactSink for ArtifactUploader {
    /// Upload a generated artifact and return its public URL.
    #[instrument(skip(self, artifact), fields(filename = %artifact.filename))]
    async fn upload(&self, artifact: &ImageArtifact) -> Result<String> {
        let bytes = tokio::fs::read(&artifact.filepath)
            .await
            .context("Failed to read artifact from disk")?;
        let key = self.object_key(&artifact.filename);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type("image/png")
            .metadata("engine-name", &artifact.engine_name)
            .metadata("seed", artifact.seed.to_string())
            .metadata("width", artifact.width.to_string())
            .metadata("height", artifact.height.to_string())
            .send()
            .await
            .context("Failed to upload artifact")?;

        metrics::counter!("generator.artifacts.uploaded").increment(1);
        info!(key = %key, "Artifact uploaded");
        Ok(format!("https://{}/{}", self.bucket, key))
    }
}
