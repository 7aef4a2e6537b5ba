//! Fire-and-forget dispatch of generation jobs.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::ApiError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationTrigger: Send + Sync {
    /// Dispatch a generation job asynchronously. Returns once the job is
    /// accepted; completion is never awaited.
    async fn dispatch(&self, payload: Value) -> Result<(), ApiError>;
}

/// Lambda-backed trigger: invokes the generator function with the Event
/// invocation type.
pub struct LambdaTrigger {
    client: LambdaClient,
    function_name: String,
}

impl LambdaTrigger {
    pub async fn new(region: &str, function_name: impl Into<String>) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: LambdaClient::new(&aws_config),
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl GenerationTrigger for LambdaTrigger {
    #[instrument(skip(self, payload), fields(function = %self.function_name))]
    async fn dispatch(&self, payload: Value) -> Result<(), ApiError> {
        let body = serde_json::to_vec(&payload)
            .map_err(|e| ApiError::Upstream(format!("payload serialization failed: {e}")))?;

        self.client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("generation dispatch failed: {e}")))?;

        metrics::counter!("gallery.generate.dispatched").increment(1);
        info!("Generation job dispatched");
        Ok(())
    }
}
