//! Sinkin AI text-to-image backend.
//!
//! Unlike Stability, Sinkin returns hosted image URLs; the artifact is
//! downloaded to the save directory before upload so both backends hand
//! the orchestrator the same shape.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::engine::{artifact_filename, EngineError, ImageArtifact, ImageEngine, TextToImageRequest};

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

pub struct SinkinEngine {
    http: reqwest::Client,
    host: String,
    api_key: String,
    save_directory: PathBuf,
}

impl SinkinEngine {
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        save_directory: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| EngineError::Request(e.to_string()))?;
        Ok(Self {
            http,
            host: host.into(),
            api_key: api_key.into(),
            save_directory: save_directory.into(),
        })
    }
}

#[async_trait]
impl ImageEngine for SinkinEngine {
    fn name(&self) -> &str {
        "sinkin"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn text_to_image(
        &self,
        request: &TextToImageRequest,
    ) -> Result<ImageArtifact, EngineError> {
        let mut form = vec![
            ("access_token", self.api_key.clone()),
            ("model_id", request.model.clone()),
            ("prompt", request.prompt.clone()),
            ("width", request.width.to_string()),
            ("height", request.height.to_string()),
            ("steps", request.steps.to_string()),
            ("scale", request.cfg_scale.to_string()),
            ("num_images", "1".to_string()),
        ];
        if let Some(ref negative) = request.negative_prompt {
            form.push(("negative_prompt", negative.clone()));
        }
        if let Some(seed) = request.seed {
            form.push(("seed", seed.to_string()));
        }

        debug!("Requesting inference");
        let response: InferenceResponse = self
            .http
            .post(format!("{}/m/inference", self.host))
            .form(&form)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| EngineError::Request(format!("malformed sinkin response: {e}")))?;

        if response.error_code != 0 {
            return Err(EngineError::Request(format!(
                "sinkin error {}: {}",
                response.error_code,
                response.message.unwrap_or_default()
            )));
        }
        let image_url = response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Request("sinkin returned no images".into()))?;

        let bytes = self
            .http
            .get(&image_url)
            .send()
            .await
            .map_err(|e| EngineError::Request(format!("artifact download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| EngineError::Request(format!("artifact download failed: {e}")))?;

        let filename = artifact_filename(request.filename_prefix.as_deref());
        let filepath = self.save_directory.join(&filename);
        tokio::fs::write(&filepath, &bytes).await?;

        info!(filename = %filename, "Generated image");
        Ok(ImageArtifact {
            filename,
            filepath,
            seed: request.seed.unwrap_or(0),
            steps: request.steps,
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            engine_name: self.name().to_string(),
        })
    }
}
