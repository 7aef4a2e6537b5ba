//! Stability AI text-to-image backend.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::engine::{artifact_filename, EngineError, ImageArtifact, ImageEngine, TextToImageRequest};

/// Stability API engine id behind each catalogue model id.
fn stability_engine_id(model: &str) -> Option<&'static str> {
    match model {
        "sd-1.5" => Some("stable-diffusion-v1-5"),
        "sdxl" => Some("stable-diffusion-xl-beta-v2-2-2"),
        "sdxl-1.0" => Some("stable-diffusion-xl-1024-v1-0"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    artifacts: Vec<GenerationArtifact>,
}

#[derive(Debug, Deserialize)]
struct GenerationArtifact {
    base64: String,
    #[serde(default)]
    seed: u64,
}

pub struct StabilityEngine {
    http: reqwest::Client,
    host: String,
    api_key: String,
    save_directory: PathBuf,
}

impl StabilityEngine {
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
impl ImageEngine for StabilityEngine {
    fn name(&self) -> &str {
        "sdxl"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn text_to_image(
        &self,
        request: &TextToImageRequest,
    ) -> Result<ImageArtifact, EngineError> {
        let engine_id = stability_engine_id(&request.model)
            .ok_or_else(|| EngineError::UnknownModel(request.model.clone()))?;

        let mut text_prompts = vec![json!({ "text": request.prompt, "weight": 1.0 })];
        if let Some(ref negative) = request.negative_prompt {
            text_prompts.push(json!({ "text": negative, "weight": -1.0 }));
        }
        let mut body = json!({
            "text_prompts": text_prompts,
            "cfg_scale": request.cfg_scale,
            "width": request.width,
            "height": request.height,
            "steps": request.steps,
            "samples": 1,
        });
        if let Some(seed) = request.seed {
            body["seed"] = json!(seed);
        }

        debug!(engine_id, "Requesting generation");
        let response = self
            .http
            .post(format!(
                "{}/v1/generation/{}/text-to-image",
                self.host, engine_id
            ))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Request(format!(
                "stability returned {status}: {detail}"
            )));
        }

        let generation: GenerationResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Request(format!("malformed stability response: {e}")))?;
        let artifact = generation
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Request("stability returned no artifacts".into()))?;
        let bytes = STANDARD
            .decode(&artifact.base64)
            .map_err(|e| EngineError::Request(format!("undecodable stability artifact: {e}")))?;

        let filename = artifact_filename(request.filename_prefix.as_deref());
        let filepath = self.save_directory.join(&filename);
        tokio::fs::write(&filepath, &bytes).await?;

        info!(filename = %filename, seed = artifact.seed, "Generated image");
        Ok(ImageArtifact {
            filename,
            filepath,
            seed: artifact.seed,
            steps: request.steps,
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            engine_name: self.name().to_string(),
        })
    }
}
