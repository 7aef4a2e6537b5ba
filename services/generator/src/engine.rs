//! The generation backend seam.
//!
//! Each third-party text-to-image API is an [`ImageEngine`]; the
//! [`EngineRegistry`] maps model ids to the engine serving them. Model
//! routing is an explicit registration table: a model id either resolves
//! or the job fails with an unknown-model error.

use async_trait::async_trait;
use catalog::records::Orientation;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model '{0}' is not recognized")]
    UnknownModel(String),
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One text-to-image request, engine-agnostic.
#[derive(Debug, Clone)]
pub struct TextToImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: Option<u64>,
    /// Prefix for the generated filename, typically the snake_cased
    /// artist name.
    pub filename_prefix: Option<String>,
}

impl TextToImageRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            model: model.into(),
            width: 1024,
            height: 1024,
            steps: 30,
            cfg_scale: 7.0,
            seed: None,
            filename_prefix: None,
        }
    }
}

/// A generated image on local disk, ready for upload.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub filename: String,
    pub filepath: PathBuf,
    pub seed: u64,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub engine_name: String,
}

#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Short engine name recorded on generated images.
    fn name(&self) -> &str;

    /// Generate one image and write it to the save directory.
    async fn text_to_image(&self, request: &TextToImageRequest)
        -> Result<ImageArtifact, EngineError>;
}

/// Model-id to engine routing table.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn ImageEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: impl Into<String>, engine: Arc<dyn ImageEngine>) {
        self.engines.insert(model.into(), engine);
    }

    pub fn resolve(&self, model: &str) -> Result<Arc<dyn ImageEngine>, EngineError> {
        self.engines
            .get(model)
            .cloned()
            .ok_or_else(|| EngineError::UnknownModel(model.to_string()))
    }

    pub fn models(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Output dimensions for an orientation. Sizes are the native generation
/// resolutions of the SDXL family.
pub fn dimensions_for(orientation: Orientation) -> (u32, u32) {
    match orientation {
        Orientation::Portrait => (832, 1216),
        Orientation::Landscape => (1216, 832),
        Orientation::Square => (1024, 1024),
    }
}

/// Build a unique artifact filename: prefix, second-resolution timestamp,
/// and a short random suffix to disambiguate same-second generations.
pub fn artifact_filename(prefix: Option<&str>) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}.png",
        prefix.unwrap_or("artwork"),
        stamp,
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEngine(&'static str);

    #[async_trait]
    impl ImageEngine for FakeEngine {
        fn name(&self) -> &str {
            self.0
        }

        async fn text_to_image(
            &self,
            request: &TextToImageRequest,
        ) -> Result<ImageArtifact, EngineError> {
            Ok(ImageArtifact {
                filename: artifact_filename(request.filename_prefix.as_deref()),
                filepath: PathBuf::from("/tmp/out.png"),
                seed: request.seed.unwrap_or(0),
                steps: request.steps,
                cfg_scale: request.cfg_scale,
                width: request.width,
                height: request.height,
                engine_name: self.0.to_string(),
            })
        }
    }

    #[test]
    fn test_registry_resolution() {
        let mut registry = EngineRegistry::new();
        let stability: Arc<dyn ImageEngine> = Arc::new(FakeEngine("stability"));
        let sinkin: Arc<dyn ImageEngine> = Arc::new(FakeEngine("sinkin"));
        registry.register("sdxl", stability.clone());
        registry.register("sd-1.5", stability);
        registry.register("deliberate", sinkin);

        assert_eq!(registry.resolve("sdxl").unwrap().name(), "stability");
        assert_eq!(registry.resolve("deliberate").unwrap().name(), "sinkin");

        let err = match registry.resolve("imagen") {
            Ok(_) => panic!("expected resolve to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, EngineError::UnknownModel(_)));
        assert_eq!(err.to_string(), "Model 'imagen' is not recognized");
    }

    #[test]
    fn test_dimensions_for_orientation() {
        assert_eq!(dimensions_for(Orientation::Portrait), (832, 1216));
        assert_eq!(dimensions_for(Orientation::Landscape), (1216, 832));
        assert_eq!(dimensions_for(Orientation::Square), (1024, 1024));
    }

    #[test]
    fn test_artifact_filename_shape() {
        let name = artifact_filename(Some("mary_cassatt"));
        assert!(name.starts_with("mary_cassatt-"));
        assert!(name.ends_with(".png"));

        let other = artifact_filename(Some("mary_cassatt"));
        assert_ne!(name, other);

        assert!(artifact_filename(None).starts_with("artwork-"));
    }
}
