//! The generation pipeline.
//!
//! One job runs end to end: choose an artist (named or random), pick one
//! of their genres, assemble the prompt, resolve the engine for the
//! artist's model, generate, upload the artifact, write the image record
//! with its flattened `query-*` provenance, and raise the change signal so
//! serving processes reload their snapshots.

use catalog::artists::{ArtistDirectory, GenreStore};
use catalog::records::{engine_label, format_create_time};
use catalog::signal::ChangeSignal;
use catalog::store::{StoreError, Table};
use catalog::text;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::engine::{dimensions_for, EngineError, EngineRegistry, TextToImageRequest};
use crate::prompt::build_prompt;
use crate::uploader::ArtifactSink;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("No artists are available for generation")]
    NoArtists,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
    #[error("artifact upload failed: {0}")]
    Upload(String),
}

/// One generation job, as dispatched by the gallery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateJob {
    /// Artist display name; a random artist is chosen when absent or
    /// unknown.
    #[serde(default)]
    pub artist: Option<String>,
    /// Genre name; a random genre of the artist is chosen when absent.
    #[serde(default)]
    pub genre: Option<String>,
}

pub struct Orchestrator {
    directory: Arc<ArtistDirectory>,
    genres: Arc<GenreStore>,
    registry: Arc<EngineRegistry>,
    sink: Arc<dyn ArtifactSink>,
    images: Arc<dyn Table>,
    signal: Arc<dyn ChangeSignal>,
    default_model: String,
}

impl Orchestrator {
    pub fn new(
        directory: Arc<ArtistDirectory>,
        genres: Arc<GenreStore>,
        registry: Arc<EngineRegistry>,
        sink: Arc<dyn ArtifactSink>,
        images: Arc<dyn Table>,
        signal: Arc<dyn ChangeSignal>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            genres,
            registry,
            sink,
            images,
            signal,
            default_model: default_model.into(),
        }
    }

    /// Run one generation job to completion and return the written record.
    #[instrument(skip(self, job, rng), fields(artist = ?job.artist, genre = ?job.genre))]
    pub async fn run<R: Rng>(&self, job: &GenerateJob, rng: &mut R) -> Result<Value, GenerateError> {
        let artist = job
            .artist
            .as_deref()
            .and_then(|name| self.directory.get_by_name(name))
            .or_else(|| self.directory.choose(rng, None))
            .ok_or(GenerateError::NoArtists)?;

        let genres = self.genres.list_for_artist(&artist.id).await?;
        let genre = match job.genre.as_deref() {
            Some(name) => genres
                .iter()
                .find(|g| g.name == name)
                .or_else(|| genres.choose(rng)),
            None => genres.choose(rng),
        };

        let prompt = build_prompt(&artist, genre, rng);
        let model = artist
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let engine = self.registry.resolve(&model)?;
        let (width, height) = dimensions_for(prompt.orientation);

        info!(
            artist = %artist.name,
            model = %model,
            orientation = prompt.orientation.as_str(),
            "Generating image"
        );

        let request = TextToImageRequest {
            prompt: prompt.text.clone(),
            negative_prompt: Some(prompt.negative.clone()),
            model: model.clone(),
            width,
            height,
            steps: 30,
            cfg_scale: 7.0,
            seed: None,
            filename_prefix: Some(text::snake_case(&artist.name)),
        };
        let artifact = engine.text_to_image(&request).await?;

        let image_url = self
            .sink
            .upload(&artifact)
            .await
            .map_err(|e| GenerateError::Upload(e.to_string()))?;

        let mut record = json!({
            "filename": artifact.filename,
            "create_time": format_create_time(Utc::now()),
            "aspect_ratio": round2(artifact.width as f64 / artifact.height as f64),
            "nsfw": false,
            "engine_name": artifact.engine_name,
            "image_url": image_url,
            "seed": artifact.seed,
            "steps": artifact.steps,
            "cfg_scale": artifact.cfg_scale,
            "width": artifact.width,
            "height": artifact.height,
            "query-artist_id": prompt.query.artist_id,
            "query-artist_name": prompt.query.artist_name,
            "query-subject": prompt.query.subject,
            "query-model": model,
        });
        if let Some(obj) = record.as_object_mut() {
            if let Some(label) = engine_label(&artifact.engine_name) {
                obj.insert("engine_label".into(), json!(label));
            }
            if let Some(ref style) = prompt.query.style {
                obj.insert("query-style".into(), json!(style));
            }
            if let Some(ref method) = prompt.query.method {
                obj.insert("query-method".into(), json!(method));
            }
        }

        self.images.put_item(&record).await?;

        // The record is durable at this point; a lost signal only delays
        // snapshot refreshes to the next interval tick.
        if let Err(e) = self.signal.raise().await {
            warn!(error = %e, "Failed to raise change signal");
        }

        metrics::counter!("generator.images.generated", "engine" => artifact.engine_name.clone())
            .increment(1);
        info!(filename = %artifact.filename, "Generation complete");
        Ok(record)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{artifact_filename, ImageArtifact, ImageEngine};
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use catalog::memory::MemoryTable;
    use catalog::signal::TableSignal;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeEngine;

    #[async_trait]
    impl ImageEngine for FakeEngine {
        fn name(&self) -> &str {
            "sdxl"
        }

        async fn text_to_image(
            &self,
            request: &TextToImageRequest,
        ) -> Result<ImageArtifact, EngineError> {
            Ok(ImageArtifact {
                filename: artifact_filename(request.filename_prefix.as_deref()),
                filepath: PathBuf::from("/tmp/fake.png"),
                seed: 1234,
                steps: request.steps,
                cfg_scale: request.cfg_scale,
                width: request.width,
                height: request.height,
                engine_name: "sdxl".to_string(),
            })
        }
    }

    struct FakeSink {
        uploaded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactSink for FakeSink {
        async fn upload(&self, artifact: &ImageArtifact) -> AnyResult<String> {
            self.uploaded
                .lock()
                .unwrap()
                .push(artifact.filename.clone());
            Ok(format!("https://gallery-artwork/images/{}", artifact.filename))
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        images: Arc<MemoryTable>,
        control: Arc<MemoryTable>,
    }

    async fn fixture(artist_model: Option<&str>) -> Fixture {
        let mut artist = json!({
            "id": "vincent_van_gogh",
            "name": "Vincent van Gogh",
            "sort_name": "Gogh, Vincent van"
        });
        if let Some(model) = artist_model {
            artist["model"] = json!(model);
        }
        let artists = Arc::new(MemoryTable::with_items("id", None, vec![artist]));
        let directory = Arc::new(ArtistDirectory::new(artists));
        directory.load().await.unwrap();

        let genres_table = Arc::new(MemoryTable::with_items(
            "artist_id",
            Some("name"),
            vec![json!({
                "artist_id": "vincent_van_gogh",
                "name": "wheat fields",
                "subject": "wheat fields",
                "style": "post-impressionism"
            })],
        ));

        let mut registry = EngineRegistry::new();
        registry.register("sdxl", Arc::new(FakeEngine));

        let images = Arc::new(MemoryTable::new("filename", Some("create_time")));
        let control = Arc::new(MemoryTable::new("name", None));

        let orchestrator = Orchestrator::new(
            directory,
            Arc::new(GenreStore::new(genres_table)),
            Arc::new(registry),
            Arc::new(FakeSink {
                uploaded: Mutex::new(Vec::new()),
            }),
            images.clone(),
            Arc::new(TableSignal::new(control.clone(), "images")),
            "sdxl",
        );
        Fixture {
            orchestrator,
            images,
            control,
        }
    }

    #[tokio::test]
    async fn test_run_writes_record_and_raises_signal() {
        let fixture = fixture(None).await;
        let mut rng = StdRng::seed_from_u64(11);
        let record = fixture
            .orchestrator
            .run(&GenerateJob::default(), &mut rng)
            .await
            .unwrap();

        assert_eq!(record["query-artist_id"], json!("vincent_van_gogh"));
        assert_eq!(record["query-subject"], json!("wheat fields"));
        assert_eq!(record["query-style"], json!("post-impressionism"));
        assert_eq!(record["engine_name"], json!("sdxl"));
        assert_eq!(record["engine_label"], json!("Stable Diffusion XL Beta"));
        assert_eq!(record["nsfw"], json!(false));
        let aspect = record["aspect_ratio"].as_f64().unwrap();
        assert!(aspect > 0.0);

        // The record landed in the table under its composite key.
        let stored = fixture
            .images
            .get_item(
                record["filename"].as_str().unwrap(),
                Some(record["create_time"].as_str().unwrap()),
            )
            .await
            .unwrap();
        assert!(stored.is_some());

        // The change signal was raised.
        let marker = fixture.control.get_item("images", None).await.unwrap();
        assert!(marker.is_some());
    }

    #[tokio::test]
    async fn test_named_artist_and_genre_are_honored() {
        let fixture = fixture(None).await;
        let mut rng = StdRng::seed_from_u64(11);
        let job = GenerateJob {
            artist: Some("van gogh".to_string()),
            genre: Some("wheat fields".to_string()),
        };
        let record = fixture.orchestrator.run(&job, &mut rng).await.unwrap();
        assert_eq!(record["query-artist_name"], json!("Vincent van Gogh"));
        assert_eq!(record["query-subject"], json!("wheat fields"));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_with_engine_error() {
        let fixture = fixture(Some("imagen")).await;
        let mut rng = StdRng::seed_from_u64(11);
        let err = fixture
            .orchestrator
            .run(&GenerateJob::default(), &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Engine(EngineError::UnknownModel(_))
        ));
        // Nothing was written.
        assert_eq!(fixture.images.item_count().await.unwrap(), 0);
    }
}
