//! Generator Service
//!
//! Generation pipeline for the AI artwork gallery. One job chooses an
//! artist and genre, assembles a prompt from the genre vocabulary,
//! dispatches to the engine registered for the artist's model id, uploads
//! the artifact to the artwork bucket, writes the image record, and raises
//! the change signal the serving processes watch.
//!
//! ## Architecture
//!
//! ```text
//! POST /generate {artist, genre}
//!        │
//!        ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│ Prompt       │────▶│ Engine       │
//! │              │     │ builder      │     │ registry     │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!        │                                   ┌─────┴─────┐
//!        │                                   ▼           ▼
//!        │                             ┌──────────┐ ┌──────────┐
//!        │                             │ Stability│ │ Sinkin   │
//!        │                             └──────────┘ └──────────┘
//!        ▼
//! upload artifact ──▶ write record ──▶ raise change signal
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod prompt;
pub mod secrets;
pub mod sinkin;
pub mod stability;
pub mod uploader;

pub use config::Config;
pub use engine::{EngineError, EngineRegistry, ImageArtifact, ImageEngine, TextToImageRequest};
pub use orchestrator::{GenerateError, GenerateJob, Orchestrator};
pub use prompt::{build_prompt, Prompt};
pub use uploader::{ArtifactSink, ArtifactUploader};
