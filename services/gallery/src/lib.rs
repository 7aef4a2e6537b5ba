//! Gallery Service
//!
//! Serving API for the AI artwork catalogue. Every request reads an
//! in-memory snapshot of the image records; the curation engine filters it
//! per query and the selection layer answers the three access patterns:
//! one image by id with prev/next navigation, random draws, and backward
//! pagination from the newest record.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum catch-all)
//!        │
//!        ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Router       │────▶│ Curation     │────▶│ Selection /  │
//! │ (action      │     │ Engine       │     │ Pagination   │
//! │  table)      │     └──────────────┘     └──────────────┘
//! └──────────────┘            │                    │
//!        │                    ▼                    ▼
//!        │             ┌──────────────┐     ┌──────────────┐
//!        │             │ Snapshot     │     │ Images table │
//!        │             │ Cache        │◀────│ (full detail)│
//!        ▼             └──────────────┘     └──────────────┘
//! ┌──────────────┐            ▲
//! │ Generation   │── change ──┘
//! │ trigger      │   signal
//! └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod curation;
pub mod error;
pub mod image_search;
pub mod selection;
pub mod snapshot;
pub mod trigger;

pub use api::{dispatch, ApiRequest, ApiResponse, AppState};
pub use config::Config;
pub use curation::{curate, GalleryQuery, ScoreFilter, VersionFilter};
pub use error::ApiError;
pub use selection::{ImageId, Selector};
pub use snapshot::SnapshotCache;
