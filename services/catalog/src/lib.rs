//! Shared catalogue domain for the gallery platform.
//!
//! This crate holds everything both services touch:
//!
//! - **Records**: the typed image record with its derived id, version
//!   bucket, and orientation, plus flat-JSON (de)serialization with an
//!   `extra` bag for unrecognized provenance fields
//! - **Tables**: the narrow key-value store interface with a DynamoDB
//!   adapter for production and an in-memory adapter for tests
//! - **Artists**: the cached artist directory and per-artist genre
//!   vocabulary used for prompt building
//! - **Signals**: the store-backed change flag the generator raises after
//!   a write so serving processes reload their snapshots
//! - **Text**: normalization and word-boundary matching shared by search
//!   and artist lookups

pub mod artists;
pub mod memory;
pub mod records;
pub mod signal;
pub mod store;
pub mod text;

pub use artists::{Artist, ArtistDirectory, Genre, GenreStore};
pub use memory::MemoryTable;
pub use records::{ImageRecord, Orientation, VersionCutovers, PROJECTION_FIELDS};
pub use signal::{ChangeSignal, TableSignal};
pub use store::{dynamo_client, DynamoTable, StoreError, Table};
