//! The artist directory and genre vocabulary.
//!
//! Artists are collaborator-owned records (id, display name, sort name,
//! category tags, preferred model). The directory caches a full scan of the
//! artists table and answers the id/name lookups the gallery and generator
//! need per request. Genres are per-artist vocabulary buckets (subject /
//! style / method) used to build generation prompts.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};

use crate::store::{StoreError, Table};
use crate::text;

/// One artist, as read from the artists table.
#[derive(Debug, Clone)]
pub struct Artist {
    pub id: String,
    pub name: String,
    /// "Last, First" collation name.
    pub sort_name: String,
    pub categories: Vec<String>,
    /// Preferred generation model id, when the curators chose one.
    pub model: Option<String>,
    /// The full record, for joining into API responses.
    pub data: Value,
}

impl Artist {
    pub fn from_item(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        let id = obj.get("id")?.as_str()?.to_string();
        let name = obj.get("name")?.as_str()?.to_string();
        let sort_name = obj
            .get("sort_name")
            .and_then(Value::as_str)
            .unwrap_or(&name)
            .to_string();
        let categories = obj
            .get("categories")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let model = obj
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            id,
            name,
            sort_name,
            categories,
            model,
            data: item.clone(),
        })
    }

    /// Rotate "Last, First" to "First Last" and normalize, producing the
    /// name clients search against in listings.
    pub fn searchable_name(&self) -> String {
        let mut parts: Vec<&str> = self.sort_name.split(", ").collect();
        if parts.len() > 1 {
            let last = parts.remove(0);
            parts.push(last);
        }
        text::normalize(&parts.join(" "))
    }
}

/// Cached lookup over the artists table.
pub struct ArtistDirectory {
    table: Arc<dyn Table>,
    artists: RwLock<Arc<Vec<Artist>>>,
}

impl ArtistDirectory {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self {
            table,
            artists: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Replace the cached list with a fresh scan.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), StoreError> {
        let items = self.table.scan().await?;
        let artists: Vec<Artist> = items.iter().filter_map(Artist::from_item).collect();
        info!(count = artists.len(), "Loaded artist directory");
        *self.artists.write().unwrap() = Arc::new(artists);
        Ok(())
    }

    pub fn all(&self) -> Arc<Vec<Artist>> {
        self.artists.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.artists.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_by_id(&self, artist_id: &str) -> Option<Artist> {
        self.all().iter().find(|a| a.id == artist_id).cloned()
    }

    /// Name lookup: exact match on the normalized display name first, then
    /// a word-boundary match for partial queries like a bare surname.
    pub fn get_by_name(&self, name: &str) -> Option<Artist> {
        let needle = text::normalize(name);
        if needle.is_empty() {
            return None;
        }
        let artists = self.all();
        artists
            .iter()
            .find(|a| text::normalize(&a.name) == needle)
            .or_else(|| {
                artists
                    .iter()
                    .find(|a| text::contains_phrase(&text::normalize(&a.name), &needle))
            })
            .cloned()
    }

    /// Uniform random choice, optionally restricted to a category tag.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R, category: Option<&str>) -> Option<Artist> {
        let artists = self.all();
        match category {
            Some(category) => {
                let pool: Vec<&Artist> = artists
                    .iter()
                    .filter(|a| a.categories.iter().any(|c| c == category))
                    .collect();
                pool.choose(rng).map(|a| (*a).clone())
            }
            None => artists.choose(rng).cloned(),
        }
    }
}

/// One genre: a named subject/style/method vocabulary bucket for an artist.
#[derive(Debug, Clone)]
pub struct Genre {
    pub artist_id: String,
    pub name: String,
    pub subject: Option<String>,
    pub style: Option<String>,
    pub method: Option<String>,
    pub data: Value,
}

impl Genre {
    pub fn from_item(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        Some(Self {
            artist_id: obj.get("artist_id")?.as_str()?.to_string(),
            name: obj.get("name")?.as_str()?.to_string(),
            subject: obj.get("subject").and_then(Value::as_str).map(str::to_string),
            style: obj.get("style").and_then(Value::as_str).map(str::to_string),
            method: obj.get("method").and_then(Value::as_str).map(str::to_string),
            data: item.clone(),
        })
    }
}

/// Genre CRUD against the genres table (hash: artist_id, range: name).
pub struct GenreStore {
    table: Arc<dyn Table>,
}

impl GenreStore {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self { table }
    }

    pub async fn list_all(&self) -> Result<Vec<Value>, StoreError> {
        self.table.scan().await
    }

    pub async fn list_for_artist(&self, artist_id: &str) -> Result<Vec<Genre>, StoreError> {
        let items = self.table.scan().await?;
        Ok(items
            .iter()
            .filter_map(Genre::from_item)
            .filter(|g| g.artist_id == artist_id)
            .collect())
    }

    #[instrument(skip(self, fields))]
    pub async fn save(&self, artist_id: &str, name: &str, fields: &Value) -> Result<(), StoreError> {
        let mut item = json!({ "artist_id": artist_id, "name": name });
        if let (Some(target), Some(source)) = (item.as_object_mut(), fields.as_object()) {
            for (k, v) in source {
                if k != "artist_id" && k != "name" {
                    target.insert(k.clone(), v.clone());
                }
            }
        }
        self.table.put_item(&item).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, artist_id: &str, name: &str) -> Result<bool, StoreError> {
        self.table.delete_item(artist_id, Some(name)).await
    }
}
