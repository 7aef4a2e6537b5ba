//! Image selection and pagination over a curated result set.
//!
//! Three access patterns: get one image by id (with prev/next navigation or
//! shuffle rerolls), draw images uniformly at random, and page backward
//! from the newest record. The snapshot only carries the filter projection,
//! so every returned item is re-fetched in full from the images table by
//! its (filename, create_time) key.

use catalog::artists::ArtistDirectory;
use catalog::records::{engine_label, parse_create_time, ImageRecord};
use catalog::store::Table;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use crate::curation::GalleryQuery;
use crate::error::ApiError;

/// Target of a get-by-id request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageId {
    /// The literal "latest" token.
    Latest,
    Id(i64),
}

impl ImageId {
    /// Parse a path segment: "latest" or a 10-digit id. Anything else is
    /// rejected by the router before reaching here.
    pub fn parse(segment: &str) -> Option<Self> {
        if segment == "latest" {
            return Some(ImageId::Latest);
        }
        if segment.len() == 10 && segment.bytes().all(|b| b.is_ascii_digit()) {
            return segment.parse().ok().map(ImageId::Id);
        }
        None
    }
}

pub struct Selector {
    images: Arc<dyn Table>,
    directory: Arc<ArtistDirectory>,
}

impl Selector {
    pub fn new(images: Arc<dyn Table>, directory: Arc<ArtistDirectory>) -> Self {
        Self { images, directory }
    }

    /// Fetch the full record behind a snapshot entry and re-derive the
    /// fields the projection computes.
    async fn fetch_detail(&self, record: &ImageRecord) -> Result<Value, ApiError> {
        let item = self
            .images
            .get_item(&record.filename, Some(&record.create_time))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Image '{}' not found", record.filename)))?;

        let mut detail = item;
        if let Some(obj) = detail.as_object_mut() {
            if let Some(id) = obj
                .get("create_time")
                .and_then(Value::as_str)
                .and_then(parse_create_time)
            {
                obj.insert("id".into(), json!(id));
            }
            if let Some(label) = obj
                .get("engine_name")
                .and_then(Value::as_str)
                .and_then(engine_label)
            {
                obj.insert("engine_label".into(), json!(label));
            }
        }
        Ok(detail)
    }

    /// Resolve one image with prev/next navigation.
    ///
    /// The curated set is sorted ascending by create_time; "latest" resolves
    /// to the newest record (or a random one in shuffle mode). Neighbor ids
    /// wrap around the ends of the set. A miss returns the `fail` shape with
    /// a zero total rather than an error, since the id may simply have been
    /// filtered out by the query.
    #[instrument(skip(self, curated, query, rng), fields(total = curated.len()))]
    pub async fn get_image<R: Rng>(
        &self,
        mut curated: Vec<ImageRecord>,
        image_id: ImageId,
        query: &GalleryQuery,
        rng: &mut R,
    ) -> Result<Value, ApiError> {
        if curated.is_empty() {
            return Ok(json!({ "status": "success", "total": 0 }));
        }
        curated.sort_by(|a, b| a.create_time.cmp(&b.create_time));

        let target_id = match image_id {
            ImageId::Latest if query.shuffle => curated[rng.gen_range(0..curated.len())].id,
            ImageId::Latest => curated[curated.len() - 1].id,
            ImageId::Id(id) => id,
        };

        let Some(position) = curated.iter().position(|r| r.id == target_id) else {
            return Ok(json!({ "status": "fail", "total": 0 }));
        };

        let record = &curated[position];
        let mut detail = self.fetch_detail(record).await?;
        if let Some(artist_id) = detail
            .get("query-artist_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| record.artist_id.clone())
        {
            if let Some(artist) = self.directory.get_by_id(&artist_id) {
                if let Some(obj) = detail.as_object_mut() {
                    obj.insert("artist".into(), artist.data);
                }
            }
        }

        let mut response = json!({
            "status": "success",
            "image": detail,
            "total": curated.len(),
        });
        let obj = response.as_object_mut().unwrap();
        if query.shuffle {
            let reroll = curated[rng.gen_range(0..curated.len())].id;
            obj.insert("random_id".into(), json!(reroll));
        } else {
            let older_id = if position == 0 {
                curated[curated.len() - 1].id
            } else {
                curated[position - 1].id
            };
            let newer_id = if position + 1 < curated.len() {
                curated[position + 1].id
            } else {
                curated[0].id
            };
            obj.insert("older_id".into(), json!(older_id));
            obj.insert("newer_id".into(), json!(newer_id));
        }
        Ok(response)
    }

    /// Draw `limit` records independently and uniformly at random, with
    /// replacement; duplicates are expected on small sets.
    #[instrument(skip(self, curated, rng), fields(total = curated.len()))]
    pub async fn get_random<R: Rng>(
        &self,
        curated: &[ImageRecord],
        limit: i64,
        rng: &mut R,
    ) -> Result<Value, ApiError> {
        if curated.is_empty() {
            return Ok(json!({ "status": "success", "images": [], "total": 0 }));
        }

        let draws = limit.max(1) as usize;
        let mut images = Vec::with_capacity(draws);
        for _ in 0..draws {
            let record = &curated[rng.gen_range(0..curated.len())];
            images.push(self.fetch_detail(record).await?);
        }

        Ok(json!({
            "status": "success",
            "images": images,
            "total": curated.len(),
        }))
    }

    /// Page backward from the newest record.
    ///
    /// `offset` counts from the end of the ascending sort: offset 1 is the
    /// newest record. A non-positive offset normalizes to the total (start
    /// from the oldest match); an offset beyond the total normalizes to 1.
    /// The limit is clamped so the window never walks past the oldest
    /// record.
    #[instrument(skip(self, curated), fields(total = curated.len()))]
    pub async fn get_latest(
        &self,
        mut curated: Vec<ImageRecord>,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Value, ApiError> {
        if curated.is_empty() {
            return Ok(json!({ "status": "success", "images": [], "offset": 0, "total": 0 }));
        }
        curated.sort_by(|a, b| a.create_time.cmp(&b.create_time));

        let total = curated.len() as i64;
        let mut offset = offset;
        if offset > total {
            offset = 1;
        }
        if offset <= 0 {
            offset = total;
        }

        let mut limit = limit.unwrap_or(1).max(1);
        if total - offset < limit {
            limit = total - offset + 1;
        }

        let mut images = Vec::with_capacity(limit as usize);
        for i in offset..offset + limit {
            let record = &curated[(total - i) as usize];
            let mut detail = self.fetch_detail(record).await?;
            if let Some(obj) = detail.as_object_mut() {
                obj.insert("offset".into(), json!(offset));
            }
            images.push(detail);
        }

        Ok(json!({
            "status": "success",
            "images": images,
            "offset": offset,
            "total": total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::memory::MemoryTable;
    use catalog::records::VersionCutovers;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn seeded_tables() -> (Arc<MemoryTable>, Arc<ArtistDirectory>, Vec<ImageRecord>) {
        let items: Vec<Value> = (1..=5)
            .map(|day| {
                json!({
                    "filename": format!("image-{day}.png"),
                    "create_time": format!("2023-09-0{day}T12:00:00"),
                    "aspect_ratio": 1.0,
                    "query-artist_id": "mary_cassatt",
                    "query-artist_name": "Mary Cassatt",
                    "engine_name": "sdxl",
                    "prompt": format!("prompt {day}"),
                })
            })
            .collect();
        let table = Arc::new(MemoryTable::with_items(
            "filename",
            Some("create_time"),
            items.clone(),
        ));

        let artists = Arc::new(MemoryTable::with_items(
            "id",
            None,
            vec![json!({"id": "mary_cassatt", "name": "Mary Cassatt"})],
        ));
        let directory = Arc::new(ArtistDirectory::new(artists));

        let cutovers = VersionCutovers::default();
        let records = items
            .iter()
            .map(|i| ImageRecord::from_item(i, &cutovers).unwrap())
            .collect();
        (table, directory, records)
    }

    async fn selector() -> (Selector, Vec<ImageRecord>) {
        let (table, directory, records) = seeded_tables();
        directory.load().await.unwrap();
        (Selector::new(table, directory), records)
    }

    #[tokio::test]
    async fn test_get_image_latest_matches_explicit_id() {
        let (selector, records) = selector().await;
        let query = GalleryQuery::default();
        let mut rng = StdRng::seed_from_u64(1);

        let latest = selector
            .get_image(records.clone(), ImageId::Latest, &query, &mut rng)
            .await
            .unwrap();
        let newest_id = records.iter().map(|r| r.id).max().unwrap();
        let explicit = selector
            .get_image(records.clone(), ImageId::Id(newest_id), &query, &mut rng)
            .await
            .unwrap();
        assert_eq!(latest, explicit);
        assert_eq!(latest["total"], json!(5));
        // Full detail was fetched, not the projection.
        assert_eq!(latest["image"]["prompt"], json!("prompt 5"));
        assert_eq!(latest["image"]["engine_label"], json!("Stable Diffusion XL Beta"));
        // Artist sub-record joined in.
        assert_eq!(latest["image"]["artist"]["name"], json!("Mary Cassatt"));
    }

    #[tokio::test]
    async fn test_get_image_neighbor_ids_wrap() {
        let (selector, records) = selector().await;
        let query = GalleryQuery::default();
        let mut rng = StdRng::seed_from_u64(1);
        let ids: Vec<i64> = {
            let mut sorted = records.clone();
            sorted.sort_by(|a, b| a.create_time.cmp(&b.create_time));
            sorted.iter().map(|r| r.id).collect()
        };

        // Middle record: plain neighbors.
        let response = selector
            .get_image(records.clone(), ImageId::Id(ids[2]), &query, &mut rng)
            .await
            .unwrap();
        assert_eq!(response["older_id"], json!(ids[1]));
        assert_eq!(response["newer_id"], json!(ids[3]));

        // Oldest record wraps older to the newest.
        let response = selector
            .get_image(records.clone(), ImageId::Id(ids[0]), &query, &mut rng)
            .await
            .unwrap();
        assert_eq!(response["older_id"], json!(ids[4]));
        assert_eq!(response["newer_id"], json!(ids[1]));

        // Newest record wraps newer to the oldest.
        let response = selector
            .get_image(records, ImageId::Id(ids[4]), &query, &mut rng)
            .await
            .unwrap();
        assert_eq!(response["older_id"], json!(ids[3]));
        assert_eq!(response["newer_id"], json!(ids[0]));
    }

    #[tokio::test]
    async fn test_get_image_miss_fails_with_zero_total() {
        let (selector, records) = selector().await;
        let mut rng = StdRng::seed_from_u64(1);
        let response = selector
            .get_image(
                records,
                ImageId::Id(1_600_000_000),
                &GalleryQuery::default(),
                &mut rng,
            )
            .await
            .unwrap();
        assert_eq!(response, json!({"status": "fail", "total": 0}));
    }

    #[tokio::test]
    async fn test_get_image_shuffle_rerolls_random_id() {
        let (selector, records) = selector().await;
        let query = GalleryQuery {
            shuffle: true,
            ..GalleryQuery::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let response = selector
            .get_image(records.clone(), ImageId::Latest, &query, &mut rng)
            .await
            .unwrap();
        assert!(response.get("random_id").is_some());
        assert!(response.get("older_id").is_none());
        assert!(response.get("newer_id").is_none());
        let random_id = response["random_id"].as_i64().unwrap();
        assert!(records.iter().any(|r| r.id == random_id));
    }

    #[tokio::test]
    async fn test_get_random_draws_with_replacement() {
        let (selector, records) = selector().await;
        let one = vec![records[0].clone()];
        let mut rng = StdRng::seed_from_u64(9);
        let response = selector.get_random(&one, 3, &mut rng).await.unwrap();
        let images = response["images"].as_array().unwrap();
        assert_eq!(images.len(), 3);
        assert!(images
            .iter()
            .all(|i| i["filename"] == json!("image-1.png")));
        assert_eq!(response["total"], json!(1));
    }

    #[tokio::test]
    async fn test_get_random_empty_set() {
        let (selector, _) = selector().await;
        let mut rng = StdRng::seed_from_u64(9);
        let response = selector.get_random(&[], 3, &mut rng).await.unwrap();
        assert_eq!(
            response,
            json!({"status": "success", "images": [], "total": 0})
        );
    }

    #[tokio::test]
    async fn test_get_latest_offset_normalization() {
        let (selector, records) = selector().await;

        // offset 0 normalizes to the total and returns the oldest match.
        let response = selector
            .get_latest(records.clone(), 0, Some(1))
            .await
            .unwrap();
        assert_eq!(response["offset"], json!(5));
        let images = response["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["filename"], json!("image-1.png"));
        assert_eq!(images[0]["offset"], json!(5));

        // offset beyond the total normalizes to 1: the newest record.
        let response = selector
            .get_latest(records.clone(), 99, Some(1))
            .await
            .unwrap();
        assert_eq!(response["offset"], json!(1));
        assert_eq!(
            response["images"][0]["filename"],
            json!("image-5.png")
        );

        // The window clamps instead of walking past the oldest record.
        let response = selector.get_latest(records, 3, Some(10)).await.unwrap();
        let images = response["images"].as_array().unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0]["filename"], json!("image-3.png"));
        assert_eq!(images[2]["filename"], json!("image-1.png"));
    }

    #[tokio::test]
    async fn test_get_latest_is_idempotent() {
        let (selector, records) = selector().await;
        let first = selector
            .get_latest(records.clone(), 2, Some(2))
            .await
            .unwrap();
        let second = selector.get_latest(records, 2, Some(2)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_latest_empty_set() {
        let (selector, _) = selector().await;
        let response = selector.get_latest(Vec::new(), 0, None).await.unwrap();
        assert_eq!(
            response,
            json!({"status": "success", "images": [], "offset": 0, "total": 0})
        );
    }

    #[test]
    fn test_image_id_parsing() {
        assert_eq!(ImageId::parse("latest"), Some(ImageId::Latest));
        assert_eq!(ImageId::parse("1693526400"), Some(ImageId::Id(1_693_526_400)));
        assert_eq!(ImageId::parse("123"), None);
        assert_eq!(ImageId::parse("169352640a"), None);
        assert_eq!(ImageId::parse("recent"), None);
    }
}
