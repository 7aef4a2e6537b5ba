//! In-process [`Table`] implementation.
//!
//! Backs unit tests and local development runs where no DynamoDB endpoint
//! is available. Semantics mirror the production adapter: projections always
//! include the table keys, updates patch existing items only, deletes report
//! whether a target existed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::RwLock;

use crate::store::{StoreError, Table};

pub struct MemoryTable {
    hash_key: String,
    range_key: Option<String>,
    items: RwLock<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(hash_key: impl Into<String>, range_key: Option<&str>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: range_key.map(str::to_string),
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn with_items(
        hash_key: impl Into<String>,
        range_key: Option<&str>,
        items: Vec<Value>,
    ) -> Self {
        let table = Self::new(hash_key, range_key);
        *table.items.write().unwrap() = items;
        table
    }

    fn matches_key(&self, item: &Value, hash: &str, range: Option<&str>) -> bool {
        let hash_matches = item
            .get(&self.hash_key)
            .and_then(Value::as_str)
            .map(|v| v == hash)
            .unwrap_or(false);
        let range_matches = match (&self.range_key, range) {
            (Some(range_key), Some(range)) => item
                .get(range_key)
                .and_then(Value::as_str)
                .map(|v| v == range)
                .unwrap_or(false),
            _ => true,
        };
        hash_matches && range_matches
    }

    fn item_key<'a>(&self, item: &'a Value) -> (Option<&'a str>, Option<&'a str>) {
        (
            item.get(&self.hash_key).and_then(Value::as_str),
            self.range_key
                .as_ref()
                .and_then(|rk| item.get(rk))
                .and_then(Value::as_str),
        )
    }
}

#[async_trait]
impl Table for MemoryTable {
    async fn get_keys(&self, fields: &[&str]) -> Result<Vec<Value>, StoreError> {
        let mut keep: Vec<&str> = vec![self.hash_key.as_str()];
        if let Some(ref range_key) = self.range_key {
            keep.push(range_key);
        }
        keep.extend(fields.iter().copied());

        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .map(|item| {
                let mut projected = Map::new();
                if let Some(obj) = item.as_object() {
                    for (k, v) in obj {
                        if keep.contains(&k.as_str()) {
                            projected.insert(k.clone(), v.clone());
                        }
                    }
                }
                Value::Object(projected)
            })
            .collect())
    }

    async fn get_item(&self, hash: &str, range: Option<&str>) -> Result<Option<Value>, StoreError> {
        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .find(|item| self.matches_key(item, hash, range))
            .cloned())
    }

    async fn put_item(&self, item: &Value) -> Result<(), StoreError> {
        if !item.is_object() {
            return Err(StoreError::Malformed("item is not an object".into()));
        }
        let (hash, range) = self.item_key(item);
        let hash = hash.ok_or_else(|| {
            StoreError::Malformed(format!("item is missing {}", self.hash_key))
        })?;

        let mut items = self.items.write().unwrap();
        items.retain(|existing| !self.matches_key(existing, hash, range));
        items.push(item.clone());
        Ok(())
    }

    async fn update_item(&self, patch: &Value) -> Result<bool, StoreError> {
        let obj = patch
            .as_object()
            .ok_or_else(|| StoreError::Malformed("patch is not an object".into()))?;
        let (hash, range) = self.item_key(patch);
        let hash = hash.ok_or_else(|| {
            StoreError::Malformed(format!("patch is missing {}", self.hash_key))
        })?;

        let mut items = self.items.write().unwrap();
        let Some(target) = items
            .iter_mut()
            .find(|item| self.matches_key(item, hash, range))
        else {
            return Ok(false);
        };
        if let Some(target) = target.as_object_mut() {
            for (k, v) in obj {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(true)
    }

    async fn scan(&self) -> Result<Vec<Value>, StoreError> {
        Ok(self.items.read().unwrap().clone())
    }

    async fn item_count(&self) -> Result<i64, StoreError> {
        Ok(self.items.read().unwrap().len() as i64)
    }

    async fn delete_item(&self, hash: &str, range: Option<&str>) -> Result<bool, StoreError> {
        let mut items = self.items.write().unwrap();
        let before = items.len();
        items.retain(|item| !self.matches_key(item, hash, range));
        Ok(items.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_table() -> MemoryTable {
        MemoryTable::with_items(
            "filename",
            Some("create_time"),
            vec![
                json!({"filename": "a.png", "create_time": "2023-08-01T00:00:00", "score": 3, "aspect_ratio": 1.0}),
                json!({"filename": "b.png", "create_time": "2023-08-02T00:00:00", "aspect_ratio": 0.5}),
            ],
        )
    }

    #[tokio::test]
    async fn test_get_keys_projects_but_keeps_keys() {
        let table = image_table();
        let items = table.get_keys(&["score"]).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["filename"], json!("a.png"));
        assert_eq!(items[0]["score"], json!(3));
        assert!(items[0].get("aspect_ratio").is_none());
    }

    #[tokio::test]
    async fn test_update_patches_existing_only() {
        let table = image_table();
        let ok = table
            .update_item(&json!({
                "filename": "a.png",
                "create_time": "2023-08-01T00:00:00",
                "score": 5
            }))
            .await
            .unwrap();
        assert!(ok);
        let item = table
            .get_item("a.png", Some("2023-08-01T00:00:00"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item["score"], json!(5));

        let missing = table
            .update_item(&json!({
                "filename": "zzz.png",
                "create_time": "2023-08-01T00:00:00",
                "score": 5
            }))
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let table = image_table();
        assert!(table
            .delete_item("a.png", Some("2023-08-01T00:00:00"))
            .await
            .unwrap());
        assert!(!table
            .delete_item("a.png", Some("2023-08-01T00:00:00"))
            .await
            .unwrap());
        assert_eq!(table.item_count().await.unwrap(), 1);
    }
}
