//! Cross-process "data changed" signal.
//!
//! The generator writes a new image record from a different process than the
//! one serving gallery requests, so snapshot invalidation travels through
//! the store: a control item carries the timestamp of the last write, and
//! each serving process remembers the last value it acted on. One raised
//! signal therefore triggers exactly one reload per process instance.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::store::{StoreError, Table};

#[async_trait]
pub trait ChangeSignal: Send + Sync {
    /// Mark the watched data as changed.
    async fn raise(&self) -> Result<(), StoreError>;

    /// Current signal marker, if one was ever raised.
    async fn current(&self) -> Result<Option<String>, StoreError>;
}

/// Store-backed signal: one item per watched name in a control table
/// (hash: name).
pub struct TableSignal {
    table: Arc<dyn Table>,
    name: String,
}

impl TableSignal {
    pub fn new(table: Arc<dyn Table>, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
        }
    }
}

#[async_trait]
impl ChangeSignal for TableSignal {
    async fn raise(&self) -> Result<(), StoreError> {
        let marker = Utc::now().to_rfc3339();
        debug!(name = %self.name, marker = %marker, "Raising change signal");
        self.table
            .put_item(&json!({ "name": self.name, "updated_at": marker }))
            .await
    }

    async fn current(&self) -> Result<Option<String>, StoreError> {
        let item = self.table.get_item(&self.name, None).await?;
        Ok(item
            .as_ref()
            .and_then(|i| i.get("updated_at"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;

    #[tokio::test]
    async fn test_raise_updates_marker() {
        let table = Arc::new(MemoryTable::new("name", None));
        let signal = TableSignal::new(table, "images");

        assert_eq!(signal.current().await.unwrap(), None);

        signal.raise().await.unwrap();
        let first = signal.current().await.unwrap().unwrap();

        signal.raise().await.unwrap();
        let second = signal.current().await.unwrap().unwrap();
        assert!(second >= first);
    }
}
