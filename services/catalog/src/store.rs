//! Key-value table adapters.
//!
//! Records live in DynamoDB tables keyed by a hash key and an optional range
//! key. The [`Table`] trait is the narrow interface the rest of the platform
//! consumes; [`DynamoTable`] is the production adapter and
//! [`crate::memory::MemoryTable`] backs tests and local runs. Items cross
//! the boundary as flat `serde_json::Value` objects.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Store failure taxonomy. `Request` covers transient transport and service
/// errors and is retryable; `Malformed` marks data the adapter cannot map.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Request(_))
    }
}

/// Narrow table interface: the operations the gallery and generator consume.
#[async_trait]
pub trait Table: Send + Sync {
    /// Fetch every item with the table keys plus the given projection fields.
    async fn get_keys(&self, fields: &[&str]) -> Result<Vec<Value>, StoreError>;

    /// Fetch one full item by key.
    async fn get_item(&self, hash: &str, range: Option<&str>) -> Result<Option<Value>, StoreError>;

    /// Write a full item.
    async fn put_item(&self, item: &Value) -> Result<(), StoreError>;

    /// Patch an existing item. The patch carries the key fields plus the
    /// fields to set. Returns false when the target does not exist.
    async fn update_item(&self, patch: &Value) -> Result<bool, StoreError>;

    /// Fetch every full item.
    async fn scan(&self) -> Result<Vec<Value>, StoreError>;

    /// Approximate number of items in the table.
    async fn item_count(&self) -> Result<i64, StoreError>;

    /// Delete one item by key. Returns false when the target did not exist.
    async fn delete_item(&self, hash: &str, range: Option<&str>) -> Result<bool, StoreError>;
}

/// Build a DynamoDB client, honoring a custom endpoint for LocalStack.
pub async fn dynamo_client(region: &str, endpoint_url: Option<&str>) -> DynamoClient {
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;

    let mut builder = DynamoConfigBuilder::from(&aws_config);
    if let Some(endpoint) = endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }

    info!(region = %region, "DynamoDB client initialized");
    DynamoClient::from_conf(builder.build())
}

/// DynamoDB-backed [`Table`].
pub struct DynamoTable {
    client: DynamoClient,
    name: String,
    hash_key: String,
    range_key: Option<String>,
}

impl DynamoTable {
    pub fn new(
        client: DynamoClient,
        name: impl Into<String>,
        hash_key: impl Into<String>,
        range_key: Option<&str>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            hash_key: hash_key.into(),
            range_key: range_key.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key_map(&self, hash: &str, range: Option<&str>) -> Result<HashMap<String, AttributeValue>, StoreError> {
        let mut key = HashMap::new();
        key.insert(self.hash_key.clone(), AttributeValue::S(hash.to_string()));
        match (&self.range_key, range) {
            (Some(range_key), Some(range)) => {
                key.insert(range_key.clone(), AttributeValue::S(range.to_string()));
            }
            (Some(range_key), None) => {
                return Err(StoreError::Malformed(format!(
                    "table {} requires range key {}",
                    self.name, range_key
                )));
            }
            (None, _) => {}
        }
        Ok(key)
    }

    async fn scan_with_projection(&self, fields: Option<&[&str]>) -> Result<Vec<Value>, StoreError> {
        let mut request = self.client.scan().table_name(&self.name);

        if let Some(fields) = fields {
            // The table keys always ride along with a projection; attribute
            // names are aliased because provenance fields contain dashes.
            let mut names: Vec<&str> = vec![self.hash_key.as_str()];
            if let Some(ref range_key) = self.range_key {
                names.push(range_key.as_str());
            }
            let extra: Vec<&str> = fields.iter().copied().filter(|f| !names.contains(f)).collect();
            names.extend(extra);

            let mut aliases = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                let alias = format!("#f{i}");
                request = request.expression_attribute_names(&alias, *name);
                aliases.push(alias);
            }
            request = request.projection_expression(aliases.join(", "));
        }

        let mut items = Vec::new();
        let mut stream = request.into_paginator().items().send();
        while let Some(item) = stream.next().await {
            let item = item.map_err(|e| StoreError::Request(e.to_string()))?;
            items.push(attrs_to_value(&item));
        }
        debug!(table = %self.name, count = items.len(), "Scanned table");
        Ok(items)
    }
}

#[async_trait]
impl Table for DynamoTable {
    #[instrument(skip(self, fields), fields(table = %self.name))]
    async fn get_keys(&self, fields: &[&str]) -> Result<Vec<Value>, StoreError> {
        self.scan_with_projection(Some(fields)).await
    }

    async fn get_item(&self, hash: &str, range: Option<&str>) -> Result<Option<Value>, StoreError> {
        let mut request = self.client.get_item().table_name(&self.name);
        for (name, attr) in self.key_map(hash, range)? {
            request = request.key(name, attr);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(response.item().map(attrs_to_value))
    }

    #[instrument(skip(self, item), fields(table = %self.name))]
    async fn put_item(&self, item: &Value) -> Result<(), StoreError> {
        let obj = item
            .as_object()
            .ok_or_else(|| StoreError::Malformed("item is not an object".into()))?;
        let attrs: HashMap<String, AttributeValue> = obj
            .iter()
            .map(|(k, v)| (k.clone(), value_to_attr(v)))
            .collect();

        self.client
            .put_item()
            .table_name(&self.name)
            .set_item(Some(attrs))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        metrics::counter!("catalog.store.puts").increment(1);
        Ok(())
    }

    #[instrument(skip(self, patch), fields(table = %self.name))]
    async fn update_item(&self, patch: &Value) -> Result<bool, StoreError> {
        let obj = patch
            .as_object()
            .ok_or_else(|| StoreError::Malformed("patch is not an object".into()))?;

        let hash = obj
            .get(&self.hash_key)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Malformed(format!("patch is missing {}", self.hash_key)))?;
        let range = match &self.range_key {
            Some(range_key) => Some(
                obj.get(range_key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Malformed(format!("patch is missing {range_key}")))?,
            ),
            None => None,
        };

        let mut sets = Vec::new();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.name)
            .condition_expression("attribute_exists(#hk)")
            .expression_attribute_names("#hk", &self.hash_key);
        for (name, attr) in self.key_map(hash, range)? {
            request = request.key(name, attr);
        }

        for (i, (field, value)) in obj
            .iter()
            .filter(|(k, _)| {
                k.as_str() != self.hash_key && Some(k.as_str()) != self.range_key.as_deref()
            })
            .enumerate()
        {
            let name_alias = format!("#u{i}");
            let value_alias = format!(":u{i}");
            request = request
                .expression_attribute_names(&name_alias, field)
                .expression_attribute_values(&value_alias, value_to_attr(value));
            sets.push(format!("{name_alias} = {value_alias}"));
        }
        if sets.is_empty() {
            return Ok(true);
        }

        match request
            .update_expression(format!("SET {}", sets.join(", ")))
            .send()
            .await
        {
            Ok(_) => {
                metrics::counter!("catalog.store.updates").increment(1);
                Ok(true)
            }
            Err(e) => {
                let service_error = e.as_service_error();
                if service_error
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StoreError::Request(e.to_string()))
                }
            }
        }
    }

    async fn scan(&self) -> Result<Vec<Value>, StoreError> {
        self.scan_with_projection(None).await
    }

    async fn item_count(&self) -> Result<i64, StoreError> {
        let response = self
            .client
            .describe_table()
            .table_name(&self.name)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(response
            .table()
            .and_then(|t| t.item_count())
            .unwrap_or(0))
    }

    async fn delete_item(&self, hash: &str, range: Option<&str>) -> Result<bool, StoreError> {
        let mut request = self
            .client
            .delete_item()
            .table_name(&self.name)
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllOld);
        for (name, attr) in self.key_map(hash, range)? {
            request = request.key(name, attr);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(response.attributes().is_some())
    }
}

/// Map a DynamoDB item to a flat JSON object.
pub fn attrs_to_value(item: &HashMap<String, AttributeValue>) -> Value {
    let mut obj = Map::with_capacity(item.len());
    for (k, v) in item {
        obj.insert(k.clone(), attr_to_value(v));
    }
    Value::Object(obj)
}

fn attr_to_value(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Number(i.into())
            } else if let Some(f) = n.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(f)
            } else {
                Value::String(n.clone())
            }
        }
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => Value::Array(list.iter().map(attr_to_value).collect()),
        AttributeValue::M(map) => attrs_to_value(map),
        AttributeValue::Ss(list) => {
            Value::Array(list.iter().map(|s| Value::String(s.clone())).collect())
        }
        _ => Value::Null,
    }
}

fn value_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Null => AttributeValue::Null(true),
        Value::Array(items) => AttributeValue::L(items.iter().map(value_to_attr).collect()),
        Value::Object(obj) => AttributeValue::M(
            obj.iter()
                .map(|(k, v)| (k.clone(), value_to_attr(v)))
                .collect(),
        ),
    }
}
