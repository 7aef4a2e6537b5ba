//! The image record model.
//!
//! Records cross the store boundary as flat JSON objects (the table adapter
//! speaks `serde_json::Value`). [`ImageRecord`] gives the curation engine a
//! typed view of the fields it depends on while carrying every unrecognized
//! field in an `extra` bag, so new provenance fields survive a round trip
//! without a schema change.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::text;

/// Wire names of the fields the snapshot projection fetches for filtering.
pub const PROJECTION_FIELDS: &[&str] = &[
    "nsfw",
    "score",
    "aspect_ratio",
    "query-artist_id",
    "query-artist_name",
    "query-subject",
    "query-style",
];

/// Timestamp breakpoints that bucket records into schema versions. Each
/// cutover corresponds to a model-generation change in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCutovers {
    pub v1_max: i64,
    pub v2_max: i64,
    pub v3_max: i64,
}

impl Default for VersionCutovers {
    fn default() -> Self {
        Self {
            v1_max: 1_690_216_293,
            v2_max: 1_691_577_582,
            v3_max: 1_693_321_367,
        }
    }
}

impl VersionCutovers {
    /// Version bucket for a derived record id (epoch seconds).
    pub fn version_for(&self, id: i64) -> i64 {
        if id <= self.v1_max {
            1
        } else if id <= self.v2_max {
            2
        } else if id <= self.v3_max {
            3
        } else {
            4
        }
    }
}

/// Image orientation, derived from the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn from_aspect_ratio(aspect_ratio: f64) -> Self {
        if aspect_ratio < 1.0 {
            Orientation::Portrait
        } else if aspect_ratio > 1.0 {
            Orientation::Landscape
        } else {
            Orientation::Square
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            "square" => Some(Orientation::Square),
            _ => None,
        }
    }
}

/// One image in the catalogue, as held by the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Unique object name, e.g. "vincent_van_gogh-20230801_121509.png".
    pub filename: String,
    /// Creation timestamp, seconds precision, stored without offset.
    pub create_time: String,
    /// Epoch seconds parsed from `create_time`.
    pub id: i64,
    pub aspect_ratio: f64,
    pub nsfw: bool,
    /// 1-5 quality score; absent means "not scored yet".
    pub score: Option<i64>,
    /// Schema version bucket derived from `id`.
    pub version: i64,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub subject: Option<String>,
    pub style: Option<String>,
    /// Fields the snapshot does not interpret, preserved for round trips.
    pub extra: BTreeMap<String, Value>,
}

impl ImageRecord {
    /// Parse a flat store item into a record, deriving `id`, `version`, and
    /// a missing `artist_id`. Returns `None` when the item violates the
    /// snapshot invariants (missing keys, unparseable timestamp, or a
    /// non-positive aspect ratio).
    pub fn from_item(item: &Value, cutovers: &VersionCutovers) -> Option<Self> {
        let obj = item.as_object()?;
        let filename = obj.get("filename")?.as_str()?.to_string();
        let create_time = obj.get("create_time")?.as_str()?.to_string();
        let id = parse_create_time(&create_time)?;
        let aspect_ratio = value_as_f64(obj.get("aspect_ratio")?)?;
        if aspect_ratio <= 0.0 {
            return None;
        }

        let artist_name = obj
            .get("query-artist_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let artist_id = obj
            .get("query-artist_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| artist_name.as_deref().map(text::snake_case));

        let known = [
            "filename",
            "create_time",
            "aspect_ratio",
            "nsfw",
            "score",
            "query-artist_id",
            "query-artist_name",
            "query-subject",
            "query-style",
        ];
        let extra: BTreeMap<String, Value> = obj
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            filename,
            create_time,
            id,
            aspect_ratio,
            nsfw: obj.get("nsfw").map(value_truthy).unwrap_or(false),
            score: obj.get("score").and_then(value_as_i64),
            version: cutovers.version_for(id),
            artist_id,
            artist_name,
            subject: obj
                .get("query-subject")
                .and_then(Value::as_str)
                .map(str::to_string),
            style: obj
                .get("query-style")
                .and_then(Value::as_str)
                .map(str::to_string),
            extra,
        })
    }

    /// Serialize back to the flat wire shape, including derived fields.
    pub fn to_item(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("filename".into(), json!(self.filename));
        obj.insert("create_time".into(), json!(self.create_time));
        obj.insert("id".into(), json!(self.id));
        obj.insert("aspect_ratio".into(), json!(self.aspect_ratio));
        obj.insert("nsfw".into(), json!(self.nsfw));
        if let Some(score) = self.score {
            obj.insert("score".into(), json!(score));
        }
        obj.insert("version".into(), json!(self.version));
        if let Some(ref v) = self.artist_id {
            obj.insert("query-artist_id".into(), json!(v));
        }
        if let Some(ref v) = self.artist_name {
            obj.insert("query-artist_name".into(), json!(v));
        }
        if let Some(ref v) = self.subject {
            obj.insert("query-subject".into(), json!(v));
        }
        if let Some(ref v) = self.style {
            obj.insert("query-style".into(), json!(v));
        }
        for (k, v) in &self.extra {
            obj.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Value::Object(obj)
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_aspect_ratio(self.aspect_ratio)
    }
}

/// Parse a record timestamp to epoch seconds. Timestamps are written
/// without an offset ("2023-08-01T12:15:09") and are UTC; RFC 3339 values
/// are accepted as well.
pub fn parse_create_time(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// Format `now` the way record timestamps are stored.
pub fn format_create_time(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Display label for a generation engine name, where one is known.
pub fn engine_label(engine_name: &str) -> Option<&'static str> {
    match engine_name {
        "sdxl" => Some("Stable Diffusion XL Beta"),
        "sdxl-1.0" => Some("Stable Diffusion XL 1.0"),
        "sd-1.5" => Some("Stable Diffusion 1.5"),
        _ => None,
    }
}

/// Loose integer coercion: store items may carry numbers as JSON numbers or
/// as strings, depending on which writer produced them.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Loose float coercion, same rationale as [`value_as_i64`].
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Loose boolean coercion for query bodies and store items.
pub fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "yes" | "y" | "1" | "on")
        }
        _ => false,
    }
}
