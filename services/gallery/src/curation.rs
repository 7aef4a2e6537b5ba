//! The curation engine: filters the snapshot into a result set for one
//! gallery query.
//!
//! Two id-shaped searches short-circuit everything else. Otherwise records
//! are included by default; the presence of any of search/artist/artist_id
//! flips the default to excluded and a record must earn its way back in by
//! matching at least one of them. The universal filters (aspect window,
//! nsfw, score, version) then only ever narrow: they can exclude a
//! promoted record but never re-include one.

use catalog::records::{value_as_f64, value_as_i64, value_truthy, ImageRecord, Orientation};
use catalog::text;
use serde_json::Value;

const DEFAULT_MIN_ASPECT: f64 = 0.1;
const DEFAULT_MAX_ASPECT: f64 = 10.0;

/// Score filter, in precedence order: an exact filter beats a minimum
/// threshold, and the `no_score` token beats both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreFilter {
    #[default]
    Unset,
    /// Only records that were never scored.
    NoScore,
    Exact(i64),
    Min(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionFilter {
    #[default]
    Unset,
    Exact(i64),
    Min(i64),
}

/// A parsed gallery query body. Body values arrive loosely typed (numbers
/// as strings, booleans as "yes"/"1"), so parsing coerces rather than
/// rejects.
#[derive(Debug, Clone, Default)]
pub struct GalleryQuery {
    pub search: Option<String>,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// Present only when the body carried an `nsfw` key at all.
    pub nsfw: Option<bool>,
    pub score: ScoreFilter,
    pub version: VersionFilter,
    /// Shuffle mode for get-by-id navigation.
    pub shuffle: bool,
    pub offset: i64,
    pub limit: Option<i64>,
}

impl GalleryQuery {
    pub fn from_body(body: &Value) -> Self {
        let mut query = GalleryQuery {
            min_aspect_ratio: DEFAULT_MIN_ASPECT,
            max_aspect_ratio: DEFAULT_MAX_ASPECT,
            ..GalleryQuery::default()
        };
        let Some(obj) = body.as_object() else {
            return query;
        };

        query.search = string_field(obj.get("search"));
        query.artist = string_field(obj.get("artist"));
        query.artist_id = string_field(obj.get("artist_id"));

        if let Some(value) = obj.get("min_aspect_ratio").and_then(value_as_f64) {
            query.min_aspect_ratio = value;
        }
        if let Some(value) = obj.get("max_aspect_ratio").and_then(value_as_f64) {
            query.max_aspect_ratio = value;
        }
        // Orientation wins over an explicit window.
        if let Some(orientation) = string_field(obj.get("orientation"))
            .as_deref()
            .and_then(Orientation::parse)
        {
            let (min, max) = match orientation {
                Orientation::Portrait => (0.1, 0.9),
                Orientation::Landscape => (1.1, 10.0),
                Orientation::Square => (1.0, 1.0),
            };
            query.min_aspect_ratio = min;
            query.max_aspect_ratio = max;
        }

        query.nsfw = obj.get("nsfw").map(value_truthy);

        // A zero or unparseable numeric filter counts as unset.
        let exact_score = obj.get("exact_score");
        if exact_score.and_then(Value::as_str) == Some("no_score") {
            query.score = ScoreFilter::NoScore;
        } else if let Some(value) = exact_score.and_then(value_as_i64).filter(|v| *v != 0) {
            query.score = ScoreFilter::Exact(value);
        } else if let Some(value) = obj
            .get("score")
            .and_then(value_as_i64)
            .filter(|v| *v != 0)
        {
            query.score = ScoreFilter::Min(value);
        }

        if let Some(value) = obj
            .get("exact_version")
            .and_then(value_as_i64)
            .filter(|v| *v != 0)
        {
            query.version = VersionFilter::Exact(value);
        } else if let Some(value) = obj
            .get("version")
            .and_then(value_as_i64)
            .filter(|v| *v != 0)
        {
            query.version = VersionFilter::Min(value);
        }

        query.shuffle = string_field(obj.get("mode")).as_deref() == Some("shuffle");
        query.offset = obj.get("offset").and_then(value_as_i64).unwrap_or(0);
        query.limit = obj.get("limit").and_then(value_as_i64).filter(|v| *v > 0);

        query
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A 10-digit numeric search term is a record id.
fn parse_id_search(search: &str) -> Option<i64> {
    if search.len() == 10 && search.bytes().all(|b| b.is_ascii_digit()) {
        search.parse().ok()
    } else {
        None
    }
}

/// A whitespace-free term ending in ".png" is a filename.
fn is_filename_search(search: &str) -> bool {
    search.len() > ".png".len()
        && !search.chars().any(char::is_whitespace)
        && search.ends_with(".png")
}

/// Filter the snapshot into the result set for one query. No ordering is
/// applied here; callers sort before paginating.
pub fn curate(records: &[ImageRecord], query: &GalleryQuery) -> Vec<ImageRecord> {
    if let Some(search) = query.search.as_deref() {
        if let Some(id) = parse_id_search(search) {
            return records.iter().filter(|r| r.id == id).cloned().collect();
        }
        if is_filename_search(search) {
            return records
                .iter()
                .find(|r| r.filename == search)
                .cloned()
                .into_iter()
                .collect();
        }
    }

    let narrowed = query.search.is_some() || query.artist.is_some() || query.artist_id.is_some();
    let search_term = query.search.as_deref().map(text::normalize);
    let artist_term = query.artist.as_deref().map(text::normalize);

    let mut selected = Vec::new();
    for record in records {
        let mut include = !narrowed;

        if let Some(ref term) = search_term {
            let fields = [&record.artist_name, &record.subject, &record.style];
            if fields
                .iter()
                .any(|f| f.as_deref().is_some_and(|f| text::contains_phrase(&text::normalize(f), term)))
            {
                include = true;
            }
        }

        if let Some(ref artist_id) = query.artist_id {
            if record.artist_id.as_deref() == Some(artist_id.as_str()) {
                include = true;
            }
        }

        if let Some(ref term) = artist_term {
            if record
                .artist_name
                .as_deref()
                .is_some_and(|name| text::contains_phrase(&text::normalize(name), term))
            {
                include = true;
            }
        }

        if record.aspect_ratio < query.min_aspect_ratio
            || record.aspect_ratio > query.max_aspect_ratio
        {
            include = false;
        }

        if let Some(want_nsfw) = query.nsfw {
            if record.nsfw != want_nsfw {
                include = false;
            }
        }

        match query.score {
            ScoreFilter::Unset => {}
            ScoreFilter::NoScore => {
                if record.score.is_some() {
                    include = false;
                }
            }
            ScoreFilter::Exact(want) => {
                if record.score != Some(want) {
                    include = false;
                }
            }
            ScoreFilter::Min(threshold) => match record.score {
                Some(score) if score >= threshold => {}
                _ => include = false,
            },
        }

        match query.version {
            VersionFilter::Unset => {}
            VersionFilter::Exact(want) => {
                if record.version != want {
                    include = false;
                }
            }
            VersionFilter::Min(threshold) => {
                if record.version < threshold {
                    include = false;
                }
            }
        }

        if include {
            selected.push(record.clone());
        }
    }
    selected
}
