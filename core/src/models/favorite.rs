use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{comparison_key, CanonicalId, Category};

/// Prefix of the legacy `metaText` carried by tip favorites.
pub const HACK_META_PREFIX: &str = "hack:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    #[serde(alias = "id", alias = "canonical_id")]
    pub canonical_id: String,
    #[serde(default, alias = "primary_text")]
    pub primary_text: String,
    #[serde(default, alias = "secondary_text")]
    pub secondary_text: String,
    #[serde(default, alias = "meta_text")]
    pub meta_text: String,
    #[serde(default, alias = "course_id")]
    pub course_id: String,
    #[serde(default, alias = "lesson_id")]
    pub lesson_id: String,
    #[serde(default, alias = "lesson_title", skip_serializing_if = "Option::is_none")]
    pub lesson_title: Option<String>,
    #[serde(
        default,
        alias = "created_at",
        deserialize_with = "deserialize_created_at"
    )]
    pub created_at: DateTime<Utc>,
}

impl FavoriteRecord {
    /// Create a record for a resolved id
    pub fn new(
        id: &CanonicalId,
        primary_text: &str,
        secondary_text: &str,
        meta_text: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            canonical_id: id.to_string(),
            primary_text: primary_text.to_string(),
            secondary_text: secondary_text.to_string(),
            meta_text: meta_text.to_string(),
            course_id: id.course_id().to_string(),
            lesson_id: id.lesson_id().unwrap_or_default().to_string(),
            lesson_title: None,
            created_at,
        }
    }

    /// Category as derived from the id prefix
    pub fn category(&self) -> Category {
        Category::from_id(&self.canonical_id)
    }

    pub fn comparison_key(&self) -> String {
        comparison_key(&self.canonical_id)
    }

    /// Canonical store order: newest first, ties broken by id descending.
    pub fn recency_order(a: &FavoriteRecord, b: &FavoriteRecord) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.canonical_id.cmp(&a.canonical_id))
    }

    pub fn sort_newest_first(records: &mut [FavoriteRecord]) {
        records.sort_by(Self::recency_order);
    }

    /// Legacy `metaText` for a tip body.
    pub fn hack_meta(body: &str) -> String {
        format!("{HACK_META_PREFIX}{body}")
    }
}

/// Accepts RFC 3339 strings and the legacy Unix-millisecond numbers.
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(DateTime<Utc>),
        Millis(i64),
    }

    Ok(match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(dt) => dt,
        RawTimestamp::Millis(ms) => super::timestamp_to_datetime(ms),
    })
}
