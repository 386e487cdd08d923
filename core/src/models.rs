mod canonical_id;
mod content;
mod favorite;
mod favorite_ref;

pub use canonical_id::{comparison_key, CanonicalId, Category, ParsedReference};
pub use content::{ContentItem, ContentItemShape, ContentKind};
pub use favorite::{FavoriteRecord, HACK_META_PREFIX};
pub use favorite_ref::{ContentHint, FavoriteRef};

use chrono::{DateTime, Utc};

/// Convert Unix timestamp (milliseconds) to DateTime<Utc>
pub fn timestamp_to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default()
}

/// Convert DateTime<Utc> to Unix timestamp (milliseconds)
pub fn datetime_to_timestamp(datetime: &DateTime<Utc>) -> i64 {
    datetime.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_conversion_keeps_millis() {
        let dt = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(timestamp_to_datetime(datetime_to_timestamp(&dt)), dt);
    }
}
