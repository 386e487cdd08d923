//! Category-partitioned views over the store's records.
//!
//! Rebuilt in full after every mutation and shared read-only behind an `Arc`.

use std::collections::{BTreeSet, HashSet};

use crate::models::{comparison_key, Category, FavoriteRecord};
use crate::normalize::normalize;

/// Canonical ids split by category. The three sets never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySets {
    pub courses: BTreeSet<String>,
    pub cards: BTreeSet<String>,
    pub hacks: BTreeSet<String>,
}

impl CategorySets {
    pub fn from_records(records: &[FavoriteRecord]) -> Self {
        let mut sets = Self::default();
        for record in records {
            let id = record.canonical_id.clone();
            match record.category() {
                Category::Course => sets.courses.insert(id),
                Category::Card => sets.cards.insert(id),
                Category::Hack => sets.hacks.insert(id),
            };
        }
        sets
    }

    pub fn len(&self) -> usize {
        self.courses.len() + self.cards.len() + self.hacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DerivedCache {
    pub courses: Vec<FavoriteRecord>,
    pub cards: Vec<FavoriteRecord>,
    pub hacks: Vec<FavoriteRecord>,
    /// Canonical ids and their category-normalized comparison keys.
    pub liked_ids: HashSet<String>,
}

impl DerivedCache {
    /// Build every view from `records`, which must already be newest-first.
    pub fn rebuild(records: &[FavoriteRecord]) -> Self {
        let mut cache = Self::default();
        for record in records {
            cache.liked_ids.insert(record.canonical_id.clone());
            cache.liked_ids.insert(record.comparison_key());
            match record.category() {
                Category::Course => cache.courses.push(record.clone()),
                Category::Card => cache.cards.push(record.clone()),
                Category::Hack => cache.hacks.push(record.clone()),
            }
        }
        cache
    }

    /// O(1) membership for any spelling that maps onto a stored id without
    /// consulting lesson content.
    pub fn contains(&self, raw: &str) -> bool {
        self.liked_ids.contains(raw)
            || self.liked_ids.contains(&comparison_key(raw))
            || self.liked_ids.contains(&normalize(raw))
    }

    pub fn view(&self, category: Category) -> &[FavoriteRecord] {
        match category {
            Category::Course => &self.courses,
            Category::Card => &self.cards,
            Category::Hack => &self.hacks,
        }
    }

    pub fn len(&self) -> usize {
        self.courses.len() + self.cards.len() + self.hacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalId;
    use chrono::{TimeZone, Utc};

    fn records() -> Vec<FavoriteRecord> {
        let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();
        let mut records = vec![
            FavoriteRecord::new(&CanonicalId::course("coursea"), "Vietnamese", "", "", at(1)),
            FavoriteRecord::new(&CanonicalId::step(Category::Card, "coursea", "l1", 3), "hello", "", "", at(3)),
            FavoriteRecord::new(&CanonicalId::step(Category::Hack, "coursea", "l1", 2), "", "Tip", "hack:Tip", at(2)),
            FavoriteRecord::new(&CanonicalId::step(Category::Card, "coursea", "l1", 4), "bye", "", "", at(4)),
        ];
        FavoriteRecord::sort_newest_first(&mut records);
        records
    }

    #[test]
    fn test_rebuild_partitions_by_prefix() {
        let cache = DerivedCache::rebuild(&records());
        assert_eq!(cache.courses.len(), 1);
        assert_eq!(cache.cards.len(), 2);
        assert_eq!(cache.hacks.len(), 1);
        assert_eq!(cache.cards[0].primary_text, "bye");
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_contains_accepts_legacy_card_spellings() {
        let cache = DerivedCache::rebuild(&records());
        assert!(cache.contains("card:step:coursea:l1:idx3"));
        assert!(cache.contains("step:coursea:l1:idx3"));
        assert!(cache.contains("card:CourseA:l1:idx3"));
        assert!(cache.contains("COURSE:CourseA"));
        assert!(!cache.contains("card:step:coursea:l1:idx9"));
        // A card spelling must not match the hack at the same position.
        assert!(!cache.contains("step:coursea:l1:idx2"));
    }

    #[test]
    fn test_category_sets_partition() {
        let records = records();
        let sets = CategorySets::from_records(&records);
        assert_eq!(sets.len(), records.len());
        assert!(sets.courses.contains("course:coursea"));
        assert!(sets.hacks.contains("hack:step:coursea:l1:idx2"));
        assert!(sets.cards.is_disjoint(&sets.hacks));
    }

    #[test]
    fn test_empty() {
        let cache = DerivedCache::rebuild(&[]);
        assert!(cache.is_empty());
        assert!(CategorySets::from_records(&[]).is_empty());
    }
}
