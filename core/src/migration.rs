//! One-shot rewrite of persisted favorites onto canonical ids.
//!
//! Every record whose id is not already canonical is resolved using its own
//! course, lesson and text fields as hints. Records that cannot be resolved
//! keep their prior id. Afterwards duplicates collapse onto the most recent
//! record, with legacy and modern card spellings treated as one item.
//!
//! Running the engine over its own output changes nothing.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::models::{
    CanonicalId, Category, ContentHint, ContentItem, FavoriteRecord, FavoriteRef, HACK_META_PREFIX,
};
use crate::normalize::{normalize, normalize_text};
use crate::providers::LessonTitleProvider;
use crate::resolver::StepResolver;

const CATEGORY_LABELS: &[&str] = &["hack", "hacks", "lifehack", "lifehacks", "life hack", "tip", "tips"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records whose id changed.
    pub rewritten: usize,
    /// Records kept under a non-canonical id.
    pub unresolved: usize,
    /// Records dropped as older duplicates.
    pub coalesced: usize,
    pub titles_filled: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.rewritten == 0 && self.coalesced == 0 && self.titles_filled == 0
    }
}

pub struct MigrationEngine<'a> {
    resolver: &'a StepResolver,
    titles: &'a dyn LessonTitleProvider,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(resolver: &'a StepResolver, titles: &'a dyn LessonTitleProvider) -> Self {
        Self { resolver, titles }
    }

    pub fn migrate(&self, records: &[FavoriteRecord]) -> Vec<FavoriteRecord> {
        self.migrate_with_report(records).0
    }

    pub fn migrate_with_report(&self, records: &[FavoriteRecord]) -> (Vec<FavoriteRecord>, MigrationReport) {
        let mut report = MigrationReport::default();
        let rewritten: Vec<FavoriteRecord> = records
            .iter()
            .map(|record| self.migrate_record(record, &mut report))
            .collect();

        let before = rewritten.len();
        let migrated = coalesce(rewritten);
        report.coalesced = before - migrated.len();

        if report.is_noop() && report.unresolved == 0 {
            debug!(records = migrated.len(), "Favorites already canonical");
        } else {
            info!(
                records = migrated.len(),
                rewritten = report.rewritten,
                unresolved = report.unresolved,
                coalesced = report.coalesced,
                titles_filled = report.titles_filled,
                "Favorites migrated"
            );
        }
        (migrated, report)
    }

    fn migrate_record(&self, record: &FavoriteRecord, report: &mut MigrationReport) -> FavoriteRecord {
        let mut migrated = record.clone();
        let mut resolved_item = None;

        let id = if CanonicalId::is_canonical(&record.canonical_id) {
            CanonicalId::parse(&record.canonical_id)
        } else {
            match self.resolver.resolve(&reference_for(record)) {
                Some(resolution) => {
                    migrated.canonical_id = resolution.id.to_string();
                    report.rewritten += 1;
                    resolved_item = resolution.item;
                    Some(resolution.id)
                }
                None => {
                    debug!(id = %record.canonical_id, "Keeping unresolvable favorite under its prior id");
                    report.unresolved += 1;
                    None
                }
            }
        };

        match &id {
            Some(id) => {
                migrated.course_id = id.course_id().to_string();
                migrated.lesson_id = id.lesson_id().unwrap_or_default().to_string();
            }
            None => {
                migrated.course_id = normalize(&record.course_id);
                migrated.lesson_id = normalize(&record.lesson_id);
            }
        }

        if let Some(item) = &resolved_item {
            fill_missing_text(&mut migrated, item);
        }

        let has_title = migrated
            .lesson_title
            .as_deref()
            .is_some_and(|title| !title.trim().is_empty());
        if !has_title && !migrated.lesson_id.is_empty() {
            let title = self.titles.title(&migrated.course_id, &migrated.lesson_id);
            if title.is_some() {
                report.titles_filled += 1;
            }
            migrated.lesson_title = title;
        }

        if migrated.category() == Category::Hack {
            repair_hack_payload(&mut migrated, resolved_item.as_ref());
        }

        migrated
    }
}

/// Resolution hints drawn from a record's own fields.
fn reference_for(record: &FavoriteRecord) -> FavoriteRef {
    let category = Category::from_id(&record.canonical_id);
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());

    let content = match category {
        Category::Hack => hack_body(record).map(|body| ContentHint::new("", &body)),
        Category::Card => Some(ContentHint::new(&record.primary_text, &record.secondary_text)),
        Category::Course => None,
    };

    FavoriteRef {
        raw: record.canonical_id.clone(),
        category: Some(category),
        course_hint: non_empty(&record.course_id),
        lesson_hint: non_empty(&record.lesson_id),
        position_hint: None,
        content,
    }
}

fn is_category_label(text: &str) -> bool {
    let folded = normalize_text(text);
    CATEGORY_LABELS.contains(&folded.as_str())
}

/// Visible body of a tip record, wherever a past version stored it.
fn hack_body(record: &FavoriteRecord) -> Option<String> {
    let from_meta = record
        .meta_text
        .strip_prefix(HACK_META_PREFIX)
        .unwrap_or(&record.meta_text);

    [record.secondary_text.as_str(), from_meta, record.primary_text.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|text| !text.is_empty() && !is_category_label(text))
        .map(str::to_string)
}

fn repair_hack_payload(record: &mut FavoriteRecord, item: Option<&ContentItem>) {
    let body = hack_body(record).or_else(|| item.map(|item| item.body().to_string()));
    let Some(body) = body else {
        return;
    };

    if is_category_label(&record.secondary_text) && record.primary_text.trim() == body {
        record.primary_text = record.secondary_text.clone();
    }
    record.meta_text = FavoriteRecord::hack_meta(&body);
    record.secondary_text = body;
}

fn fill_missing_text(record: &mut FavoriteRecord, item: &ContentItem) {
    if record.primary_text.trim().is_empty() {
        record.primary_text = item.primary_text.clone();
    }
    if record.secondary_text.trim().is_empty() {
        record.secondary_text = item.secondary_text.clone();
    }
}

/// Keep the newest record per comparison key; output is newest-first.
pub fn coalesce(mut records: Vec<FavoriteRecord>) -> Vec<FavoriteRecord> {
    FavoriteRecord::sort_newest_first(&mut records);
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.comparison_key()));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use crate::providers::LessonCatalog;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(id: &str, primary: &str, secondary: &str, created: i64) -> FavoriteRecord {
        FavoriteRecord {
            canonical_id: id.to_string(),
            primary_text: primary.to_string(),
            secondary_text: secondary.to_string(),
            meta_text: String::new(),
            course_id: String::new(),
            lesson_id: String::new(),
            lesson_title: None,
            created_at: at(created),
        }
    }

    fn setup() -> (Arc<LessonCatalog>, StepResolver) {
        let catalog = LessonCatalog::new();
        catalog.insert_lesson(
            "coursea",
            "lesson1",
            Some("Greetings"),
            vec![
                ContentItem::new(Some("a"), ContentKind::Word, "one", "một"),
                ContentItem::new(Some("b"), ContentKind::Word, "two", "hai"),
                ContentItem::new(None, ContentKind::Tip, "Lifehack", "Remember tones!"),
                ContentItem::new(None, ContentKind::Word, "three", "ba"),
                ContentItem::new(None, ContentKind::Word, "four", "bốn"),
                ContentItem::new(None, ContentKind::Word, "hello", "xin chào"),
            ],
        );
        let catalog = Arc::new(catalog);
        let resolver = StepResolver::new(catalog.clone());
        (catalog, resolver)
    }

    #[test]
    fn test_dotted_legacy_resolves_by_text() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let out = engine.migrate(&[record("coursea.lesson1.greeting", "hello", "", 1)]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].canonical_id, "card:step:coursea:lesson1:idx5");
        assert_eq!(out[0].course_id, "coursea");
        assert_eq!(out[0].lesson_id, "lesson1");
        assert_eq!(out[0].lesson_title.as_deref(), Some("Greetings"));
        assert_eq!(out[0].secondary_text, "xin chào");
    }

    #[test]
    fn test_step_and_card_duplicates_keep_latest() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let (out, report) = engine.migrate_with_report(&[
            record("step:coursea:lesson1:idx1", "two (old)", "hai", 10),
            record("card:coursea:lesson1:idx1", "two (new)", "hai", 20),
        ]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].canonical_id, "card:step:coursea:lesson1:idx1");
        assert_eq!(out[0].primary_text, "two (new)");
        assert_eq!(report.coalesced, 1);
        assert_eq!(report.rewritten, 2);
    }

    #[test]
    fn test_hack_payload_repaired() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let mut legacy = record("hack:coursea:lesson1:idx2", "Remember tones!", "Lifehack", 1);
        legacy.course_id = "CourseA".to_string();

        let out = engine.migrate(&[legacy]);
        assert_eq!(out[0].canonical_id, "hack:step:coursea:lesson1:idx2");
        assert_eq!(out[0].secondary_text, "Remember tones!");
        assert_eq!(out[0].meta_text, "hack:Remember tones!");
        assert_eq!(out[0].primary_text, "Lifehack");
    }

    #[test]
    fn test_hack_resolved_by_meta_body() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let mut legacy = record("lifehack:tones", "Lifehack", "", 1);
        legacy.meta_text = "hack:Remember tones!".to_string();
        legacy.course_id = "coursea".to_string();
        legacy.lesson_id = "lesson1".to_string();

        let out = engine.migrate(&[legacy]);
        assert_eq!(out[0].canonical_id, "hack:step:coursea:lesson1:idx2");
        assert_eq!(out[0].secondary_text, "Remember tones!");
    }

    #[test]
    fn test_unresolvable_kept_under_prior_id() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let mut legacy = record("Mystery.Lesson.Token", "nothing", "", 1);
        legacy.course_id = " Mystery ".to_string();

        let (out, report) = engine.migrate_with_report(&[legacy]);
        assert_eq!(out[0].canonical_id, "Mystery.Lesson.Token");
        assert_eq!(out[0].course_id, "mystery");
        assert_eq!(report.unresolved, 1);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let (catalog, resolver) = setup();
        let engine = MigrationEngine::new(&resolver, catalog.as_ref());
        let input = vec![
            record("coursea.lesson1.greeting", "hello", "", 3),
            record("step:coursea:lesson1:idx0", "one", "một", 2),
            record("card:coursea:lesson1:idx0", "one", "một", 1),
            record("hack:coursea:lesson1:idx2", "Remember tones!", "Lifehack", 4),
            record("course:CourseA", "Vietnamese", "", 5),
            record("garbage", "", "", 6),
        ];

        let once = engine.migrate(&input);
        let twice = engine.migrate(&once);
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
        assert_eq!(once.len(), 5);
    }

    #[test]
    fn test_coalesce_orders_newest_first() {
        let out = coalesce(vec![
            record("card:step:c:l:idx0", "a", "", 1),
            record("card:step:c:l:idx1", "b", "", 3),
            record("step:c:l:idx0", "a2", "", 2),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].primary_text, "b");
        assert_eq!(out[1].primary_text, "a2");
    }
}
