//! Collaborators the store consumes but does not own.
//!
//! Content and titles are read-only from the store's side; the aggregator is
//! write-only. All three are injected as `Arc<dyn _>` at construction.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{ContentItem, ContentItemShape};
use crate::normalize::normalize;
use crate::{Error, Result};

/// Ordered lesson content, indexed by position.
pub trait LessonContentProvider: Send + Sync {
    /// Items of a lesson in their stable order. Unknown lessons yield an empty list.
    fn items(&self, course_id: &str, lesson_id: &str) -> Vec<ContentItem>;

    /// Lessons of a course, in course order.
    fn lessons(&self, course_id: &str) -> Vec<String>;

    /// Opaque content revision of a lesson. A change tells resolvers their
    /// memoized results for that lesson are stale.
    fn revision(&self, _course_id: &str, _lesson_id: &str) -> Option<String> {
        None
    }

    fn has_course(&self, course_id: &str) -> bool {
        !self.lessons(course_id).is_empty()
    }
}

pub trait LessonTitleProvider: Send + Sync {
    fn title(&self, course_id: &str, lesson_id: &str) -> Option<String>;
}

/// Downstream consumer of categorized favorite ids. Always receives a full
/// replacement of all three sets.
pub trait SessionAggregator: Send + Sync {
    fn set_favorites(
        &self,
        courses: BTreeSet<String>,
        cards: BTreeSet<String>,
        hacks: BTreeSet<String>,
    );
}

/// Aggregator that drops everything, for callers with no downstream consumer.
pub struct NoopAggregator;

impl SessionAggregator for NoopAggregator {
    fn set_favorites(&self, _: BTreeSet<String>, _: BTreeSet<String>, _: BTreeSet<String>) {}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Many { courses: Vec<CourseEntry> },
    One(CourseEntry),
}

#[derive(Debug, Deserialize)]
struct CourseEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    lessons: Vec<LessonEntry>,
}

#[derive(Debug, Deserialize)]
struct LessonEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    items: Vec<ContentItemShape>,
}

#[derive(Debug, Clone)]
struct CatalogLesson {
    id: String,
    title: Option<String>,
    items: Vec<ContentItem>,
    fingerprint: String,
}

#[derive(Debug, Clone, Default)]
struct CatalogCourse {
    title: Option<String>,
    lessons: Vec<CatalogLesson>,
}

/// In-memory lesson catalog serving both content and titles.
///
/// Course and lesson ids are normalized on the way in and on lookup.
#[derive(Debug, Default)]
pub struct LessonCatalog {
    courses: RwLock<BTreeMap<String, CatalogCourse>>,
}

impl LessonCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog document: one course object or `{"courses": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let catalog = Self::new();
        catalog.merge_json_str(json)?;
        Ok(catalog)
    }

    /// Load a catalog file, or every `.json` file under a directory.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("catalog {}", path.display())));
        }
        let catalog = Self::new();

        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::InvalidInput(e.to_string()))?;
                let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
                if !entry.file_type().is_file() || !is_json {
                    continue;
                }
                let content = std::fs::read_to_string(entry.path())?;
                if let Err(err) = catalog.merge_json_str(&content) {
                    warn!(path = %entry.path().display(), error = %err, "Skipping unreadable catalog file");
                }
            }
        } else {
            let content = std::fs::read_to_string(path)?;
            catalog.merge_json_str(&content)?;
        }

        Ok(catalog)
    }

    fn merge_json_str(&self, json: &str) -> Result<()> {
        let courses = match serde_json::from_str::<CatalogDocument>(json)? {
            CatalogDocument::Many { courses } => courses,
            CatalogDocument::One(course) => vec![course],
        };

        for course in courses {
            if let Some(title) = &course.title {
                self.set_course_title(&course.id, title);
            }
            for lesson in course.lessons {
                let items = lesson.items.into_iter().map(ContentItem::from).collect();
                self.insert_lesson(&course.id, &lesson.id, lesson.title.as_deref(), items);
            }
        }
        Ok(())
    }

    pub fn set_course_title(&self, course_id: &str, title: &str) {
        let Ok(mut courses) = self.courses.write() else {
            return;
        };
        courses.entry(normalize(course_id)).or_default().title = Some(title.to_string());
    }

    /// Insert or replace a lesson. Replacing changes its revision.
    pub fn insert_lesson(
        &self,
        course_id: &str,
        lesson_id: &str,
        title: Option<&str>,
        items: Vec<ContentItem>,
    ) {
        let Ok(mut courses) = self.courses.write() else {
            return;
        };
        let lesson_id = normalize(lesson_id);
        let lesson = CatalogLesson {
            fingerprint: fingerprint(&items),
            id: lesson_id.clone(),
            title: title.map(str::to_string),
            items,
        };
        debug!(course = %course_id, lesson = %lesson_id, items = lesson.items.len(), "Catalog lesson loaded");

        let course = courses.entry(normalize(course_id)).or_default();
        match course.lessons.iter_mut().find(|l| l.id == lesson_id) {
            Some(existing) => *existing = lesson,
            None => course.lessons.push(lesson),
        }
    }

    pub fn course_ids(&self) -> Vec<String> {
        self.courses
            .read()
            .map(|courses| courses.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn course_title(&self, course_id: &str) -> Option<String> {
        let courses = self.courses.read().ok()?;
        courses.get(&normalize(course_id))?.title.clone()
    }

    fn with_lesson<T>(&self, course_id: &str, lesson_id: &str, f: impl FnOnce(&CatalogLesson) -> T) -> Option<T> {
        let courses = self.courses.read().ok()?;
        let lesson_id = normalize(lesson_id);
        courses
            .get(&normalize(course_id))?
            .lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .map(f)
    }
}

fn fingerprint(items: &[ContentItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item.identifier.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{:?}", item.kind).as_bytes());
        hasher.update([0u8]);
        hasher.update(item.primary_text.as_bytes());
        hasher.update([0u8]);
        hasher.update(item.secondary_text.as_bytes());
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}

impl LessonContentProvider for LessonCatalog {
    fn items(&self, course_id: &str, lesson_id: &str) -> Vec<ContentItem> {
        self.with_lesson(course_id, lesson_id, |l| l.items.clone())
            .unwrap_or_default()
    }

    fn lessons(&self, course_id: &str) -> Vec<String> {
        self.courses
            .read()
            .ok()
            .and_then(|courses| {
                courses
                    .get(&normalize(course_id))
                    .map(|c| c.lessons.iter().map(|l| l.id.clone()).collect())
            })
            .unwrap_or_default()
    }

    fn revision(&self, course_id: &str, lesson_id: &str) -> Option<String> {
        self.with_lesson(course_id, lesson_id, |l| l.fingerprint.clone())
    }
}

impl LessonTitleProvider for LessonCatalog {
    fn title(&self, course_id: &str, lesson_id: &str) -> Option<String> {
        self.with_lesson(course_id, lesson_id, |l| l.title.clone())
            .flatten()
    }
}
