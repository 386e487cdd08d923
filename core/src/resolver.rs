//! Step identity resolution.
//!
//! Maps a raw, possibly legacy, reference onto a canonical id. Resolution
//! tries, in order:
//!
//! 1. The raw spelling itself, when it already carries a position
//!    (`card:step:c:l:idx3`, `step:c:l:idx3`, `hack:c:l:idx3`).
//! 2. The lesson's ordered content: an item whose identifier equals the
//!    reference's trailing token, then the caller's position hint, then an
//!    item whose display text equals the caller's content hint.
//! 3. With a course but no lesson, every lesson of the course is scanned for
//!    an identifier match.
//!
//! Lesson lookups are memoized per lesson and re-run when the provider
//! reports a different content revision. A re-run drops that lesson's stale
//! entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::models::{CanonicalId, Category, ContentHint, ContentItem, FavoriteRef, ParsedReference};
use crate::normalize::{is_well_formed_token, normalize};
use crate::providers::LessonContentProvider;

/// A resolved reference plus the content item it points at, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub id: CanonicalId,
    pub item: Option<ContentItem>,
}

/// Memo size past which every entry is dropped.
const MEMO_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    course_id: String,
    lesson_id: String,
    token: String,
    category: Category,
    position: Option<usize>,
    primary: String,
    secondary: String,
}

#[derive(Debug, Clone)]
struct MemoEntry {
    revision: Option<String>,
    resolution: Option<Resolution>,
}

pub struct StepResolver {
    content: Arc<dyn LessonContentProvider>,
    memo: Mutex<HashMap<MemoKey, MemoEntry>>,
}

impl StepResolver {
    pub fn new(content: Arc<dyn LessonContentProvider>) -> Self {
        Self {
            content,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn content(&self) -> &Arc<dyn LessonContentProvider> {
        &self.content
    }

    /// Resolve from loose parts.
    pub fn resolve_raw(
        &self,
        raw: &str,
        course_hint: Option<&str>,
        lesson_hint: Option<&str>,
        content_hint: Option<&ContentHint>,
    ) -> Option<CanonicalId> {
        let reference = FavoriteRef {
            raw: raw.to_string(),
            course_hint: course_hint.map(str::to_string),
            lesson_hint: lesson_hint.map(str::to_string),
            content: content_hint.cloned(),
            ..Default::default()
        };
        self.resolve(&reference).map(|resolution| resolution.id)
    }

    /// Resolve a reference. `None` means the reference cannot be favorited.
    pub fn resolve(&self, reference: &FavoriteRef) -> Option<Resolution> {
        let category = reference.effective_category();
        let parsed = ParsedReference::parse(&reference.raw);

        if let Some(id) = parsed.direct_id(category) {
            let item = id
                .index()
                .and_then(|index| self.item_at(id.course_id(), id.lesson_id()?, index));
            if item.as_ref().is_some_and(|item| !compatible(item, id.category())) {
                debug!(raw = %reference.raw, id = %id, "Positional reference names an item of another kind");
                return None;
            }
            return Some(Resolution { id, item });
        }

        let course_id = reference
            .course_hint
            .as_deref()
            .or_else(|| parsed.course_id())
            .map(normalize)
            .filter(|c| is_well_formed_token(c));

        if category == Category::Course {
            return self.resolve_course(reference, &parsed, course_id);
        }

        let Some(course_id) = course_id else {
            debug!(raw = %reference.raw, "No course context for reference");
            return None;
        };

        let lesson_id = reference
            .lesson_hint
            .as_deref()
            .or_else(|| parsed.lesson_id())
            .map(normalize)
            .filter(|l| is_well_formed_token(l));

        let token = parsed.token().map(str::to_string);

        let resolution = match lesson_id {
            Some(lesson_id) => {
                self.resolve_in_lesson(reference, category, &course_id, &lesson_id, token.as_deref())
            }
            None => token
                .as_deref()
                .and_then(|token| self.scan_course(category, &course_id, token)),
        };

        if resolution.is_none() {
            debug!(raw = %reference.raw, course = %course_id, "Reference did not match any lesson content");
        }
        resolution
    }

    fn resolve_course(
        &self,
        reference: &FavoriteRef,
        parsed: &ParsedReference,
        course_id: Option<String>,
    ) -> Option<Resolution> {
        let course_id = course_id.or_else(|| {
            parsed
                .token()
                .map(normalize)
                .filter(|c| is_well_formed_token(c))
        });

        match course_id {
            Some(course_id) if self.content.has_course(&course_id) => Some(Resolution {
                id: CanonicalId::course(&course_id),
                item: None,
            }),
            _ => {
                debug!(raw = %reference.raw, "Unknown course reference");
                None
            }
        }
    }

    fn resolve_in_lesson(
        &self,
        reference: &FavoriteRef,
        category: Category,
        course_id: &str,
        lesson_id: &str,
        token: Option<&str>,
    ) -> Option<Resolution> {
        let hint = reference.content.clone().unwrap_or_default();
        let key = MemoKey {
            course_id: course_id.to_string(),
            lesson_id: lesson_id.to_string(),
            token: token.map(normalize).unwrap_or_default(),
            category,
            position: reference.position_hint,
            primary: hint.primary.clone(),
            secondary: hint.secondary.clone(),
        };
        let revision = self.content.revision(course_id, lesson_id);

        {
            let memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = memo.get(&key) {
                if entry.revision == revision {
                    return entry.resolution.clone();
                }
            }
        }

        let items = self.content.items(course_id, lesson_id);
        let resolution = find_position(&items, category, token, reference.position_hint, &hint).map(
            |index| Resolution {
                id: CanonicalId::step(category, course_id, lesson_id, index),
                item: items.get(index).cloned(),
            },
        );

        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        memo.retain(|cached, entry| {
            cached.course_id != key.course_id || cached.lesson_id != key.lesson_id || entry.revision == revision
        });
        if memo.len() >= MEMO_CAPACITY {
            debug!(entries = memo.len(), "Resolver memo full, clearing");
            memo.clear();
        }
        memo.insert(
            key,
            MemoEntry {
                revision,
                resolution: resolution.clone(),
            },
        );
        resolution
    }

    /// Catalog-wide fallback: first identifier match across the course.
    fn scan_course(&self, category: Category, course_id: &str, token: &str) -> Option<Resolution> {
        for lesson_id in self.content.lessons(course_id) {
            let items = self.content.items(course_id, &lesson_id);
            let found = items
                .iter()
                .position(|item| compatible(item, category) && item.matches_identifier(token));
            if let Some(index) = found {
                return Some(Resolution {
                    id: CanonicalId::step(category, course_id, &lesson_id, index),
                    item: items.get(index).cloned(),
                });
            }
        }
        None
    }

    fn item_at(&self, course_id: &str, lesson_id: &str, index: usize) -> Option<ContentItem> {
        self.content.items(course_id, lesson_id).into_iter().nth(index)
    }

    /// Resolve every identified item of a lesson so later lookups hit the memo.
    /// Returns how many items resolved.
    pub fn warm(&self, course_id: &str, lesson_id: &str) -> usize {
        let items = self.content.items(course_id, lesson_id);
        let mut warmed = 0;
        for item in &items {
            let (Some(identifier), Some(category)) = (&item.identifier, item.kind.category()) else {
                continue;
            };
            let reference = FavoriteRef::new(identifier)
                .with_category(category)
                .with_context(course_id, lesson_id);
            if self.resolve(&reference).is_some() {
                warmed += 1;
            }
        }
        warmed
    }

    /// Drop memoized results for one lesson.
    pub fn invalidate_lesson(&self, course_id: &str, lesson_id: &str) {
        let course_id = normalize(course_id);
        let lesson_id = normalize(lesson_id);
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.course_id != course_id || key.lesson_id != lesson_id);
    }

    pub fn clear(&self) {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Items of unknown kind may back any category.
fn compatible(item: &ContentItem, category: Category) -> bool {
    item.kind.category().map_or(true, |c| c == category)
}

fn find_position(
    items: &[ContentItem],
    category: Category,
    token: Option<&str>,
    position: Option<usize>,
    hint: &ContentHint,
) -> Option<usize> {
    if let Some(token) = token {
        let by_identifier = items
            .iter()
            .position(|item| compatible(item, category) && item.matches_identifier(token));
        if by_identifier.is_some() {
            return by_identifier;
        }
    }

    let positional = position
        .filter(|&index| index < items.len())
        .filter(|&index| compatible(&items[index], category));

    if let Some(index) = positional {
        if hint.is_empty() || items[index].matches_text(&hint.primary, &hint.secondary) {
            return Some(index);
        }
    }

    if !hint.is_empty() {
        let by_text = items.iter().position(|item| {
            compatible(item, category) && item.matches_text(&hint.primary, &hint.secondary)
        });
        if by_text.is_some() {
            return by_text;
        }
    }

    positional
}
