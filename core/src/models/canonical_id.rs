use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::{is_well_formed_token, normalize, NAMESPACE_SEP, PATH_SEP};

/// Favorite category, discriminated by canonical id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Course,
    Card,
    Hack,
}

impl Category {
    pub fn prefix(&self) -> &'static str {
        match self {
            Category::Course => "course",
            Category::Card => "card",
            Category::Hack => "hack",
        }
    }

    /// Parse a category name, accepting the legacy aliases.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "course" => Some(Category::Course),
            "card" | "word" | "phrase" | "vocab" => Some(Category::Card),
            "hack" | "lifehack" | "tip" => Some(Category::Hack),
            _ => None,
        }
    }

    /// Category of any stored id, canonical or legacy.
    ///
    /// Only the prefix is consulted. Unprefixed and `step:` ids are cards.
    pub fn from_id(id: &str) -> Self {
        let normalized = normalize(id);
        let head = normalized.split(NAMESPACE_SEP).next().unwrap_or_default();
        match head {
            "course" => Category::Course,
            "hack" | "lifehack" | "tip" => Category::Hack,
            _ => Category::Card,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

const STEP_NAMESPACE: &str = "step";
const INDEX_PREFIX: &str = "idx";

/// The single authoritative identity of a favorite.
///
/// ```text
/// course:<courseId>
/// card:step:<courseId>:<lessonId>:idx<N>
/// hack:step:<courseId>:<lessonId>:idx<N>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalId {
    Course {
        course_id: String,
    },
    Card {
        course_id: String,
        lesson_id: String,
        index: usize,
    },
    Hack {
        course_id: String,
        lesson_id: String,
        index: usize,
    },
}

impl CanonicalId {
    pub fn course(course_id: &str) -> Self {
        CanonicalId::Course {
            course_id: normalize(course_id),
        }
    }

    /// Build a step id for `category`. Course is not a step category and
    /// collapses to the course id.
    pub fn step(category: Category, course_id: &str, lesson_id: &str, index: usize) -> Self {
        let course_id = normalize(course_id);
        let lesson_id = normalize(lesson_id);
        match category {
            Category::Course => CanonicalId::Course { course_id },
            Category::Card => CanonicalId::Card {
                course_id,
                lesson_id,
                index,
            },
            Category::Hack => CanonicalId::Hack {
                course_id,
                lesson_id,
                index,
            },
        }
    }

    /// Parse a string that already follows the canonical grammar.
    ///
    /// The input is normalized first, so `"CARD:STEP:CourseA:L1:idx3"` parses.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        let segments: Vec<&str> = normalized.split(NAMESPACE_SEP).collect();
        match segments.as_slice() {
            ["course", course_id] if is_well_formed_token(course_id) => Some(CanonicalId::Course {
                course_id: course_id.to_string(),
            }),
            [prefix, STEP_NAMESPACE, course_id, lesson_id, index] => {
                let category = match *prefix {
                    "card" => Category::Card,
                    "hack" => Category::Hack,
                    _ => return None,
                };
                if !is_well_formed_token(course_id) || !is_well_formed_token(lesson_id) {
                    return None;
                }
                let index = parse_index(index)?;
                Some(CanonicalId::step(category, course_id, lesson_id, index))
            }
            _ => None,
        }
    }

    /// True when `raw` is exactly the canonical spelling of some id.
    pub fn is_canonical(raw: &str) -> bool {
        Self::parse(raw).is_some_and(|id| id.to_string() == raw)
    }

    pub fn category(&self) -> Category {
        match self {
            CanonicalId::Course { .. } => Category::Course,
            CanonicalId::Card { .. } => Category::Card,
            CanonicalId::Hack { .. } => Category::Hack,
        }
    }

    pub fn course_id(&self) -> &str {
        match self {
            CanonicalId::Course { course_id }
            | CanonicalId::Card { course_id, .. }
            | CanonicalId::Hack { course_id, .. } => course_id,
        }
    }

    pub fn lesson_id(&self) -> Option<&str> {
        match self {
            CanonicalId::Course { .. } => None,
            CanonicalId::Card { lesson_id, .. } | CanonicalId::Hack { lesson_id, .. } => {
                Some(lesson_id)
            }
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            CanonicalId::Course { .. } => None,
            CanonicalId::Card { index, .. } | CanonicalId::Hack { index, .. } => Some(*index),
        }
    }

    /// Key under which legacy and modern spellings of the same item compare
    /// equal. Cards drop their category prefix so `step:` and `card:` ids meet.
    pub fn comparison_key(&self) -> String {
        match self {
            CanonicalId::Card {
                course_id,
                lesson_id,
                index,
            } => format!("{STEP_NAMESPACE}:{course_id}:{lesson_id}:{INDEX_PREFIX}{index}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalId::Course { course_id } => write!(f, "course:{course_id}"),
            CanonicalId::Card {
                course_id,
                lesson_id,
                index,
            } => write!(f, "card:{STEP_NAMESPACE}:{course_id}:{lesson_id}:{INDEX_PREFIX}{index}"),
            CanonicalId::Hack {
                course_id,
                lesson_id,
                index,
            } => write!(f, "hack:{STEP_NAMESPACE}:{course_id}:{lesson_id}:{INDEX_PREFIX}{index}"),
        }
    }
}

fn parse_index(token: &str) -> Option<usize> {
    let digits = token.strip_prefix(INDEX_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Shapes a raw reference can take, one variant per identifier generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReference {
    /// Already canonical.
    Canonical(CanonicalId),
    /// Positional legacy id: `step:c:l:idxN`, `card:c:l:idxN`, `hack:c:l:idxN`.
    Indexed {
        category: Option<Category>,
        course_id: String,
        lesson_id: String,
        index: usize,
    },
    /// Colon-delimited legacy id: `course:lesson[:token]`.
    Colon {
        category: Option<Category>,
        course_id: String,
        lesson_id: String,
        token: Option<String>,
    },
    /// Dot-delimited legacy id: `course.lesson.token`.
    Dotted {
        category: Option<Category>,
        course_id: String,
        lesson_id: String,
        token: String,
    },
    /// A lone item token with no context.
    Bare {
        category: Option<Category>,
        token: String,
    },
    Empty,
}

impl ParsedReference {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return ParsedReference::Empty;
        }
        if let Some(id) = CanonicalId::parse(&normalized) {
            return ParsedReference::Canonical(id);
        }

        let mut segments: Vec<&str> = normalized.split(NAMESPACE_SEP).collect();
        let mut category = None;
        if segments.len() > 1 {
            if let Some(found) = Category::from_str(segments[0]) {
                category = Some(found);
                segments.remove(0);
            }
        }
        if segments.len() > 1 && segments[0] == STEP_NAMESPACE {
            segments.remove(0);
        }

        match segments.as_slice() {
            [course_id, lesson_id, last]
                if is_well_formed_token(course_id) && is_well_formed_token(lesson_id) =>
            {
                match parse_index(last) {
                    Some(index) => ParsedReference::Indexed {
                        category,
                        course_id: course_id.to_string(),
                        lesson_id: lesson_id.to_string(),
                        index,
                    },
                    None => ParsedReference::Colon {
                        category,
                        course_id: course_id.to_string(),
                        lesson_id: lesson_id.to_string(),
                        token: Some(last.to_string()),
                    },
                }
            }
            [course_id, lesson_id, rest @ ..] if !course_id.is_empty() && !lesson_id.is_empty() => {
                let token = if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(":"))
                };
                ParsedReference::Colon {
                    category,
                    course_id: course_id.to_string(),
                    lesson_id: lesson_id.to_string(),
                    token,
                }
            }
            [single] => Self::parse_dotted(category, single),
            _ => ParsedReference::Bare {
                category,
                token: segments.join(":"),
            },
        }
    }

    fn parse_dotted(category: Option<Category>, segment: &str) -> Self {
        let parts: Vec<&str> = segment.split(PATH_SEP).collect();
        match parts.as_slice() {
            [course_id, lesson_id, rest @ ..] if !rest.is_empty() => ParsedReference::Dotted {
                category,
                course_id: course_id.to_string(),
                lesson_id: lesson_id.to_string(),
                token: rest.join("."),
            },
            [course_id, lesson_id] => ParsedReference::Colon {
                category,
                course_id: course_id.to_string(),
                lesson_id: lesson_id.to_string(),
                token: None,
            },
            _ => ParsedReference::Bare {
                category,
                token: segment.to_string(),
            },
        }
    }

    /// Category carried by the reference itself, if any.
    pub fn category(&self) -> Option<Category> {
        match self {
            ParsedReference::Canonical(id) => Some(id.category()),
            ParsedReference::Indexed { category, .. }
            | ParsedReference::Colon { category, .. }
            | ParsedReference::Dotted { category, .. }
            | ParsedReference::Bare { category, .. } => *category,
            ParsedReference::Empty => None,
        }
    }

    /// Canonical id reachable without consulting lesson content.
    ///
    /// `fallback` is used for positional ids whose prefix names no category.
    pub fn direct_id(&self, fallback: Category) -> Option<CanonicalId> {
        match self {
            ParsedReference::Canonical(id) => Some(id.clone()),
            ParsedReference::Indexed {
                category,
                course_id,
                lesson_id,
                index,
            } => {
                let category = category.unwrap_or(fallback);
                if category == Category::Course {
                    return None;
                }
                Some(CanonicalId::step(category, course_id, lesson_id, *index))
            }
            _ => None,
        }
    }

    pub fn course_id(&self) -> Option<&str> {
        match self {
            ParsedReference::Canonical(id) => Some(id.course_id()),
            ParsedReference::Indexed { course_id, .. }
            | ParsedReference::Colon { course_id, .. }
            | ParsedReference::Dotted { course_id, .. } => Some(course_id),
            ParsedReference::Bare { .. } | ParsedReference::Empty => None,
        }
    }

    pub fn lesson_id(&self) -> Option<&str> {
        match self {
            ParsedReference::Canonical(id) => id.lesson_id(),
            ParsedReference::Indexed { lesson_id, .. }
            | ParsedReference::Colon { lesson_id, .. }
            | ParsedReference::Dotted { lesson_id, .. } => Some(lesson_id),
            ParsedReference::Bare { .. } | ParsedReference::Empty => None,
        }
    }

    /// Trailing item token (the legacy per-item identifier).
    pub fn token(&self) -> Option<&str> {
        match self {
            ParsedReference::Colon { token, .. } => token.as_deref(),
            ParsedReference::Dotted { token, .. } | ParsedReference::Bare { token, .. } => {
                Some(token)
            }
            _ => None,
        }
    }
}

/// Category-insensitive comparison key for any stored or raw id.
///
/// Legacy `step:`/`card:` spellings of a card share the key of its canonical
/// id; anything that is not positional falls back to its normalized form.
pub fn comparison_key(id: &str) -> String {
    let parsed = ParsedReference::parse(id);
    match parsed.direct_id(Category::Card) {
        Some(canonical) => canonical.comparison_key(),
        None => normalize(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_forms() {
        assert_eq!(
            CanonicalId::parse("course:CourseA"),
            Some(CanonicalId::course("coursea"))
        );
        let card = CanonicalId::parse("card:step:coursea:lesson1:idx3").unwrap();
        assert_eq!(card.category(), Category::Card);
        assert_eq!(card.course_id(), "coursea");
        assert_eq!(card.lesson_id(), Some("lesson1"));
        assert_eq!(card.index(), Some(3));

        let hack = CanonicalId::parse("HACK:STEP:c:l:idx0").unwrap();
        assert_eq!(hack.to_string(), "hack:step:c:l:idx0");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(CanonicalId::parse("card:step:coursea:lesson1").is_none());
        assert!(CanonicalId::parse("card:step:coursea:lesson1:idx").is_none());
        assert!(CanonicalId::parse("card:step:coursea:lesson1:idxx1").is_none());
        assert!(CanonicalId::parse("tip:step:c:l:idx1").is_none());
        assert!(CanonicalId::parse("course:").is_none());
    }

    #[test]
    fn test_is_canonical_requires_exact_spelling() {
        assert!(CanonicalId::is_canonical("card:step:c:l:idx3"));
        assert!(!CanonicalId::is_canonical("Card:Step:c:l:idx3"));
        assert!(!CanonicalId::is_canonical("card:step:c:l:idx03"));
    }

    #[test]
    fn test_category_from_id() {
        assert_eq!(Category::from_id("course:a"), Category::Course);
        assert_eq!(Category::from_id("hack:step:a:b:idx1"), Category::Hack);
        assert_eq!(Category::from_id("lifehack:a:b:idx1"), Category::Hack);
        assert_eq!(Category::from_id("step:a:b:idx1"), Category::Card);
        assert_eq!(Category::from_id("coursea.lesson1.greeting"), Category::Card);
    }

    #[test]
    fn test_legacy_indexed_shapes() {
        let parsed = ParsedReference::parse("step:CourseA:lesson1:idx3");
        assert_eq!(
            parsed,
            ParsedReference::Indexed {
                category: None,
                course_id: "coursea".to_string(),
                lesson_id: "lesson1".to_string(),
                index: 3,
            }
        );
        assert_eq!(
            parsed.direct_id(Category::Card).unwrap().to_string(),
            "card:step:coursea:lesson1:idx3"
        );

        let hack = ParsedReference::parse("hack:c:l:idx2");
        assert_eq!(hack.category(), Some(Category::Hack));
        assert_eq!(
            hack.direct_id(Category::Card).unwrap().to_string(),
            "hack:step:c:l:idx2"
        );
    }

    #[test]
    fn test_legacy_colon_and_dotted_shapes() {
        assert_eq!(
            ParsedReference::parse("coursea:lesson1:greeting"),
            ParsedReference::Colon {
                category: None,
                course_id: "coursea".to_string(),
                lesson_id: "lesson1".to_string(),
                token: Some("greeting".to_string()),
            }
        );
        assert_eq!(
            ParsedReference::parse("coursea.lesson1.greeting"),
            ParsedReference::Dotted {
                category: None,
                course_id: "coursea".to_string(),
                lesson_id: "lesson1".to_string(),
                token: "greeting".to_string(),
            }
        );
        assert_eq!(
            ParsedReference::parse("card:coursea.lesson1.greeting").category(),
            Some(Category::Card)
        );
        assert_eq!(
            ParsedReference::parse("greeting"),
            ParsedReference::Bare {
                category: None,
                token: "greeting".to_string(),
            }
        );
        assert_eq!(ParsedReference::parse("  "), ParsedReference::Empty);
    }

    #[test]
    fn test_comparison_key_merges_card_spellings() {
        let canonical = comparison_key("card:step:coursea:lesson1:idx3");
        assert_eq!(comparison_key("step:coursea:lesson1:idx3"), canonical);
        assert_eq!(comparison_key("card:CourseA:lesson1:idx3"), canonical);
        assert_ne!(comparison_key("hack:step:coursea:lesson1:idx3"), canonical);
    }

    #[test]
    fn test_comparison_key_falls_back_to_normalized() {
        assert_eq!(
            comparison_key("CourseA.Lesson1.Greeting"),
            "coursea.lesson1.greeting"
        );
    }
}
