use super::{CanonicalId, Category, ParsedReference};

/// Display text a caller knows about the item it wants to favorite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContentHint {
    pub primary: String,
    pub secondary: String,
    pub meta: String,
}

impl ContentHint {
    pub fn new(primary: &str, secondary: &str) -> Self {
        Self {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            meta: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.trim().is_empty() && self.secondary.trim().is_empty()
    }
}

/// A reference to something the caller wants to favorite, in whatever
/// spelling the caller has, plus optional hints for resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteRef {
    pub raw: String,
    pub category: Option<Category>,
    pub course_hint: Option<String>,
    pub lesson_hint: Option<String>,
    pub position_hint: Option<usize>,
    pub content: Option<ContentHint>,
}

impl FavoriteRef {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            ..Default::default()
        }
    }

    /// Reference to a whole course
    pub fn course(course_id: &str) -> Self {
        Self {
            raw: format!("course:{course_id}"),
            category: Some(Category::Course),
            course_hint: Some(course_id.to_string()),
            ..Default::default()
        }
    }

    /// Reference to a vocabulary/phrase card within a lesson
    pub fn card(course_id: &str, lesson_id: &str) -> Self {
        Self {
            category: Some(Category::Card),
            course_hint: Some(course_id.to_string()),
            lesson_hint: Some(lesson_id.to_string()),
            ..Default::default()
        }
    }

    /// Reference to a tip by its visible body
    pub fn hack(course_id: &str, lesson_id: &str, body: &str) -> Self {
        Self {
            category: Some(Category::Hack),
            course_hint: Some(course_id.to_string()),
            lesson_hint: Some(lesson_id.to_string()),
            content: Some(ContentHint::new("", body)),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_context(mut self, course_id: &str, lesson_id: &str) -> Self {
        self.course_hint = Some(course_id.to_string());
        self.lesson_hint = Some(lesson_id.to_string());
        self
    }

    pub fn with_course(mut self, course_id: &str) -> Self {
        self.course_hint = Some(course_id.to_string());
        self
    }

    pub fn at_position(mut self, index: usize) -> Self {
        self.position_hint = Some(index);
        self
    }

    pub fn with_content(mut self, primary: &str, secondary: &str) -> Self {
        let meta = self.content.take().map(|c| c.meta).unwrap_or_default();
        self.content = Some(ContentHint {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            meta,
        });
        self
    }

    pub fn with_meta(mut self, meta: &str) -> Self {
        self.content.get_or_insert_with(ContentHint::default).meta = meta.to_string();
        self
    }

    /// Explicit category, else the one the raw spelling carries, else card.
    pub fn effective_category(&self) -> Category {
        self.category
            .or_else(|| ParsedReference::parse(&self.raw).category())
            .unwrap_or(Category::Card)
    }
}

impl From<&str> for FavoriteRef {
    fn from(raw: &str) -> Self {
        FavoriteRef::new(raw)
    }
}

impl From<String> for FavoriteRef {
    fn from(raw: String) -> Self {
        FavoriteRef::new(&raw)
    }
}

impl From<&String> for FavoriteRef {
    fn from(raw: &String) -> Self {
        FavoriteRef::new(raw)
    }
}

impl From<&CanonicalId> for FavoriteRef {
    fn from(id: &CanonicalId) -> Self {
        FavoriteRef::new(&id.to_string()).with_category(id.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_category() {
        assert_eq!(FavoriteRef::new("hack:c:l:idx1").effective_category(), Category::Hack);
        assert_eq!(FavoriteRef::new("course:c").effective_category(), Category::Course);
        assert_eq!(FavoriteRef::new("c.l.token").effective_category(), Category::Card);
        assert_eq!(
            FavoriteRef::new("c.l.token").with_category(Category::Hack).effective_category(),
            Category::Hack
        );
    }

    #[test]
    fn test_builders() {
        let r = FavoriteRef::card("CourseA", "lesson1").at_position(3).with_content("hello", "");
        assert_eq!(r.course_hint.as_deref(), Some("CourseA"));
        assert_eq!(r.position_hint, Some(3));
        assert_eq!(r.content.unwrap().primary, "hello");

        let hack = FavoriteRef::hack("c", "l", "Remember tones!").with_meta("x");
        let hint = hack.content.unwrap();
        assert_eq!(hint.secondary, "Remember tones!");
        assert_eq!(hint.meta, "x");
    }
}
