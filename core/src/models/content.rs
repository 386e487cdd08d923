use serde::{Deserialize, Serialize};

use super::Category;
use crate::normalize::{normalize, normalize_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Word,
    Phrase,
    Dialog,
    Tip,
    Other,
}

impl ContentKind {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "word" | "vocab" | "vocabulary" => ContentKind::Word,
            "phrase" | "sentence" => ContentKind::Phrase,
            "dialog" | "dialogue" => ContentKind::Dialog,
            "tip" | "hack" | "lifehack" => ContentKind::Tip,
            _ => ContentKind::Other,
        }
    }

    /// Favorite category items of this kind belong to, if they can be favorited.
    pub fn category(&self) -> Option<Category> {
        match self {
            ContentKind::Word | ContentKind::Phrase | ContentKind::Dialog => Some(Category::Card),
            ContentKind::Tip => Some(Category::Hack),
            ContentKind::Other => None,
        }
    }
}

/// One entry of a lesson's ordered content list.
///
/// The item's position in that list is its stable index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(default)]
    pub identifier: Option<String>,
    pub kind: ContentKind,
    pub primary_text: String,
    #[serde(default)]
    pub secondary_text: String,
}

impl ContentItem {
    pub fn new(identifier: Option<&str>, kind: ContentKind, primary: &str, secondary: &str) -> Self {
        Self {
            identifier: identifier.map(str::to_string),
            kind,
            primary_text: primary.to_string(),
            secondary_text: secondary.to_string(),
        }
    }

    /// Visible body of a tip: the secondary text, or the primary when a tip
    /// only carries one line.
    pub fn body(&self) -> &str {
        if self.secondary_text.trim().is_empty() {
            &self.primary_text
        } else {
            &self.secondary_text
        }
    }

    pub fn matches_identifier(&self, token: &str) -> bool {
        match &self.identifier {
            Some(identifier) => identifier == token || normalize(identifier) == normalize(token),
            None => false,
        }
    }

    /// Text equality against a content hint. Empty hint fields are ignored,
    /// but at least one field must be compared.
    pub fn matches_text(&self, primary: &str, secondary: &str) -> bool {
        let primary = normalize_text(primary);
        let secondary = normalize_text(secondary);
        if primary.is_empty() && secondary.is_empty() {
            return false;
        }

        // Tips in a lesson share category titles, so only the body identifies one.
        if self.kind == ContentKind::Tip {
            let body = normalize_text(self.body());
            if secondary.is_empty() {
                return primary == body;
            }
            let title = normalize_text(&self.primary_text);
            return secondary == body && (primary.is_empty() || primary == title || primary == body);
        }

        (primary.is_empty() || primary == normalize_text(&self.primary_text))
            && (secondary.is_empty() || secondary == normalize_text(&self.secondary_text))
    }
}

/// Every on-disk shape a content item has had.
///
/// Catalog files are converted through this once at load time, so lookups
/// only ever see [`ContentItem`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentItemShape {
    Current(ContentItem),
    /// Vocabulary entries from before items carried a kind.
    Vocabulary {
        #[serde(default)]
        id: Option<String>,
        word: String,
        translation: String,
    },
    /// Keyed text entries; tips were stored this way.
    Keyed {
        key: String,
        text: String,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
}

impl From<ContentItemShape> for ContentItem {
    fn from(shape: ContentItemShape) -> Self {
        match shape {
            ContentItemShape::Current(item) => item,
            ContentItemShape::Vocabulary {
                id,
                word,
                translation,
            } => ContentItem {
                identifier: id,
                kind: ContentKind::Word,
                primary_text: translation,
                secondary_text: word,
            },
            ContentItemShape::Keyed {
                key,
                text,
                kind,
                body,
            } => ContentItem {
                identifier: Some(key),
                kind: kind
                    .as_deref()
                    .map(ContentKind::from_str)
                    .unwrap_or(ContentKind::Phrase),
                primary_text: text,
                secondary_text: body.unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_categories() {
        assert_eq!(ContentKind::Word.category(), Some(Category::Card));
        assert_eq!(ContentKind::Tip.category(), Some(Category::Hack));
        assert_eq!(ContentKind::Other.category(), None);
        assert_eq!(ContentKind::from_str("Lifehack"), ContentKind::Tip);
    }

    #[test]
    fn test_identifier_match_is_normalized() {
        let item = ContentItem::new(Some("Greeting"), ContentKind::Word, "hello", "xin chào");
        assert!(item.matches_identifier("greeting"));
        assert!(!item.matches_identifier("farewell"));
        let anonymous = ContentItem::new(None, ContentKind::Word, "hello", "xin chào");
        assert!(!anonymous.matches_identifier("greeting"));
    }

    #[test]
    fn test_text_match() {
        let item = ContentItem::new(None, ContentKind::Word, "Hello", "xin chào");
        assert!(item.matches_text("hello", ""));
        assert!(item.matches_text(" HELLO ", "xin chào"));
        assert!(!item.matches_text("hello", "tạm biệt"));
        assert!(!item.matches_text("", ""));
    }

    #[test]
    fn test_tip_matches_on_body() {
        let tip = ContentItem::new(None, ContentKind::Tip, "Lifehack", "Remember tones!");
        assert!(tip.matches_text("", "Remember tones!"));
        assert!(tip.matches_text("remember tones!", ""));
        assert!(tip.matches_text("Lifehack", "Remember tones!"));
        assert_eq!(tip.body(), "Remember tones!");
    }

    #[test]
    fn test_tip_title_alone_does_not_match() {
        let first = ContentItem::new(None, ContentKind::Tip, "Lifehack", "First tip");
        assert!(!first.matches_text("Lifehack", ""));
        assert!(!first.matches_text("Lifehack", "Second tip"));
        assert!(!first.matches_text("Other title", "First tip"));
    }

    #[test]
    fn test_legacy_shapes_convert() {
        let items: Vec<ContentItemShape> = serde_json::from_str(
            r#"[
                {"kind": "word", "primaryText": "hello", "secondaryText": "xin chào"},
                {"id": "w1", "word": "cảm ơn", "translation": "thank you"},
                {"key": "t1", "text": "Tip", "kind": "tip", "body": "Remember tones!"}
            ]"#,
        )
        .unwrap();
        let items: Vec<ContentItem> = items.into_iter().map(ContentItem::from).collect();

        assert_eq!(items[0].kind, ContentKind::Word);
        assert_eq!(items[1].identifier.as_deref(), Some("w1"));
        assert_eq!(items[1].primary_text, "thank you");
        assert_eq!(items[2].kind, ContentKind::Tip);
        assert_eq!(items[2].body(), "Remember tones!");
    }
}
