//! Identifier normalization.
//!
//! Every identifier that enters the store (raw references, course and lesson
//! ids, legacy record ids) passes through [`normalize`] before it is compared
//! or persisted, so `"CourseA :: Lesson 1"` and `"coursea:lesson_1"` meet on the
//! same spelling.

/// Character used in place of internal whitespace.
pub const JOIN_CHAR: char = '_';

/// Namespace separator (`course:lesson`).
pub const NAMESPACE_SEP: char = ':';

/// Path separator used by dotted legacy references (`course.lesson.token`).
pub const PATH_SEP: char = '.';

fn is_separator(ch: char) -> bool {
    ch == NAMESPACE_SEP || ch == PATH_SEP
}

/// Normalize a raw identifier.
///
/// Case-folds, trims, joins internal whitespace runs with [`JOIN_CHAR`],
/// collapses repeated separators (`::` to `:`, `..` to `.`) and strips stray
/// separators at either end. Category prefixes (`course:`, `card:`, `hack:`,
/// `step:`) are kept as-is.
pub fn normalize(raw: &str) -> String {
    let folded = raw.trim().to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;

    for ch in folded.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }

        if is_separator(ch) {
            // Whitespace hugging a separator is dropped, never joined.
            pending_space = false;
            if out.ends_with(ch) {
                continue;
            }
            out.push(ch);
            continue;
        }

        if pending_space {
            if !out.is_empty() && !out.ends_with(is_separator) {
                out.push(JOIN_CHAR);
            }
            pending_space = false;
        }
        out.push(ch);
    }

    out.trim_matches(is_separator).to_string()
}

/// Fold display text for equality checks against lesson content.
///
/// Unlike [`normalize`] this keeps punctuation and separators: only case and
/// whitespace runs are folded.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when `token` can stand as a course or lesson segment of a canonical id.
pub fn is_well_formed_token(token: &str) -> bool {
    !token.is_empty()
        && !token.contains(NAMESPACE_SEP)
        && !token.chars().any(char::is_whitespace)
}
