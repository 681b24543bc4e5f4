//! Author-string normalization applied to every scraper result.
//!
//! Upstream sources disagree about initials and conjunctions; the store
//! wants one shape: `"A. B. Smith, C. Jones"`.

use once_cell::sync::Lazy;
use regex::Regex;

/// `A.Smith` → `A. Smith`, `A.B.` → `A. B.`
static GLUED_INITIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z])\.([A-Za-z])").unwrap());

/// `A Smith` → `A. Smith` (a lone capital is an initial missing its period).
static BARE_INITIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]) ([A-Z][a-z])").unwrap());

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Normalize a comma-separated author list.
pub fn clean_author_list(authors: &str) -> String {
    let mut text = authors.trim().to_string();

    // Conjunctions become plain separators.
    for sep in [", and ", ", & ", " and ", " & "] {
        text = text.replace(sep, ", ");
    }
    text = text.replace(';', ",");

    // Glued initials: loop because runs like "A.B.C." need repeated passes.
    loop {
        let next = GLUED_INITIAL.replace_all(&text, "${1}. ${2}").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = BARE_INITIAL.replace_all(&text, "${1}. ${2}").into_owned();
    text = MULTI_SPACE.replace_all(&text, " ").into_owned();

    // Tidy separator spacing.
    let parts: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glued_initial_spaced() {
        assert_eq!(clean_author_list("A.Smith"), "A. Smith");
    }

    #[test]
    fn double_initials_spaced() {
        assert_eq!(clean_author_list("A.B. Smith"), "A. B. Smith");
    }

    #[test]
    fn triple_initials_spaced() {
        assert_eq!(clean_author_list("J.R.R. Tolkien"), "J. R. R. Tolkien");
    }

    #[test]
    fn and_becomes_comma() {
        assert_eq!(
            clean_author_list("Alice Johnson and Bob Quux"),
            "Alice Johnson, Bob Quux"
        );
        assert_eq!(
            clean_author_list("Alice Johnson, and Bob Quux"),
            "Alice Johnson, Bob Quux"
        );
        assert_eq!(
            clean_author_list("Alice Johnson, & Bob Quux"),
            "Alice Johnson, Bob Quux"
        );
    }

    #[test]
    fn bare_initial_gets_period() {
        assert_eq!(clean_author_list("A Smith"), "A. Smith");
    }

    #[test]
    fn semicolons_become_commas() {
        assert_eq!(
            clean_author_list("Smith, A.; Jones, B."),
            "Smith, A., Jones, B."
        );
    }

    #[test]
    fn already_clean_is_unchanged() {
        assert_eq!(
            clean_author_list("A. B. Smith, C. Jones"),
            "A. B. Smith, C. Jones"
        );
    }

    #[test]
    fn whitespace_collapsed() {
        assert_eq!(
            clean_author_list("  Alice Johnson ,  Bob Quux "),
            "Alice Johnson, Bob Quux"
        );
    }
}
