//! Deterministic citation identifiers.
//!
//! `generate_id(url, author, date)` produces the fragment used both as the
//! `id=` of an inline citation link and as its link target. Collisions are
//! possible; the HTML validator flags them for a human, so the generator
//! stays a pure function and never deduplicates.

use once_cell::sync::Lazy;
use regex::Regex;

/// Author string that marks a self-written page.
pub const SELF_AUTHOR: &str = "Gwern Branwen";

static PAREN_AFFILIATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());
static TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)$").unwrap());

/// Generate a stable citation ID from (url, author, date).
///
/// Empty author or date, or a Wikipedia target, yields the empty ID
/// (no self-link is emitted for those). The result is lowercase ASCII,
/// hyphen-separated, with `.` stripped.
pub fn generate_id(url: &str, author: &str, date: &str) -> String {
    if author.is_empty() || date.is_empty() {
        return String::new();
    }
    if url.contains(".wikipedia.org/") {
        return String::new();
    }

    if author == SELF_AUTHOR {
        return format!("gwern-{}", self_page_slug(url));
    }

    let surname = first_author_surname(author);
    if surname.is_empty() {
        return String::new();
    }

    let mut year: String = date.chars().take(4).collect();
    if year.is_empty() {
        year = "2020".into();
    }

    let author_count = author.split(", ").filter(|a| !a.trim().is_empty()).count();
    let base = if author_count >= 3 {
        format!("{surname}-et-al-{year}")
    } else if author_count == 2 {
        let second = nth_author_surname(author, 1);
        format!("{surname}-{second}-{year}")
    } else {
        format!("{surname}-{year}")
    };

    let id = match url_disambiguation_suffix(url) {
        Some(suffix) => format!("{base}-{suffix}"),
        None => base,
    };
    sanitize(&id)
}

/// Slug for a self-written page: the URL lowercased with the scheme/host
/// prefix removed and `.`, `--`, `/`, `#` collapsed away.
fn self_page_slug(url: &str) -> String {
    let mut path = url;
    if let Some(rest) = path.strip_prefix("https://").or_else(|| path.strip_prefix("http://")) {
        path = rest.split_once('/').map(|(_, p)| p).unwrap_or("");
    }
    let path = path.trim_start_matches('/');
    let mut slug = String::with_capacity(path.len());
    for c in path.to_lowercase().chars() {
        match c {
            '.' => {}
            '/' | '#' => slug.push('-'),
            other => slug.push(other),
        }
    }
    sanitize(&slug)
}

/// Alphabetic tail of the first comma-separated author, affiliations in
/// parentheses stripped.
fn first_author_surname(author: &str) -> String {
    nth_author_surname(author, 0)
}

fn nth_author_surname(author: &str, n: usize) -> String {
    let name = match author.split(", ").nth(n) {
        Some(name) => name,
        None => return String::new(),
    };
    let name = PAREN_AFFILIATION.replace_all(name, "");
    let last_word = name.split_whitespace().last().unwrap_or("");
    last_word
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

/// A trailing numeric suffix on the URL basename (`…-2.pdf`) disambiguates
/// same-author-same-year entries. `-1` is dropped.
fn url_disambiguation_suffix(url: &str) -> Option<String> {
    let basename = url.rsplit('/').next().unwrap_or(url);
    let basename = basename.split(['#', '?']).next().unwrap_or(basename);
    // Strip a real (alphabetic) file extension; "1706.03762" keeps its dot.
    let stem = match basename.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphabetic()) => {
            stem
        }
        _ => basename,
    };
    let captures = TRAILING_NUMBER.captures(stem)?;
    let suffix = captures.get(1)?.as_str();
    if suffix == "1" {
        None
    } else {
        Some(suffix.to_string())
    }
}

/// Lowercase, drop periods, keep only `[a-z0-9-]`, trim stray hyphens.
fn sanitize(id: &str) -> String {
    let filtered: String = id
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    let mut collapsed = String::with_capacity(filtered.len());
    for c in filtered.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('-').to_string()
}
