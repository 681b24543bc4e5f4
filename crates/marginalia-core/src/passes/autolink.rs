//! Pass 1: auto-linker. Known phrases in plain text become links, first
//! occurrence per document.
//!
//! Runs before annotation creation so the new links get scraped, and
//! before typography so the zero-width spaces it inserts cannot split a
//! phrase match.

use std::collections::HashSet;

use crate::ast::{Attr, Block, Inline};

/// Ordered phrase → URL table. Longest phrases are tried first so
/// "peer review" beats "peer".
#[derive(Debug, Default, Clone)]
pub struct PhraseTable {
    entries: Vec<(String, String)>,
}

impl PhraseTable {
    pub fn new(mut entries: Vec<(String, String)>) -> Self {
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Link the first occurrence of each known phrase. Headers, code, and
/// existing links are never touched.
pub fn run(blocks: &mut [Block], phrases: &PhraseTable) {
    if phrases.is_empty() {
        return;
    }
    let mut linked: HashSet<String> = HashSet::new();
    for block in blocks {
        link_block(block, phrases, &mut linked);
    }
}

fn link_block(block: &mut Block, phrases: &PhraseTable, linked: &mut HashSet<String>) {
    match block {
        Block::Para(inlines) | Block::Plain(inlines) => {
            let taken = std::mem::take(inlines);
            *inlines = link_inlines(taken, phrases, linked);
        }
        Block::BlockQuote(children) | Block::Div(_, children) => {
            for child in children {
                link_block(child, phrases, linked);
            }
        }
        Block::BulletList(items) => {
            for item in items {
                for child in item {
                    link_block(child, phrases, linked);
                }
            }
        }
        // Headers self-link later; auto-links inside them would nest.
        Block::Header(..) | Block::HorizontalRule | Block::CodeBlock(..) | Block::RawBlock(_) => {}
    }
}

fn link_inlines(
    inlines: Vec<Inline>,
    phrases: &PhraseTable,
    linked: &mut HashSet<String>,
) -> Vec<Inline> {
    let mut out = Vec::with_capacity(inlines.len());
    for inline in inlines {
        match inline {
            Inline::Str(text) => out.extend(link_str(text, phrases, linked)),
            Inline::Emph(children) => {
                out.push(Inline::Emph(link_inlines(children, phrases, linked)))
            }
            Inline::Strong(children) => {
                out.push(Inline::Strong(link_inlines(children, phrases, linked)))
            }
            Inline::Span(attr, children) => {
                out.push(Inline::Span(attr, link_inlines(children, phrases, linked)))
            }
            // No links inside links, images, or code.
            other => out.push(other),
        }
    }
    out
}

fn link_str(text: String, phrases: &PhraseTable, linked: &mut HashSet<String>) -> Vec<Inline> {
    for (phrase, url) in &phrases.entries {
        if linked.contains(phrase) {
            continue;
        }
        if let Some(pos) = find_word_bounded(&text, phrase) {
            linked.insert(phrase.clone());
            let before = text[..pos].to_string();
            let matched = text[pos..pos + phrase.len()].to_string();
            let after = text[pos + phrase.len()..].to_string();

            // Both sides may hold further phrases.
            let mut out = Vec::new();
            if !before.is_empty() {
                out.extend(link_str(before, phrases, linked));
            }
            out.push(Inline::Link(
                Attr::empty(),
                vec![Inline::Str(matched)],
                (url.clone(), String::new()),
            ));
            if !after.is_empty() {
                out.extend(link_str(after, phrases, linked));
            }
            return out;
        }
    }
    vec![Inline::Str(text)]
}

/// Case-sensitive find with word boundaries on both sides.
fn find_word_bounded(text: &str, phrase: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(rel) = text[start..].find(phrase) {
        let pos = start + rel;
        let before_ok = pos == 0
            || text[..pos]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = text[pos + phrase.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(pos);
        }
        start = pos + phrase.len();
    }
    None
}
