//! Pass 11: header self-links and title-casing.
//!
//! Every header ends up with a non-empty ID and a single child: a link
//! to its own fragment whose text is the title-cased original children.

use crate::BuildError;
use crate::ast::{Attr, Block, Inline, inlines_to_text, walk_blocks_mut};
use crate::passes::typography::title_case_inlines;

const FORBIDDEN: &[char] = &['.', '#', ':'];

pub fn run(blocks: &mut Vec<Block>) -> Result<(), BuildError> {
    let mut failure: Option<BuildError> = None;
    walk_blocks_mut(blocks, &mut |block| {
        if failure.is_some() {
            return;
        }
        let Block::Header(_, attr, inlines) = block else {
            return;
        };
        match resolve_id(&attr.id, inlines) {
            Ok(id) => attr.id = id,
            Err(err) => {
                failure = Some(err);
                return;
            }
        }
        let plain = inlines_to_text(inlines);
        let cased = title_case_inlines(std::mem::take(inlines));
        let tooltip = format!("Link to section: \u{00A7} '{plain}'");
        *inlines = vec![Inline::Link(
            Attr::empty(),
            cased,
            (format!("#{}", attr.id), tooltip),
        )];
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// An explicit ID must already be clean; a missing one is generated from
/// the header text, filtered of forbidden characters.
fn resolve_id(existing: &str, inlines: &[Inline]) -> Result<String, BuildError> {
    if !existing.is_empty() {
        if existing.contains(FORBIDDEN) {
            return Err(BuildError::ForbiddenHeaderId {
                id: existing.to_string(),
            });
        }
        return Ok(existing.to_string());
    }
    let slug = slugify(&inlines_to_text(inlines));
    let filtered: String = slug.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    if filtered != slug {
        tracing::warn!(original = %slug, filtered = %filtered, "header id normalized");
    }
    if filtered.is_empty() {
        return Err(BuildError::EmptyHeaderId {
            original: inlines_to_text(inlines),
        });
    }
    Ok(filtered)
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
