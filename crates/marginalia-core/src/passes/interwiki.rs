//! Pass 2: interwiki shorthand. `[text](!W)` and friends become real
//! URLs before the scrape phase sees them.

use crate::ast::{Block, Inline, inlines_to_text, walk_inlines_mut};

/// Shorthand prefix → URL prefix. The article name is the link tooltip
/// when present, otherwise the visible text.
const INTERWIKI: &[(&str, &str)] = &[
    ("!W", "https://en.wikipedia.org/wiki/"),
    ("!Wikipedia", "https://en.wikipedia.org/wiki/"),
    ("!WP", "https://en.wikipedia.org/wiki/"),
    ("!Wiktionary", "https://en.wiktionary.org/wiki/"),
];

pub fn run(blocks: &mut [Block]) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(_, children, (target, tooltip)) = inline else {
            return;
        };
        let Some(prefix) = INTERWIKI
            .iter()
            .find(|(shorthand, _)| target == shorthand)
            .map(|(_, prefix)| *prefix)
        else {
            return;
        };
        let article = if tooltip.is_empty() {
            inlines_to_text(children)
        } else {
            tooltip.clone()
        };
        *target = format!("{prefix}{}", article_segment(&article));
        tooltip.clear();
    });
}

/// Wiki article names use underscores; everything else is percent-encoded.
fn article_segment(article: &str) -> String {
    urlencoding::encode(&article.trim().replace(' ', "_"))
        .into_owned()
        // MediaWiki accepts these unescaped and the URLs read better.
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2C", ",")
}
