//! Document rewrite passes.
//!
//! Order is load-bearing and runs in two phases:
//!
//! **Early (pure, before scraping)** — auto-linker, interwiki, footnote
//! check. These run first because they add and resolve links that the
//! scrape phase must see.
//!
//! **Main (pure, after the I/O phase)** — annotation marker, inflation,
//! archive rewrite, local-link classifier, page-link walker, typography,
//! header self-links, image invertibility, loose-block normalization.
//! Every document observes the same metadata snapshot; all network and
//! shell work happened in the I/O phase and is consulted here through
//! plain maps.

pub mod annotate;
pub mod autolink;
pub mod headers;
pub mod images;
pub mod inflation;
pub mod interwiki;
pub mod linkclass;
pub mod typography;

use std::collections::{HashMap, HashSet};

use crate::BuildError;
use crate::ast::{Document, normalize_loose_blocks};
use crate::metadata::MetadataStore;
use crate::scrape::WikipediaMode;

/// Corpus-level link structure consulted by the page-link walker.
#[derive(Debug, Default, Clone)]
pub struct PageIndex {
    /// Paths that at least one other document links to.
    pub backlink_targets: HashSet<String>,
    /// Paths with a computed similar-links listing.
    pub similar_targets: HashSet<String>,
    /// Tag lists per local path.
    pub tag_map: HashMap<String, Vec<String>>,
}

/// Everything the pure rewrite phase is allowed to see.
pub struct RewriteContext<'a> {
    pub meta: &'a MetadataStore,
    /// Fragmentless external URL → local snapshot path.
    pub archived: &'a HashMap<String, String>,
    /// Image source → invertibility decision.
    pub invertible: &'a HashMap<String, bool>,
    pub pages: &'a PageIndex,
    pub wikipedia_mode: WikipediaMode,
}

/// Run the early passes (1–3). Happens before annotation creation so
/// newly-introduced links are scraped and before typography so phrase
/// matches see unbroken text.
pub fn early_passes(
    doc: &mut Document,
    phrases: &autolink::PhraseTable,
) -> Result<(), BuildError> {
    autolink::run(&mut doc.blocks, phrases);
    interwiki::run(&mut doc.blocks);
    annotate::check_footnotes(&doc.blocks)?;
    Ok(())
}

/// Run the main passes (5–13) in their fixed order.
pub fn rewrite_document(doc: &mut Document, ctx: &RewriteContext<'_>) -> Result<(), BuildError> {
    annotate::mark_annotated_links(&mut doc.blocks, ctx.meta, ctx.wikipedia_mode);
    inflation::run(&mut doc.blocks);
    linkclass::rewrite_archived_links(&mut doc.blocks, ctx.archived);
    linkclass::classify_local_links(&mut doc.blocks);
    linkclass::walk_page_links(&mut doc.blocks, ctx.pages);
    typography::run(&mut doc.blocks);
    headers::run(&mut doc.blocks)?;
    images::run(&mut doc.blocks, ctx.invertible);
    normalize_loose_blocks(&mut doc.blocks);
    Ok(())
}
