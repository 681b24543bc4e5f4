//! Annotation fragment writer.
//!
//! Each popup-worthy annotation becomes a standalone HTML file under
//! `metadata/annotation/`, served as the popup's content source. Writes
//! are atomic and skipped when the on-disk bytes already match.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::BuildError;
use crate::ast::{Attr, Block, Inline};
use crate::html::{blocks_to_html, parse_fragment};
use crate::ident::generate_id;
use crate::metadata::{MetadataItem, MetadataStore, strip_fragment};
use crate::passes::{annotate, linkclass, typography};
use crate::scrape::WikipediaMode;

/// Filesystem limit for the fragment filename, in bytes.
pub const MAX_FRAGMENT_FILENAME: usize = 274;

/// URL-encoded filename for an annotation path, truncated to the limit.
/// Truncation is logged — two long URLs could collide after it.
pub fn fragment_filename(path: &str) -> String {
    let encoded = urlencoding::encode(path).into_owned();
    let full = format!("{encoded}.html");
    if full.len() <= MAX_FRAGMENT_FILENAME {
        return full;
    }
    let keep = MAX_FRAGMENT_FILENAME - ".html".len();
    let mut stem = encoded;
    while stem.len() > keep {
        stem.pop();
    }
    let truncated = format!("{stem}.html");
    tracing::warn!(path, truncated, "fragment filename truncated");
    truncated
}

/// Render one annotation to its fragment blocks.
///
/// The shape is a citation paragraph (the annotated link, author/date
/// spans, optional DOI) followed by a blockquote of the abstract with
/// its relative anchors rebased onto the annotation's own page. The
/// abstract gets the typography transform, and the fragment runs the
/// marker and archive passes so nested links are decorated too.
pub fn render_fragment(
    path: &str,
    item: &MetadataItem,
    meta: &MetadataStore,
    archived: &HashMap<String, String>,
    wikipedia_mode: WikipediaMode,
) -> Vec<Block> {
    let mut link_attr = Attr::empty();
    link_attr.add_class(annotate::DOC_METADATA_CLASS);
    link_attr.id = generate_id(path, &item.author, &item.date);

    let mut citation = vec![Inline::Link(
        link_attr,
        vec![Inline::Str(format!("\u{201C}{}\u{201D}", item.title))],
        (path.to_string(), String::new()),
    )];
    if !item.author.is_empty() {
        let mut author_attr = Attr::empty();
        author_attr.add_class("author");
        citation.push(Inline::Str(",".into()));
        citation.push(Inline::Space);
        citation.push(Inline::Span(
            author_attr,
            vec![Inline::Str(item.author.clone())],
        ));
    }
    if !item.date.is_empty() {
        let mut date_attr = Attr::empty();
        date_attr.add_class("date");
        citation.push(Inline::Space);
        citation.push(Inline::Span(
            date_attr,
            vec![Inline::Str(format!("({})", item.date))],
        ));
    }
    if !item.doi.is_empty() {
        let mut doi_attr = Attr::empty();
        doi_attr.add_class("doi");
        citation.push(Inline::Space);
        citation.push(Inline::Span(doi_attr, vec![Inline::Str(item.doi.clone())]));
    }

    let mut abstract_blocks = parse_fragment(&item.abstract_html);
    rebase_anchors(&mut abstract_blocks, strip_fragment(path));
    typography::run(&mut abstract_blocks);

    let mut blocks = vec![
        Block::Para(citation),
        Block::BlockQuote(abstract_blocks),
    ];
    annotate::mark_annotated_links(&mut blocks, meta, wikipedia_mode);
    linkclass::rewrite_archived_links(&mut blocks, archived);
    blocks
}

/// Relative `#…` anchors inside an abstract point at sections of the
/// annotated page, not of whatever page hosts the popup.
fn rebase_anchors(blocks: &mut [Block], page: &str) {
    crate::ast::walk_inlines_mut(blocks, &mut |inline| {
        if let Inline::Link(_, _, (target, _)) = inline {
            if target.starts_with('#') {
                *target = format!("{page}{target}");
            }
        }
    });
}

/// Write one annotation fragment; returns the path if the item merits a
/// fragment at all (abstract at or above the popup threshold).
pub fn write_fragment(
    out_dir: &Path,
    path: &str,
    item: &MetadataItem,
    meta: &MetadataStore,
    archived: &HashMap<String, String>,
    wikipedia_mode: WikipediaMode,
) -> Result<Option<PathBuf>, BuildError> {
    if !item.has_usable_abstract() {
        return Ok(None);
    }
    let blocks = render_fragment(path, item, meta, archived, wikipedia_mode);
    let html = blocks_to_html(&blocks);
    let dest = out_dir
        .join("metadata/annotation")
        .join(fragment_filename(path));
    write_if_changed(&dest, html.as_bytes())?;
    Ok(Some(dest))
}

/// Atomic write-if-changed: temp file in the destination directory,
/// rename over the target, no-op when the bytes already match.
pub fn write_if_changed(dest: &Path, content: &[u8]) -> Result<bool, BuildError> {
    if let Ok(existing) = std::fs::read(dest) {
        if existing == content {
            return Ok(false);
        }
    }
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(content)?;
    tmp.persist(dest).map_err(|e| BuildError::Io(e.error))?;
    Ok(true)
}
