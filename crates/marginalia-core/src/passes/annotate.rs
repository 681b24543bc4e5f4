//! Annotation passes: link-target collection, the has-annotation marker,
//! and the malformed-footnote check.

use std::collections::BTreeSet;

use crate::BuildError;
use crate::ast::{Block, Inline, inlines_to_text, walk_inlines, walk_inlines_mut};
use crate::ident::generate_id;
use crate::metadata::MetadataStore;
use crate::scrape::WikipediaMode;

/// Class marking a link whose target has a popup-worthy annotation.
pub const DOC_METADATA_CLASS: &str = "docMetadata";

/// Attribute authors set to keep a link unannotated.
pub const OPT_OUT_ATTR: &str = "no-annotation";

/// Every link target in the document, in source order, deduplicated.
/// The scrape phase feeds these to the dispatcher.
pub fn collect_link_targets(blocks: &[Block]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut targets = Vec::new();
    walk_inlines(blocks, &mut |inline| {
        if let Inline::Link(_, _, (target, _)) = inline {
            if !target.is_empty()
                && !target.starts_with('#')
                && !target.starts_with('!')
                && seen.insert(target.clone())
            {
                targets.push(target.clone());
            }
        }
    });
    targets
}

/// Pass 5: mark links whose targets carry a usable annotation.
///
/// The link gains the `docMetadata` class and a freshly generated ID.
/// Wikipedia links are marked unconditionally in client mode — the popup
/// script supplies their content. Targets whose abstract is shorter than
/// the popup threshold stay unmarked; the tooltip already covers them.
pub fn mark_annotated_links(
    blocks: &mut [Block],
    meta: &MetadataStore,
    wikipedia_mode: WikipediaMode,
) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(attr, _, (target, _)) = inline else {
            return;
        };
        if attr.get_kv(OPT_OUT_ATTR).is_some() {
            return;
        }
        let is_wikipedia = target.contains(".wikipedia.org/wiki/");
        if is_wikipedia && wikipedia_mode == WikipediaMode::Client {
            attr.add_class(DOC_METADATA_CLASS);
            return;
        }
        let Some(item) = meta.lookup(target) else {
            return;
        };
        if item.is_negative() || !item.has_usable_abstract() {
            return;
        }
        attr.add_class(DOC_METADATA_CLASS);
        if attr.id.is_empty() {
            attr.id = generate_id(target, &item.author, &item.date);
        }
    });
}

/// Pass 3: a note whose entire text is short and spaceless is almost
/// always a citation anchor that lost its brackets. Fatal; the author
/// must fix the source.
pub fn check_footnotes(blocks: &[Block]) -> Result<(), BuildError> {
    let mut offending: Option<String> = None;
    walk_inlines(blocks, &mut |inline| {
        if offending.is_some() {
            return;
        }
        if let Inline::Span(attr, children) = inline {
            if attr.has_class("footnote") {
                let text = inlines_to_text(children);
                let trimmed = text.trim();
                if !trimmed.is_empty() && trimmed.len() < 20 && !trimmed.contains(' ') {
                    offending = Some(trimmed.to_string());
                }
            }
        }
    });
    match offending {
        Some(text) => Err(BuildError::MalformedFootnote { text }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Attr;
    use crate::metadata::{MetadataItem, MetadataStore};
    use std::path::Path;

    fn store_with(path: &str, item: MetadataItem) -> MetadataStore {
        let mut store = MetadataStore::empty(
            "https://www.example.net",
            Path::new("/tmp/marginalia-test-auto.yaml"),
        );
        store.insert_memory(path, item);
        store
    }

    fn long_abstract() -> String {
        format!("<p>{}</p>", "A sufficiently long abstract sentence. ".repeat(8))
    }

    fn link(target: &str) -> Block {
        Block::Para(vec![Inline::Link(
            Attr::empty(),
            vec![Inline::Str("paper".into())],
            (target.into(), String::new()),
        )])
    }

    fn first_link_attr(blocks: &[Block]) -> Attr {
        let mut found = None;
        walk_inlines(blocks, &mut |inline| {
            if let Inline::Link(attr, _, _) = inline {
                if found.is_none() {
                    found = Some(attr.clone());
                }
            }
        });
        found.expect("document contains a link")
    }

    #[test]
    fn collect_targets_in_order_without_fragments_or_shorthand() {
        let blocks = vec![
            link("https://arxiv.org/abs/1706.03762"),
            link("#local-fragment"),
            link("!W"),
            link("/doc/a.pdf"),
            link("https://arxiv.org/abs/1706.03762"),
        ];
        assert_eq!(
            collect_link_targets(&blocks),
            vec!["https://arxiv.org/abs/1706.03762", "/doc/a.pdf"]
        );
    }

    #[test]
    fn annotated_link_gains_class_and_id() {
        let item = MetadataItem {
            title: "Attention Is All You Need".into(),
            author: "Ashish Vaswani, Noam Shazeer, Niki Parmar".into(),
            date: "2017-06-12".into(),
            doi: String::new(),
            tags: vec![],
            abstract_html: long_abstract(),
        };
        let store = store_with("https://arxiv.org/abs/1706.03762", item);
        let mut blocks = vec![link("https://arxiv.org/abs/1706.03762")];
        mark_annotated_links(&mut blocks, &store, WikipediaMode::Client);
        let attr = first_link_attr(&blocks);
        assert!(attr.has_class(DOC_METADATA_CLASS));
        assert_eq!(attr.id, "vaswani-et-al-2017");
    }

    #[test]
    fn short_abstract_left_unmarked() {
        let item = MetadataItem {
            title: "Short".into(),
            author: "Alice Johnson".into(),
            date: "2019".into(),
            doi: String::new(),
            tags: vec![],
            abstract_html: "<p>Too short.</p>".into(),
        };
        let store = store_with("/doc/short.pdf", item);
        let mut blocks = vec![link("/doc/short.pdf")];
        mark_annotated_links(&mut blocks, &store, WikipediaMode::Client);
        let attr = first_link_attr(&blocks);
        assert!(!attr.has_class(DOC_METADATA_CLASS));
    }

    #[test]
    fn wikipedia_marked_unconditionally_in_client_mode() {
        let store = store_with(
            "/x",
            MetadataItem {
                title: "t".into(),
                author: "a".into(),
                date: "2020".into(),
                doi: String::new(),
                tags: vec![],
                abstract_html: long_abstract(),
            },
        );
        let mut blocks = vec![link("https://en.wikipedia.org/wiki/Attention")];
        mark_annotated_links(&mut blocks, &store, WikipediaMode::Client);
        let attr = first_link_attr(&blocks);
        assert!(attr.has_class(DOC_METADATA_CLASS));
        // Wikipedia links never get a generated ID
        assert!(attr.id.is_empty());
    }

    #[test]
    fn opt_out_attribute_respected() {
        let item = MetadataItem {
            title: "T".into(),
            author: "Alice Johnson".into(),
            date: "2019".into(),
            doi: String::new(),
            tags: vec![],
            abstract_html: long_abstract(),
        };
        let store = store_with("/doc/a.pdf", item);
        let mut attr = Attr::empty();
        attr.set_kv(OPT_OUT_ATTR, "true");
        let mut blocks = vec![Block::Para(vec![Inline::Link(
            attr,
            vec![Inline::Str("paper".into())],
            ("/doc/a.pdf".into(), String::new()),
        )])];
        mark_annotated_links(&mut blocks, &store, WikipediaMode::Client);
        assert!(!first_link_attr(&blocks).has_class(DOC_METADATA_CLASS));
    }

    #[test]
    fn negative_entry_not_marked() {
        let store = store_with("/doc/a.pdf", MetadataItem::negative());
        let mut blocks = vec![link("/doc/a.pdf")];
        mark_annotated_links(&mut blocks, &store, WikipediaMode::Client);
        assert!(!first_link_attr(&blocks).has_class(DOC_METADATA_CLASS));
    }

    #[test]
    fn malformed_footnote_fails() {
        let mut attr = Attr::empty();
        attr.add_class("footnote");
        let blocks = vec![Block::Para(vec![Inline::Span(
            attr,
            vec![Inline::Str("Smith2020".into())],
        )])];
        let err = check_footnotes(&blocks).unwrap_err();
        assert!(
            matches!(err, BuildError::MalformedFootnote { ref text } if text == "Smith2020"),
            "{err}"
        );
    }

    #[test]
    fn normal_footnote_passes() {
        let mut attr = Attr::empty();
        attr.add_class("footnote");
        let blocks = vec![Block::Para(vec![Inline::Span(
            attr,
            vec![Inline::Str("A real footnote with prose.".into())],
        )])];
        assert!(check_footnotes(&blocks).is_ok());
    }
}
