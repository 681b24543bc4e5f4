//! Passes 7–9: archive rewriting and link classification.

use std::collections::HashMap;

use crate::ast::{Block, Inline, walk_inlines_mut};
use crate::metadata::strip_fragment;
use crate::passes::PageIndex;

/// Pass 7: point external links at their local snapshots.
///
/// The snapshots were made in the I/O phase; here we only consult the
/// result map. The original URL is preserved in `data-url-original` so
/// the reader can still reach the live page.
pub fn rewrite_archived_links(blocks: &mut [Block], archived: &HashMap<String, String>) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(attr, _, (target, _)) = inline else {
            return;
        };
        if !target.starts_with("http") {
            return;
        }
        let original = target.clone();
        let base = strip_fragment(&original);
        let Some(local) = archived.get(base) else {
            return;
        };
        let fragment = original.strip_prefix(base).unwrap_or("");
        attr.set_kv("data-url-original", &original);
        *target = format!("{local}{fragment}");
    });
}

/// Pass 8: mark extensionless local paths (pages, not assets) so CSS can
/// style intra-site links.
pub fn classify_local_links(blocks: &mut [Block]) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(attr, _, (target, _)) = inline else {
            return;
        };
        if is_local_page(target) {
            attr.add_class("link-local");
        }
    });
}

fn is_local_page(target: &str) -> bool {
    if !target.starts_with('/') {
        return false;
    }
    if target.starts_with("/static/") || target.starts_with("/images/") {
        return false;
    }
    let path = strip_fragment(target);
    let basename = path.rsplit('/').next().unwrap_or(path);
    !basename.contains('.')
}

/// Pass 9: propagate page-level metadata onto links — whether the target
/// has backlinks, a similar-links listing, and its tag list.
pub fn walk_page_links(blocks: &mut [Block], pages: &PageIndex) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(attr, _, (target, _)) = inline else {
            return;
        };
        if !target.starts_with('/') {
            return;
        }
        let base = strip_fragment(target).to_string();
        if pages.backlink_targets.contains(&base) {
            attr.set_kv("data-backlinks", "true");
        }
        if pages.similar_targets.contains(&base) {
            attr.set_kv("data-similars", "true");
        }
        if let Some(tags) = pages.tag_map.get(&base) {
            if !tags.is_empty() {
                attr.set_kv("data-page-tags", &tags.join(", "));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Attr;

    fn link(target: &str) -> Vec<Block> {
        vec![Block::Para(vec![Inline::Link(
            Attr::empty(),
            vec![Inline::Str("x".into())],
            (target.into(), String::new()),
        )])]
    }

    fn the_link(blocks: &[Block]) -> (Attr, String) {
        let mut found = None;
        crate::ast::walk_inlines(blocks, &mut |inline| {
            if let Inline::Link(attr, _, (target, _)) = inline {
                found = Some((attr.clone(), target.clone()));
            }
        });
        found.expect("link present")
    }

    #[test]
    fn archived_link_rewritten_with_fragment() {
        let mut archived = HashMap::new();
        archived.insert(
            "https://example.com/a".to_string(),
            "/doc/www/example.com/abc123.html".to_string(),
        );
        let mut blocks = link("https://example.com/a#sec");
        rewrite_archived_links(&mut blocks, &archived);
        let (attr, target) = the_link(&blocks);
        assert_eq!(target, "/doc/www/example.com/abc123.html#sec");
        assert_eq!(
            attr.get_kv("data-url-original"),
            Some("https://example.com/a#sec")
        );
    }

    #[test]
    fn unarchived_link_untouched() {
        let archived = HashMap::new();
        let mut blocks = link("https://example.com/a");
        rewrite_archived_links(&mut blocks, &archived);
        let (_, target) = the_link(&blocks);
        assert_eq!(target, "https://example.com/a");
    }

    #[test]
    fn local_page_classified() {
        for (target, expected) in [
            ("/notes/scaling", true),
            ("/notes/scaling#sec", true),
            ("/doc/a.pdf", false),
            ("/static/css/default.css", false),
            ("/images/logo.png", false),
            ("https://example.com/x", false),
        ] {
            let mut blocks = link(target);
            classify_local_links(&mut blocks);
            let (attr, _) = the_link(&blocks);
            assert_eq!(attr.has_class("link-local"), expected, "target {target}");
        }
    }

    #[test]
    fn page_metadata_propagated() {
        let mut pages = PageIndex::default();
        pages.backlink_targets.insert("/notes/scaling".into());
        pages
            .tag_map
            .insert("/notes/scaling".into(), vec!["ai/scaling".into()]);

        let mut blocks = link("/notes/scaling#part");
        walk_page_links(&mut blocks, &pages);
        let (attr, _) = the_link(&blocks);
        assert_eq!(attr.get_kv("data-backlinks"), Some("true"));
        assert_eq!(attr.get_kv("data-page-tags"), Some("ai/scaling"));
        assert_eq!(attr.get_kv("data-similars"), None);
    }

    #[test]
    fn external_links_skip_page_walk() {
        let pages = PageIndex::default();
        let mut blocks = link("https://example.com/x");
        walk_page_links(&mut blocks, &pages);
        let (attr, _) = the_link(&blocks);
        assert!(attr.kvs.is_empty());
    }
}
