//! Typed document tree shared by every rewrite pass.
//!
//! The shape is deliberately small: blocks, inlines, and an attribute
//! triple (id, classes, key-value pairs) on every node that can carry one.
//! Passes mutate the tree in place via the `walk_*` helpers; a document is
//! serialized to HTML exactly once, after its pipeline completes.

/// Attribute triple attached to linkable nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attr {
    pub id: String,
    pub classes: Vec<String>,
    pub kvs: Vec<(String, String)>,
}

impl Attr {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Add a class if not already present. Never duplicates.
    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.classes.push(class.to_string());
        }
    }

    pub fn get_kv(&self, key: &str) -> Option<&str> {
        self.kvs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_kv(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.kvs.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.kvs.push((key.to_string(), value.to_string()));
        }
    }
}

/// Inline-level node.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Str(String),
    Space,
    SoftBreak,
    Emph(Vec<Inline>),
    Strong(Vec<Inline>),
    Code(Attr, String),
    /// Hyperlink: attributes, visible children, (target, tooltip).
    Link(Attr, Vec<Inline>, (String, String)),
    /// Image: attributes, alt-text children, (source, tooltip).
    Image(Attr, Vec<Inline>, (String, String)),
    Span(Attr, Vec<Inline>),
    RawInline(String),
}

/// Block-level node.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Plain(Vec<Inline>),
    Para(Vec<Inline>),
    /// Header: level, attributes, children.
    Header(u8, Attr, Vec<Inline>),
    HorizontalRule,
    BlockQuote(Vec<Block>),
    Div(Attr, Vec<Block>),
    BulletList(Vec<Vec<Block>>),
    CodeBlock(Attr, String),
    RawBlock(String),
}

/// A parsed document: source path plus its block tree.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub blocks: Vec<Block>,
}

/// Apply `f` to every inline in the tree, bottom-up, in source order.
pub fn walk_inlines_mut(blocks: &mut [Block], f: &mut impl FnMut(&mut Inline)) {
    for block in blocks {
        walk_block_inlines_mut(block, f);
    }
}

fn walk_block_inlines_mut(block: &mut Block, f: &mut impl FnMut(&mut Inline)) {
    match block {
        Block::Plain(inlines) | Block::Para(inlines) | Block::Header(_, _, inlines) => {
            walk_inline_vec_mut(inlines, f)
        }
        Block::BlockQuote(children) | Block::Div(_, children) => walk_inlines_mut(children, f),
        Block::BulletList(items) => {
            for item in items {
                walk_inlines_mut(item, f);
            }
        }
        Block::HorizontalRule | Block::CodeBlock(..) | Block::RawBlock(_) => {}
    }
}

fn walk_inline_vec_mut(inlines: &mut [Inline], f: &mut impl FnMut(&mut Inline)) {
    for inline in inlines {
        match inline {
            Inline::Emph(children)
            | Inline::Strong(children)
            | Inline::Span(_, children)
            | Inline::Link(_, children, _)
            | Inline::Image(_, children, _) => walk_inline_vec_mut(children, f),
            _ => {}
        }
        f(inline);
    }
}

/// Read-only inline walk, bottom-up, in source order.
pub fn walk_inlines(blocks: &[Block], f: &mut impl FnMut(&Inline)) {
    for block in blocks {
        walk_block_inlines(block, f);
    }
}

fn walk_block_inlines(block: &Block, f: &mut impl FnMut(&Inline)) {
    match block {
        Block::Plain(inlines) | Block::Para(inlines) | Block::Header(_, _, inlines) => {
            walk_inline_vec(inlines, f)
        }
        Block::BlockQuote(children) | Block::Div(_, children) => walk_inlines(children, f),
        Block::BulletList(items) => {
            for item in items {
                walk_inlines(item, f);
            }
        }
        Block::HorizontalRule | Block::CodeBlock(..) | Block::RawBlock(_) => {}
    }
}

fn walk_inline_vec(inlines: &[Inline], f: &mut impl FnMut(&Inline)) {
    for inline in inlines {
        match inline {
            Inline::Emph(children)
            | Inline::Strong(children)
            | Inline::Span(_, children)
            | Inline::Link(_, children, _)
            | Inline::Image(_, children, _) => walk_inline_vec(children, f),
            _ => {}
        }
        f(inline);
    }
}

/// Apply `f` to every block, top-down, in source order.
pub fn walk_blocks_mut(blocks: &mut Vec<Block>, f: &mut impl FnMut(&mut Block)) {
    for block in blocks.iter_mut() {
        f(block);
        match block {
            Block::BlockQuote(children) | Block::Div(_, children) => walk_blocks_mut(children, f),
            Block::BulletList(items) => {
                for item in items {
                    walk_blocks_mut(item, f);
                }
            }
            _ => {}
        }
    }
}

/// Plain-text rendering of an inline run (tooltips, phrase matching).
pub fn inlines_to_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    push_text(inlines, &mut out);
    out
}

fn push_text(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Str(s) => out.push_str(s),
            Inline::Space => out.push(' '),
            Inline::SoftBreak => out.push(' '),
            Inline::Code(_, s) => out.push_str(s),
            Inline::Emph(children)
            | Inline::Strong(children)
            | Inline::Span(_, children)
            | Inline::Link(_, children, _)
            | Inline::Image(_, children, _) => push_text(children, out),
            Inline::RawInline(_) => {}
        }
    }
}

/// Promote top-level `Plain` blocks to `Para` so loose list output renders
/// with normal paragraph spacing.
pub fn normalize_loose_blocks(blocks: &mut [Block]) {
    for block in blocks {
        if let Block::Plain(inlines) = block {
            *block = Block::Para(std::mem::take(inlines));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Block> {
        vec![
            Block::Para(vec![
                Inline::Str("See".into()),
                Inline::Space,
                Inline::Link(
                    Attr::empty(),
                    vec![Inline::Str("here".into())],
                    ("/notes".into(), String::new()),
                ),
            ]),
            Block::BlockQuote(vec![Block::Plain(vec![Inline::Str("quoted".into())])]),
        ]
    }

    #[test]
    fn walk_visits_nested_links() {
        let mut blocks = sample();
        let mut targets = Vec::new();
        walk_inlines_mut(&mut blocks, &mut |inline| {
            if let Inline::Link(_, _, (target, _)) = inline {
                targets.push(target.clone());
            }
        });
        assert_eq!(targets, vec!["/notes"]);
    }

    #[test]
    fn text_rendering_flattens_structure() {
        let blocks = sample();
        if let Block::Para(inlines) = &blocks[0] {
            assert_eq!(inlines_to_text(inlines), "See here");
        } else {
            panic!("expected Para");
        }
    }

    #[test]
    fn add_class_never_duplicates() {
        let mut attr = Attr::empty();
        attr.add_class("link-local");
        attr.add_class("link-local");
        assert_eq!(attr.classes, vec!["link-local"]);
    }

    #[test]
    fn loose_blocks_promoted_at_top_level_only() {
        let mut blocks = sample();
        normalize_loose_blocks(&mut blocks);
        assert!(matches!(blocks[0], Block::Para(_)));
        // Nested Plain inside the blockquote is untouched
        if let Block::BlockQuote(children) = &blocks[1] {
            assert!(matches!(children[0], Block::Plain(_)));
        } else {
            panic!("expected BlockQuote");
        }
    }

    #[test]
    fn set_kv_overwrites_existing() {
        let mut attr = Attr::empty();
        attr.set_kv("data-count", "1");
        attr.set_kv("data-count", "2");
        assert_eq!(attr.get_kv("data-count"), Some("2"));
        assert_eq!(attr.kvs.len(), 1);
    }
}
