//! AST ↔ HTML bridge.
//!
//! Serialization happens once per document at the end of its pipeline.
//! Parsing is needed for scraped abstracts and for source documents: the
//! fragment parser maps the common elements onto the typed tree and
//! degrades anything else to raw nodes so no cleaner output is ever lost.

use scraper::{ElementRef, Html};

use crate::ast::{Attr, Block, Inline, inlines_to_text};

// ── Serialization ───────────────────────────────────────────────────────

pub fn blocks_to_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        write_block(block, &mut out);
    }
    out
}

pub fn inlines_to_html(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        write_inline(inline, &mut out);
    }
    out
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Attribute order is stable: id, class, then key-value pairs.
fn write_attr(attr: &Attr, out: &mut String) {
    if !attr.id.is_empty() {
        out.push_str(" id=\"");
        escape_attr(&attr.id, out);
        out.push('"');
    }
    if !attr.classes.is_empty() {
        out.push_str(" class=\"");
        escape_attr(&attr.classes.join(" "), out);
        out.push('"');
    }
    for (k, v) in &attr.kvs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_attr(v, out);
        out.push('"');
    }
}

fn write_block(block: &Block, out: &mut String) {
    match block {
        Block::Plain(inlines) => {
            for inline in inlines {
                write_inline(inline, out);
            }
        }
        Block::Para(inlines) => {
            out.push_str("<p>");
            for inline in inlines {
                write_inline(inline, out);
            }
            out.push_str("</p>\n");
        }
        Block::Header(level, attr, inlines) => {
            let level = (*level).clamp(1, 6);
            out.push_str(&format!("<h{level}"));
            write_attr(attr, out);
            out.push('>');
            for inline in inlines {
                write_inline(inline, out);
            }
            out.push_str(&format!("</h{level}>\n"));
        }
        Block::HorizontalRule => out.push_str("<hr />\n"),
        Block::BlockQuote(children) => {
            out.push_str("<blockquote>\n");
            for child in children {
                write_block(child, out);
            }
            out.push_str("</blockquote>\n");
        }
        Block::Div(attr, children) => {
            out.push_str("<div");
            write_attr(attr, out);
            out.push_str(">\n");
            for child in children {
                write_block(child, out);
            }
            out.push_str("</div>\n");
        }
        Block::BulletList(items) => {
            out.push_str("<ul>\n");
            for item in items {
                out.push_str("<li>");
                for child in item {
                    write_block(child, out);
                }
                out.push_str("</li>\n");
            }
            out.push_str("</ul>\n");
        }
        Block::CodeBlock(attr, code) => {
            out.push_str("<pre");
            write_attr(attr, out);
            out.push_str("><code>");
            escape_text(code, out);
            out.push_str("</code></pre>\n");
        }
        Block::RawBlock(html) => {
            out.push_str(html);
            out.push('\n');
        }
    }
}

fn write_inline(inline: &Inline, out: &mut String) {
    match inline {
        Inline::Str(s) => escape_text(s, out),
        Inline::Space => out.push(' '),
        Inline::SoftBreak => out.push('\n'),
        Inline::Emph(children) => {
            out.push_str("<em>");
            for child in children {
                write_inline(child, out);
            }
            out.push_str("</em>");
        }
        Inline::Strong(children) => {
            out.push_str("<strong>");
            for child in children {
                write_inline(child, out);
            }
            out.push_str("</strong>");
        }
        Inline::Code(attr, code) => {
            out.push_str("<code");
            write_attr(attr, out);
            out.push('>');
            escape_text(code, out);
            out.push_str("</code>");
        }
        Inline::Link(attr, children, (target, tooltip)) => {
            out.push_str("<a");
            write_attr(attr, out);
            out.push_str(" href=\"");
            escape_attr(target, out);
            out.push('"');
            if !tooltip.is_empty() {
                out.push_str(" title=\"");
                escape_attr(tooltip, out);
                out.push('"');
            }
            out.push('>');
            for child in children {
                write_inline(child, out);
            }
            out.push_str("</a>");
        }
        Inline::Image(attr, alt, (src, tooltip)) => {
            out.push_str("<img");
            write_attr(attr, out);
            out.push_str(" src=\"");
            escape_attr(src, out);
            out.push('"');
            let alt_text = inlines_to_text(alt);
            if !alt_text.is_empty() {
                out.push_str(" alt=\"");
                escape_attr(&alt_text, out);
                out.push('"');
            }
            if !tooltip.is_empty() {
                out.push_str(" title=\"");
                escape_attr(tooltip, out);
                out.push('"');
            }
            out.push_str(" />");
        }
        Inline::Span(attr, children) => {
            out.push_str("<span");
            write_attr(attr, out);
            out.push('>');
            for child in children {
                write_inline(child, out);
            }
            out.push_str("</span>");
        }
        Inline::RawInline(html) => out.push_str(html),
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────

/// Parse an HTML fragment into blocks.
///
/// Bare inline content at the top level is wrapped into a `Plain` block;
/// the loose-block pass later promotes it to a paragraph.
pub fn parse_fragment(html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();
    let mut blocks = Vec::new();
    let mut pending_inlines: Vec<Inline> = Vec::new();
    for child in root.children() {
        parse_node(child, &mut blocks, &mut pending_inlines);
    }
    flush_inlines(&mut blocks, &mut pending_inlines);
    blocks
}

fn element_attr(el: &ElementRef) -> Attr {
    let value = el.value();
    let mut attr = Attr::empty();
    if let Some(id) = value.attr("id") {
        attr.id = id.to_string();
    }
    attr.classes = value.classes().map(|c| c.to_string()).collect();
    for (name, val) in value.attrs() {
        match name {
            "id" | "class" | "href" | "src" | "title" | "alt" => {}
            _ => attr.kvs.push((name.to_string(), val.to_string())),
        }
    }
    attr
}

fn flush_inlines(blocks: &mut Vec<Block>, pending: &mut Vec<Inline>) {
    let only_whitespace = pending
        .iter()
        .all(|i| matches!(i, Inline::Space | Inline::SoftBreak));
    if pending.is_empty() || only_whitespace {
        pending.clear();
        return;
    }
    blocks.push(Block::Plain(std::mem::take(pending)));
}

fn parse_node(
    node: ego_tree::NodeRef<'_, scraper::Node>,
    blocks: &mut Vec<Block>,
    pending: &mut Vec<Inline>,
) {
    match node.value() {
        scraper::Node::Text(text) => push_text_inlines(&text, pending),
        scraper::Node::Element(_) => {
            let el = ElementRef::wrap(node).expect("element node wraps");
            let name = el.value().name();
            match name {
                "p" => {
                    flush_inlines(blocks, pending);
                    blocks.push(Block::Para(parse_children_inline(el)));
                }
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    flush_inlines(blocks, pending);
                    let level = name.as_bytes()[1] - b'0';
                    blocks.push(Block::Header(
                        level,
                        element_attr(&el),
                        parse_children_inline(el),
                    ));
                }
                "hr" => {
                    flush_inlines(blocks, pending);
                    blocks.push(Block::HorizontalRule);
                }
                "blockquote" => {
                    flush_inlines(blocks, pending);
                    blocks.push(Block::BlockQuote(parse_children_block(el)));
                }
                "div" | "section" | "article" => {
                    flush_inlines(blocks, pending);
                    blocks.push(Block::Div(element_attr(&el), parse_children_block(el)));
                }
                "ul" | "ol" => {
                    flush_inlines(blocks, pending);
                    let mut items = Vec::new();
                    for li in el.children() {
                        if let Some(li_el) = ElementRef::wrap(li) {
                            if li_el.value().name() == "li" {
                                items.push(parse_children_block(li_el));
                            }
                        }
                    }
                    blocks.push(Block::BulletList(items));
                }
                "pre" => {
                    flush_inlines(blocks, pending);
                    let code: String = el.text().collect();
                    blocks.push(Block::CodeBlock(element_attr(&el), code));
                }
                // Structural elements we do not model keep their raw HTML.
                "table" | "figure" | "dl" | "video" | "audio" => {
                    flush_inlines(blocks, pending);
                    blocks.push(Block::RawBlock(el.html()));
                }
                _ => parse_inline_element(el, pending),
            }
        }
        _ => {}
    }
}

fn push_text_inlines(text: &str, pending: &mut Vec<Inline>) {
    let mut current = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                pending.push(Inline::Str(std::mem::take(&mut current)));
            }
            if !matches!(pending.last(), Some(Inline::Space) | None) {
                pending.push(Inline::Space);
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        pending.push(Inline::Str(current));
    }
}

fn parse_children_inline(el: ElementRef) -> Vec<Inline> {
    let mut inlines = Vec::new();
    for child in el.children() {
        parse_inline_node(child, &mut inlines);
    }
    // Trim boundary whitespace
    while matches!(inlines.first(), Some(Inline::Space)) {
        inlines.remove(0);
    }
    while matches!(inlines.last(), Some(Inline::Space)) {
        inlines.pop();
    }
    inlines
}

fn parse_children_block(el: ElementRef) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending = Vec::new();
    for child in el.children() {
        parse_node(child, &mut blocks, &mut pending);
    }
    flush_inlines(&mut blocks, &mut pending);
    blocks
}

fn parse_inline_node(node: ego_tree::NodeRef<'_, scraper::Node>, out: &mut Vec<Inline>) {
    match node.value() {
        scraper::Node::Text(text) => push_text_inlines(&text, out),
        scraper::Node::Element(_) => {
            let el = ElementRef::wrap(node).expect("element node wraps");
            parse_inline_element(el, out);
        }
        _ => {}
    }
}

fn parse_inline_element(el: ElementRef, out: &mut Vec<Inline>) {
    let name = el.value().name();
    match name {
        "em" | "i" => out.push(Inline::Emph(parse_children_inline(el))),
        "strong" | "b" => out.push(Inline::Strong(parse_children_inline(el))),
        "code" => out.push(Inline::Code(element_attr(&el), el.text().collect())),
        "a" => {
            let target = el.value().attr("href").unwrap_or_default().to_string();
            let tooltip = el.value().attr("title").unwrap_or_default().to_string();
            out.push(Inline::Link(
                element_attr(&el),
                parse_children_inline(el),
                (target, tooltip),
            ));
        }
        "img" => {
            let src = el.value().attr("src").unwrap_or_default().to_string();
            let tooltip = el.value().attr("title").unwrap_or_default().to_string();
            let alt = el
                .value()
                .attr("alt")
                .map(|a| vec![Inline::Str(a.to_string())])
                .unwrap_or_default();
            out.push(Inline::Image(element_attr(&el), alt, (src, tooltip)));
        }
        "span" => out.push(Inline::Span(element_attr(&el), parse_children_inline(el))),
        "br" => out.push(Inline::SoftBreak),
        "sub" | "sup" | "small" | "abbr" | "cite" | "q" | "math" => {
            out.push(Inline::RawInline(el.html()))
        }
        // Unwrap anything else to its children rather than dropping text.
        _ => {
            for child in el.children() {
                parse_inline_node(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_round_trip() {
        let blocks = parse_fragment("<p>Hello <em>world</em></p>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks_to_html(&blocks), "<p>Hello <em>world</em></p>\n");
    }

    #[test]
    fn link_attributes_survive() {
        let blocks = parse_fragment(r#"<p><a class="x" href="/doc/a.pdf" title="t">a</a></p>"#);
        let html = blocks_to_html(&blocks);
        assert!(html.contains(r#"class="x""#), "{html}");
        assert!(html.contains(r#"href="/doc/a.pdf""#), "{html}");
        assert!(html.contains(r#"title="t""#), "{html}");
    }

    #[test]
    fn bare_inline_content_becomes_plain_block() {
        let blocks = parse_fragment("just text");
        assert!(matches!(blocks[0], Block::Plain(_)));
    }

    #[test]
    fn header_id_parsed() {
        let blocks = parse_fragment(r#"<h2 id="intro">Intro</h2>"#);
        match &blocks[0] {
            Block::Header(2, attr, _) => assert_eq!(attr.id, "intro"),
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn text_escaped_on_output() {
        let blocks = vec![Block::Para(vec![Inline::Str("a<b & c".into())])];
        assert_eq!(blocks_to_html(&blocks), "<p>a&lt;b &amp; c</p>\n");
    }

    #[test]
    fn inline_run_serialized() {
        let inlines = vec![
            Inline::Str("see".into()),
            Inline::Space,
            Inline::Strong(vec![Inline::Str("this".into())]),
        ];
        assert_eq!(inlines_to_html(&inlines), "see <strong>this</strong>");
    }

    #[test]
    fn table_kept_as_raw_block() {
        let blocks = parse_fragment("<table><tr><td>x</td></tr></table>");
        assert!(matches!(&blocks[0], Block::RawBlock(raw) if raw.contains("<td>")));
    }

    #[test]
    fn nested_blockquote_structure() {
        let blocks = parse_fragment("<blockquote><p>inner</p></blockquote>");
        match &blocks[0] {
            Block::BlockQuote(children) => assert!(matches!(children[0], Block::Para(_))),
            other => panic!("expected blockquote, got {other:?}"),
        }
    }
}
