//! Pass 10: typography. Slash and equals line-breaking, link-live and
//! link-icon classification, and the horizontal-rule cycler.

use crate::ast::{Attr, Block, Inline};

/// Zero-width space: a permitted line-break point.
pub const ZWSP: char = '\u{200B}';
/// Hair space: kerning padding inside underlined link text.
pub const HAIR: char = '\u{200A}';

/// Domains whose pages permit iframe embedding, so popups can show the
/// live page instead of a static annotation.
const LIVE_DOMAINS: &[&str] = &[
    "en.wikipedia.org",
    "en.wiktionary.org",
    "github.com",
    "gist.github.com",
    "arxiv.org",
    "openreview.net",
    "distill.pub",
    "archive.org",
];

/// (domain or extension matcher, icon name). Extension matchers start
/// with a dot.
const ICON_RULES: &[(&str, &str)] = &[
    (".pdf", "pdf"),
    ("wikipedia.org", "wikipedia"),
    ("github.com", "github"),
    ("arxiv.org", "arxiv"),
    ("twitter.com", "twitter"),
    ("x.com", "twitter"),
    ("youtube.com", "youtube"),
    ("youtu.be", "youtube"),
    ("doi.org", "doi"),
];

pub fn run(blocks: &mut [Block]) {
    break_slashes_and_equals(blocks, false);
    classify_links(blocks);
    let mut counter = 0usize;
    cycle_horizontal_rules(blocks, &mut counter);
}

// ── Slash / equals breaking ─────────────────────────────────────────────

fn break_slashes_and_equals(blocks: &mut [Block], in_link: bool) {
    for block in blocks {
        match block {
            Block::Plain(inlines) | Block::Para(inlines) | Block::Header(_, _, inlines) => {
                break_inlines(inlines, in_link)
            }
            Block::BlockQuote(children) | Block::Div(_, children) => {
                break_slashes_and_equals(children, in_link)
            }
            Block::BulletList(items) => {
                for item in items {
                    break_slashes_and_equals(item, in_link);
                }
            }
            Block::HorizontalRule | Block::CodeBlock(..) | Block::RawBlock(_) => {}
        }
    }
}

fn break_inlines(inlines: &mut [Inline], in_link: bool) {
    for inline in inlines {
        match inline {
            Inline::Str(text) => {
                let broken = break_equals(&break_slashes(text, in_link));
                *text = broken;
            }
            Inline::Emph(children)
            | Inline::Strong(children)
            | Inline::Span(_, children) => break_inlines(children, in_link),
            Inline::Link(_, children, _) => break_inlines(children, true),
            // Code, images, and raw HTML keep their text verbatim.
            _ => {}
        }
    }
}

/// Insert a break opportunity after each `/` flanked by non-space,
/// non-slash characters. Inside link text, pad with hair spaces so the
/// underline does not collide with the slash.
pub(crate) fn break_slashes(text: &str, in_link: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if c != '/' {
            out.push(c);
            continue;
        }
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let breakable = prev.is_some_and(|p| p != ' ' && p != '/')
            && next.is_some_and(|n| n != ' ' && n != '/');
        if !breakable {
            out.push('/');
            continue;
        }
        if in_link {
            out.push(HAIR);
            out.push('/');
            out.push(HAIR);
            out.push(ZWSP);
        } else {
            out.push('/');
            out.push(ZWSP);
        }
    }
    out
}

/// Space out `=`/`≠` immediately followed by an alphanumeric.
pub(crate) fn break_equals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c != '=' && c != '≠' {
            out.push(c);
            continue;
        }
        let next_alnum = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
        if !next_alnum {
            out.push(c);
            continue;
        }
        if !out.ends_with(' ') {
            out.push(' ');
        }
        out.push(c);
        out.push(' ');
    }
    out
}

// ── Link classification ─────────────────────────────────────────────────

fn classify_links(blocks: &mut [Block]) {
    crate::ast::walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(attr, _, (target, _)) = inline else {
            return;
        };
        let target = target.clone();
        if let Some(domain) = domain_of(&target) {
            if LIVE_DOMAINS
                .iter()
                .any(|live| domain == *live || domain.ends_with(&format!(".{live}")))
            {
                attr.add_class("link-live");
            }
        }
        if let Some(icon) = icon_for(&target) {
            attr.add_class("link-icon");
            attr.set_kv("data-link-icon", icon);
            attr.set_kv("data-link-icon-type", "svg");
        }
    });
}

fn domain_of(target: &str) -> Option<String> {
    let rest = target.split_once("://").map(|(_, r)| r)?;
    rest.split('/').next().map(|d| d.to_lowercase())
}

pub(crate) fn icon_for(target: &str) -> Option<&'static str> {
    let base = crate::metadata::strip_fragment(target);
    for (matcher, icon) in ICON_RULES {
        if let Some(ext) = matcher.strip_prefix('.') {
            if base.ends_with(&format!(".{ext}")) {
                return Some(icon);
            }
        } else if let Some(domain) = domain_of(base) {
            if domain == *matcher || domain.ends_with(&format!(".{matcher}")) {
                return Some(icon);
            }
        }
    }
    None
}

// ── Horizontal-rule cycler ──────────────────────────────────────────────

/// Number HRs 0,1,2,0,1,2,… in source order regardless of nesting and
/// wrap each in a div whose class encodes the cycle index. The counter
/// is an explicit accumulator threaded through the traversal.
fn cycle_horizontal_rules(blocks: &mut [Block], counter: &mut usize) {
    for block in blocks {
        match block {
            Block::HorizontalRule => {
                let mut attr = Attr::empty();
                attr.add_class(&format!("horizontalRule-nth-{}", *counter % 3));
                *counter += 1;
                *block = Block::Div(attr, vec![Block::HorizontalRule]);
            }
            Block::BlockQuote(children) => cycle_horizontal_rules(children, counter),
            Block::Div(_, children) => cycle_horizontal_rules(children, counter),
            Block::BulletList(items) => {
                for item in items {
                    cycle_horizontal_rules(item, counter);
                }
            }
            _ => {}
        }
    }
}

// ── Title casing ────────────────────────────────────────────────────────

/// Words left lowercase mid-title.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "of", "in", "on", "at", "to", "by", "for",
    "with", "via", "vs", "as", "per", "from", "into", "onto", "over", "under",
];

/// Title-case an inline run. Code spans and raw HTML keep their casing.
pub fn title_case_inlines(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut first = true;
    title_case_vec(inlines, &mut first)
}

fn title_case_vec(inlines: Vec<Inline>, first: &mut bool) -> Vec<Inline> {
    inlines
        .into_iter()
        .map(|inline| match inline {
            Inline::Str(text) => Inline::Str(title_case_text(&text, first)),
            Inline::Emph(children) => Inline::Emph(title_case_vec(children, first)),
            Inline::Strong(children) => Inline::Strong(title_case_vec(children, first)),
            Inline::Span(attr, children) => Inline::Span(attr, title_case_vec(children, first)),
            Inline::Link(attr, children, target) => {
                Inline::Link(attr, title_case_vec(children, first), target)
            }
            other => other,
        })
        .collect()
}

fn title_case_text(text: &str, first: &mut bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (word, tail) = rest.split_at(word_end);
        if !word.is_empty() {
            out.push_str(&title_case_word(word, *first));
            *first = false;
        }
        let space_end = tail
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(tail.len());
        let (spaces, remainder) = tail.split_at(space_end);
        out.push_str(spaces);
        rest = remainder;
    }
    out
}

fn title_case_word(word: &str, force: bool) -> String {
    let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
    if !force && SMALL_WORDS.contains(&bare.to_lowercase().as_str()) {
        return word.to_lowercase();
    }
    // Already-capitalized acronyms (DNA, GPT-3) stay as they are.
    if bare.chars().any(|c| c.is_uppercase()) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
