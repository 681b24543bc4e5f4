//! Abstract cleaner: one ordered rule table applied to every scraped
//! abstract before it enters the store.
//!
//! The table is data, not code, so the rule list stays reviewable and
//! testable on its own. Regex rules run first, then the fixed-string
//! rules, then a final trim. Every rule is idempotent, so the composed
//! rewrite reaches its fixed point in a single application.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Literal,
    Regex,
}

pub struct CleanerRule {
    pub before: &'static str,
    pub after: &'static str,
    pub kind: RuleKind,
}

const fn lit(before: &'static str, after: &'static str) -> CleanerRule {
    CleanerRule {
        before,
        after,
        kind: RuleKind::Literal,
    }
}

const fn re(before: &'static str, after: &'static str) -> CleanerRule {
    CleanerRule {
        before,
        after,
        kind: RuleKind::Regex,
    }
}

/// The ordered rule table. Order matters: more specific rules precede the
/// general ones they would otherwise shadow.
pub static RULES: &[CleanerRule] = &[
    // ── Regex rules ────────────────────────────────────────────────────
    // Dimension notation: "10x2", "3 x 5" → true multiplication sign.
    re(r"(\d+)\s*[x×]\s*(\d+)", "${1}×${2}"),
    // Superscripted ordinals.
    re(r"\b(\d+)(st|nd|rd|th)\b", "${1}<sup>${2}</sup>"),
    // JEL classification codes appended by economics journals.
    re(r"\s*\(JEL [A-Z]\d{1,2}(?:,\s*[A-Z]\d{1,2})*\)\.?", ""),
    // Publisher copyright boilerplate paragraphs.
    re(r"<p>\s*(?:Copyright )?©[^<]*</p>", ""),
    re(r"\(PsycI[Nn][Ff][Oo] Database Record[^)]*\)\.?", ""),
    re(r"<p>This article is protected by copyright[^<]*</p>", ""),
    // Section headings glued on as <h3>/<h4> become inline run-in labels.
    re(
        r"<h[34]>(Background|Introduction|Context|Objectives?|Aims?|Rationale|Purpose|Methods?|Methodology|Design|Setting|Participants|Measurements|Interventions?|Results?|Findings|Outcomes?|Discussion|Interpretation|Conclusions?|Significance|Funding|Trial Registration)</h[34]>\s*<p>",
        "<p><strong>${1}</strong>: ",
    ),
    // MathJax inline fragments for bare comparison operators.
    re(r"\$\s*<\s*\$", "&lt;"),
    re(r"\$\s*>\s*\$", "&gt;"),
    // Spelled-out percentages and double-escaped ampersands.
    re(r"(\d+) percent\b", "${1}%"),
    re(r"&amp;(amp;)+", "&amp;"),
    // Non-breaking spaces, then runs of spaces, collapse in one pass.
    re(r"(?:&nbsp;|\u{00A0})", " "),
    re(r"  +", " "),
    // ── Fixed-string rules ─────────────────────────────────────────────
    // JATS tag translation (Crossref abstracts arrive in JATS).
    lit("<jats:title>Abstract</jats:title>", ""),
    lit("<jats:title>ABSTRACT</jats:title>", ""),
    lit("<jats:sec>", ""),
    lit("</jats:sec>", ""),
    lit("<jats:p>", "<p>"),
    lit("</jats:p>", "</p>"),
    lit("<jats:italic>", "<em>"),
    lit("</jats:italic>", "</em>"),
    lit("<jats:bold>", "<strong>"),
    lit("</jats:bold>", "</strong>"),
    lit("<jats:sup>", "<sup>"),
    lit("</jats:sup>", "</sup>"),
    lit("<jats:sub>", "<sub>"),
    lit("</jats:sub>", "</sub>"),
    lit("<jats:title>", "<strong>"),
    lit("</jats:title>", "</strong>: "),
    lit("<jats:list>", "<ul>"),
    lit("</jats:list>", "</ul>"),
    lit("<jats:list-item>", "<li>"),
    lit("</jats:list-item>", "</li>"),
    // Legacy presentational tags.
    lit("<i>", "<em>"),
    lit("</i>", "</em>"),
    lit("<b>", "<strong>"),
    lit("</b>", "</strong>"),
    // Run-in heading labels that arrive bold-with-colon-inside.
    lit("<strong>Background:</strong>", "<strong>Background</strong>:"),
    lit("<strong>Objective:</strong>", "<strong>Objective</strong>:"),
    lit("<strong>Objectives:</strong>", "<strong>Objectives</strong>:"),
    lit("<strong>Methods:</strong>", "<strong>Methods</strong>:"),
    lit("<strong>Results:</strong>", "<strong>Results</strong>:"),
    lit("<strong>Conclusion:</strong>", "<strong>Conclusion</strong>:"),
    lit("<strong>Conclusions:</strong>", "<strong>Conclusions</strong>:"),
    lit("<strong>Significance:</strong>", "<strong>Significance</strong>:"),
    // Statistical notation. Specific before general.
    lit("p&lt;.", "<em>p</em> < 0."),
    lit("p&lt;0.", "<em>p</em> < 0."),
    lit("p&lt; .", "<em>p</em> < 0."),
    lit("p &lt; .", "<em>p</em> < 0."),
    lit("p &lt; 0.", "<em>p</em> < 0."),
    lit("p&lt;", "<em>p</em> < "),
    lit("P&lt;.", "<em>p</em> < 0."),
    lit("P&lt;0.", "<em>p</em> < 0."),
    lit("p=.", "<em>p</em> = 0."),
    lit("p = .", "<em>p</em> = 0."),
    lit("p&gt;.", "<em>p</em> > 0."),
    lit("n=", "<em>n</em> = "),
    lit("N=", "<em>N</em> = "),
    lit("n =", "<em>n</em> ="),
    lit("N =", "<em>N</em> ="),
    lit("r=.", "<em>r</em> = 0."),
    lit("r = .", "<em>r</em> = 0."),
    lit("d=.", "<em>d</em> = 0."),
    lit("95% CI", "95% confidence interval"),
    lit("95 % CI", "95% confidence interval"),
    // Boilerplate phrases.
    lit("<p>Abstract</p>", ""),
    lit("<p>ABSTRACT</p>", ""),
    lit("All rights reserved.", ""),
    lit("This is an open access article distributed under the terms of the Creative Commons Attribution License.", ""),
    lit("[This corrects the article", "[Corrects the article"),
    // Unit and typography fixes.
    lit(" – ", "—"),
    lit(" -- ", "—"),
    lit("...", "…"),
    lit("ºC", "°C"),
    lit("+/-", "±"),
];

static COMPILED: Lazy<Vec<Option<Regex>>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| match rule.kind {
            RuleKind::Regex => Some(Regex::new(rule.before).expect("cleaner rule regex")),
            RuleKind::Literal => None,
        })
        .collect()
});

/// Clean a scraped abstract. Pure; fixed point in one application.
pub fn clean_abstract_html(input: &str) -> String {
    let mut text = input.to_string();
    for (rule, compiled) in RULES.iter().zip(COMPILED.iter()) {
        match rule.kind {
            RuleKind::Regex => {
                let regex = compiled.as_ref().expect("compiled alongside table");
                if regex.is_match(&text) {
                    text = regex.replace_all(&text, rule.after).into_owned();
                }
            }
            RuleKind::Literal => {
                if text.contains(rule.before) {
                    text = text.replace(rule.before, rule.after);
                }
            }
        }
    }
    text.trim().to_string()
}
