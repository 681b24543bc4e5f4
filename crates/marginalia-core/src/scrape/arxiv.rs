//! arXiv scraper: the Atom export API, queried by paper id.

use std::time::Duration;

use super::{ScrapeError, ScrapeFuture, Scraper, classify_status};
use crate::metadata::MetadataItem;

pub(crate) const USER_AGENT: &str =
    "marginalia-annotation-scraper/0.4 (site build; contact via repo)";

pub struct Arxiv;

impl Scraper for Arxiv {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let id = match extract_id(path) {
                Some(id) => id,
                None => return Err(ScrapeError::Permanent),
            };
            let url = format!(
                "https://export.arxiv.org/api/query?id_list={}",
                urlencoding::encode(&id)
            );

            let resp = client
                .get(&url)
                .header("User-Agent", USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            let entry = parse_atom_entry(&body)?;
            if entry.title.is_empty() {
                return Err(ScrapeError::Permanent);
            }

            Ok(MetadataItem {
                title: entry.title,
                author: entry.authors.join(", "),
                date: entry.published.chars().take(10).collect(),
                doi: entry.doi,
                tags: vec![],
                abstract_html: summary_to_html(&entry.summary),
            })
        })
    }
}

/// `/abs/1706.03762`, `/pdf/1706.03762.pdf`, `/abs/math/0406166v2` → the id.
fn extract_id(path: &str) -> Option<String> {
    let rest = path
        .split_once("arxiv.org/abs/")
        .or_else(|| path.split_once("arxiv.org/pdf/"))
        .map(|(_, rest)| rest)?;
    let id = rest.split(['#', '?']).next().unwrap_or(rest);
    let id = id.strip_suffix(".pdf").unwrap_or(id);
    if id.is_empty() { None } else { Some(id.to_string()) }
}

#[derive(Default)]
struct AtomEntry {
    title: String,
    authors: Vec<String>,
    published: String,
    doi: String,
    summary: String,
}

/// Pull the first `<entry>` out of the Atom feed.
fn parse_atom_entry(xml: &str) -> Result<AtomEntry, ScrapeError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();

    let mut entry = AtomEntry::default();
    let mut in_entry = false;
    let mut in_author = false;
    let mut field: Option<&'static str> = None;
    let mut current_name = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"entry" => in_entry = true,
                b"title" if in_entry => field = Some("title"),
                b"summary" if in_entry => field = Some("summary"),
                b"published" if in_entry => field = Some("published"),
                // `arxiv:doi` has local name `doi`
                b"doi" if in_entry => field = Some("doi"),
                b"author" if in_entry => {
                    in_author = true;
                    current_name.clear();
                }
                b"name" if in_author => field = Some("name"),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                match field {
                    Some("title") => entry.title.push_str(&text),
                    Some("summary") => entry.summary.push_str(&text),
                    Some("published") => entry.published.push_str(&text),
                    Some("doi") => entry.doi.push_str(&text),
                    Some("name") => current_name.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => break,
                b"author" => {
                    if !current_name.trim().is_empty() {
                        entry.authors.push(current_name.trim().to_string());
                    }
                    in_author = false;
                    field = None;
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScrapeError::Temporary(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    entry.title = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(entry)
}

/// The summary is LaTeX-flavored plain text. Normalize escapes, split
/// paragraphs, convert the handful of commands that actually occur, and
/// leave math segments untouched for client-side rendering.
fn summary_to_html(summary: &str) -> String {
    let text = summary.replace("\\%", "%").replace("\\$", "$");
    let normalized = text.replace("\r\n", "\n");

    // arXiv marks paragraph breaks with a newline followed by indentation.
    let paragraph_text = normalized.replace("\n  ", "\n\n");

    let mut out = String::new();
    for para in paragraph_text.split("\n\n") {
        let joined = para.split_whitespace().collect::<Vec<_>>().join(" ");
        if joined.is_empty() {
            continue;
        }
        out.push_str("<p>");
        out.push_str(&latex_spans_to_html(&joined));
        out.push_str("</p>\n");
    }
    out.trim_end().to_string()
}

/// Minimal LaTeX span conversion: emphasis, bold, teletype, quotes.
fn latex_spans_to_html(text: &str) -> String {
    let mut out = text.to_string();
    for (cmd, open, close) in [
        ("\\emph{", "<em>", "</em>"),
        ("\\textit{", "<em>", "</em>"),
        ("\\textbf{", "<strong>", "</strong>"),
        ("\\texttt{", "<code>", "</code>"),
    ] {
        while let Some(start) = out.find(cmd) {
            let inner_start = start + cmd.len();
            let Some(rel_end) = out[inner_start..].find('}') else {
                break;
            };
            let inner = out[inner_start..inner_start + rel_end].to_string();
            out.replace_range(
                start..inner_start + rel_end + 1,
                &format!("{open}{inner}{close}"),
            );
        }
    }
    out.replace("``", "\u{201C}").replace("''", "\u{201D}")
}
