//! bioRxiv / medRxiv scraper: the article page's `<meta>` tags carry
//! everything the annotation needs.

use std::time::Duration;

use scraper::{Html, Selector};

use super::{ScrapeError, ScrapeFuture, Scraper, classify_status};
use crate::metadata::MetadataItem;

pub struct BioRxiv;

impl Scraper for BioRxiv {
    fn name(&self) -> &'static str {
        "biorxiv"
    }

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let resp = client
                .get(path)
                .header("User-Agent", super::arxiv::USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }

            let html = resp
                .text()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            let fields = extract_meta_fields(&html);
            if fields.title.is_empty() {
                return Err(ScrapeError::Permanent);
            }

            Ok(MetadataItem {
                title: fields.title,
                author: fields.contributors.join(", "),
                date: fields.date,
                doi: fields.doi,
                tags: vec![],
                abstract_html: fields.abstract_html,
            })
        })
    }
}

#[derive(Default)]
pub(crate) struct MetaFields {
    pub title: String,
    pub date: String,
    pub contributors: Vec<String>,
    pub doi: String,
    pub abstract_html: String,
}

pub(crate) fn extract_meta_fields(html: &str) -> MetaFields {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[name]").expect("static selector");

    let mut fields = MetaFields::default();
    for el in document.select(&selector) {
        let name = el.value().attr("name").unwrap_or_default();
        let content = el.value().attr("content").unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        match name {
            "DC.Title" => fields.title = content.to_string(),
            "DC.Date" => fields.date = content.to_string(),
            // All occurrences, joined by the caller.
            "DC.Contributor" => fields.contributors.push(content.to_string()),
            "citation_doi" => fields.doi = content.to_string(),
            "citation_abstract" => fields.abstract_html = content.to_string(),
            _ => {}
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<meta name="DC.Title" content="Sleep and memory consolidation" />
<meta name="DC.Date" content="2021-03-15" />
<meta name="DC.Contributor" content="Alice Johnson" />
<meta name="DC.Contributor" content="Bob Quux" />
<meta name="citation_doi" content="10.1101/2021.03.15.435" />
<meta name="citation_abstract" content="&lt;p&gt;We studied sleep.&lt;/p&gt;" />
</head><body></body></html>"#;

    #[test]
    fn all_fields_extracted() {
        let fields = extract_meta_fields(PAGE);
        assert_eq!(fields.title, "Sleep and memory consolidation");
        assert_eq!(fields.date, "2021-03-15");
        assert_eq!(fields.contributors, vec!["Alice Johnson", "Bob Quux"]);
        assert_eq!(fields.doi, "10.1101/2021.03.15.435");
        assert!(fields.abstract_html.contains("We studied sleep."));
    }

    #[test]
    fn missing_title_is_empty() {
        let fields = extract_meta_fields("<html><head></head></html>");
        assert!(fields.title.is_empty());
    }

    #[test]
    fn abstract_entities_decoded_by_parser() {
        let fields = extract_meta_fields(PAGE);
        assert_eq!(fields.abstract_html, "<p>We studied sleep.</p>");
    }
}
