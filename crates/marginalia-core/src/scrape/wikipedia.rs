//! Wikipedia scraper: the REST summary endpoint.
//!
//! Only used when the build runs with `wikipedia_mode = "scraped"`; the
//! default leaves Wikipedia links to the client-side popup script.

use std::sync::Arc;
use std::time::Duration;

use super::{ScrapeError, ScrapeFuture, Scraper, classify_status};
use crate::BuildError;
use crate::invert::ImageCheck;
use crate::metadata::MetadataItem;

pub struct Wikipedia {
    image_check: Arc<ImageCheck>,
}

impl Wikipedia {
    pub fn new(image_check: Arc<ImageCheck>) -> Self {
        Self { image_check }
    }
}

impl Scraper for Wikipedia {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let (host, article) = match split_article(path) {
                Some(parts) => parts,
                None => return Err(ScrapeError::Permanent),
            };
            let url = format!("https://{host}/api/rest_v1/page/summary/{article}");

            let resp = client
                .get(&url)
                .header("User-Agent", super::arxiv::USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(classify_status(resp.status()));
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

            // A disambiguation page means the document links the wrong
            // thing; only a human can pick the intended article.
            if data["type"].as_str() == Some("disambiguation") {
                return Err(ScrapeError::Fatal(BuildError::Disambiguation {
                    url: path.to_string(),
                }));
            }

            let title = data["title"].as_str().unwrap_or("").to_string();
            if title.is_empty() {
                return Err(ScrapeError::Permanent);
            }
            let extract = data["extract_html"].as_str().unwrap_or("").to_string();

            let mut abstract_html = String::new();
            if let Some(thumbnail) = data["thumbnail"]["source"].as_str() {
                let invertible = self
                    .image_check
                    .is_invertible_remote(thumbnail, client)
                    .await
                    .unwrap_or(false);
                abstract_html.push_str(&figure_html(thumbnail, invertible));
            }
            abstract_html.push_str(&extract);

            Ok(MetadataItem {
                title,
                author: "Wikipedia".into(),
                date: String::new(),
                doi: String::new(),
                tags: vec![],
                abstract_html,
            })
        })
    }
}

/// `https://en.wikipedia.org/wiki/Attention_(machine_learning)` →
/// (`en.wikipedia.org`, the encoded article segment).
fn split_article(path: &str) -> Option<(String, String)> {
    let rest = path.split_once("://").map(|(_, r)| r).unwrap_or(path);
    let (host, after) = rest.split_once("/wiki/")?;
    let article = after.split(['#', '?']).next().unwrap_or(after);
    if host.is_empty() || article.is_empty() {
        return None;
    }
    Some((host.to_string(), article.to_string()))
}

pub(crate) fn figure_html(src: &str, invertible: bool) -> String {
    if invertible {
        format!("<figure><img class=\"invertible-auto\" src=\"{src}\" /></figure>\n")
    } else {
        format!("<figure><img src=\"{src}\" /></figure>\n")
    }
}
