//! PubMed/PLOS scraper, delegated to an external helper.
//!
//! The helper receives the URL as its single argument and prints exactly
//! five lines: title, author, date, doi, abstract. Fewer lines means the
//! article is not annotatable.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::{ScrapeError, ScrapeFuture, Scraper};
use crate::metadata::MetadataItem;

pub struct PubMedHelper {
    helper: PathBuf,
}

impl PubMedHelper {
    pub fn new(helper: PathBuf) -> Self {
        Self { helper }
    }
}

impl Scraper for PubMedHelper {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        _client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let child = Command::new(&self.helper)
                .arg(path)
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output();

            let output = tokio::time::timeout(timeout, child)
                .await
                .map_err(|_| ScrapeError::Temporary("pubmed helper timed out".into()))?
                .map_err(|e| ScrapeError::Temporary(format!("pubmed helper: {e}")))?;

            if !output.status.success() {
                return Err(ScrapeError::Temporary(format!(
                    "pubmed helper exited with {}",
                    output.status
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_helper_output(&stdout)
        })
    }
}

pub(crate) fn parse_helper_output(stdout: &str) -> Result<MetadataItem, ScrapeError> {
    let lines: Vec<&str> = stdout.lines().collect();
    if lines.len() < 5 {
        return Err(ScrapeError::Permanent);
    }
    Ok(MetadataItem {
        title: lines[0].trim().to_string(),
        author: lines[1].trim().to_string(),
        date: lines[2].trim().to_string(),
        doi: lines[3].trim().to_string(),
        tags: vec![],
        abstract_html: lines[4..].join("\n").trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_lines_parse() {
        let out = "A Title\nAlice Johnson\n2019-05-01\n10.1371/journal.pone.1\n<p>Abstract.</p>\n";
        let item = parse_helper_output(out).unwrap();
        assert_eq!(item.title, "A Title");
        assert_eq!(item.author, "Alice Johnson");
        assert_eq!(item.date, "2019-05-01");
        assert_eq!(item.doi, "10.1371/journal.pone.1");
        assert_eq!(item.abstract_html, "<p>Abstract.</p>");
    }

    #[test]
    fn fewer_than_five_lines_is_permanent() {
        let err = parse_helper_output("Title\nAuthor\n").unwrap_err();
        assert!(matches!(err, ScrapeError::Permanent));
    }

    #[test]
    fn multiline_abstract_joined() {
        let out = "T\nA\nD\nDOI\n<p>One.</p>\n<p>Two.</p>\n";
        let item = parse_helper_output(out).unwrap();
        assert_eq!(item.abstract_html, "<p>One.</p>\n<p>Two.</p>");
    }
}
