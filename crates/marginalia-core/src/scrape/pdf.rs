//! Local-PDF scraper: embedded metadata via `exiftool`, then a Crossref
//! abstract lookup when the PDF carries a DOI.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::process::Command;

use super::{ScrapeError, ScrapeFuture, Scraper, crossref};
use crate::metadata::MetadataItem;

/// PDF-producing software that shows up in the Author field; seeing one
/// of these means the Creator field is the real author line.
static SOFTWARE_AUTHORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Adobe", "Acrobat", "InDesign", "LaTeX", "TeX", "pdfTeX", "XeTeX", "LuaTeX",
        "Microsoft", "Word", "PScript", "Ghostscript", "ABBYY", "FineReader", "OCR",
        "Tesseract", "Scanner", "Print", "Quartz", "Pages", "LibreOffice",
    ]
});

pub struct LocalPdf {
    exiftool: PathBuf,
    content_root: PathBuf,
}

impl LocalPdf {
    pub fn new(exiftool: PathBuf, content_root: PathBuf) -> Self {
        Self {
            exiftool,
            content_root,
        }
    }
}

impl Scraper for LocalPdf {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a> {
        Box::pin(async move {
            let local = crate::metadata::strip_fragment(path);
            let file = self.content_root.join(local.trim_start_matches('/'));
            if !file.exists() {
                return Err(ScrapeError::Permanent);
            }

            let child = Command::new(&self.exiftool)
                .arg("-j")
                .arg("-Title")
                .arg("-Author")
                .arg("-CreateDate")
                .arg("-DOI")
                .arg("-Creator")
                .arg(&file)
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output();

            let output = tokio::time::timeout(timeout, child)
                .await
                .map_err(|_| ScrapeError::Temporary("exiftool timed out".into()))?
                .map_err(|e| ScrapeError::Temporary(format!("exiftool: {e}")))?;

            if !output.status.success() {
                return Err(ScrapeError::Permanent);
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let mut item = parse_exiftool_json(&stdout)?;

            // DOI in the PDF metadata buys us an abstract from Crossref.
            if !item.doi.is_empty() {
                match crossref::doi_abstract(&item.doi, client, timeout).await {
                    Ok(Some(abstract_html)) => item.abstract_html = abstract_html,
                    Ok(None) => {}
                    Err(ScrapeError::Temporary(reason)) => {
                        tracing::debug!(doi = %item.doi, reason, "crossref abstract unavailable");
                    }
                    Err(_) => {}
                }
            }

            if item.title.is_empty() && item.author.is_empty() {
                return Err(ScrapeError::Permanent);
            }
            Ok(item)
        })
    }
}

pub(crate) fn parse_exiftool_json(stdout: &str) -> Result<MetadataItem, ScrapeError> {
    let parsed: serde_json::Value =
        serde_json::from_str(stdout).map_err(|_| ScrapeError::Permanent)?;
    let first = parsed
        .as_array()
        .and_then(|a| a.first())
        .ok_or(ScrapeError::Permanent)?;

    let get = |key: &str| first[key].as_str().unwrap_or("").trim().to_string();

    let title = get("Title");
    let exif_author = get("Author");
    let creator = get("Creator");
    let doi = get("DOI");
    let date = normalize_exif_date(&get("CreateDate"));

    let author = choose_author(&exif_author, &creator);

    Ok(MetadataItem {
        title,
        author,
        date,
        doi,
        tags: vec![],
        abstract_html: String::new(),
    })
}

/// The Author field of a PDF is routinely the converting software, not a
/// person. Prefer Creator when it is longer or when Author names a tool.
pub(crate) fn choose_author(author: &str, creator: &str) -> String {
    let author_is_software = SOFTWARE_AUTHORS
        .iter()
        .any(|software| author.contains(software));
    if !creator.is_empty() && (creator.len() > author.len() || author_is_software) {
        let creator_is_software = SOFTWARE_AUTHORS
            .iter()
            .any(|software| creator.contains(software));
        if !creator_is_software {
            if author_is_software {
                tracing::warn!(author, creator, "PDF Author looks like software; using Creator");
            }
            return creator.to_string();
        }
    }
    if author_is_software {
        return String::new();
    }
    author.to_string()
}

/// exiftool dates come out as `2020:01:15 10:22:33+01:00`.
fn normalize_exif_date(date: &str) -> String {
    let day = date.split_whitespace().next().unwrap_or("");
    day.replace(':', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exiftool_json_parsed() {
        let json = r#"[{"Title":"Peer review study","Author":"Alice Johnson","CreateDate":"1975:03:01 12:00:00","DOI":"10.1/x","Creator":"pdfTeX-1.40"}]"#;
        let item = parse_exiftool_json(json).unwrap();
        assert_eq!(item.title, "Peer review study");
        assert_eq!(item.author, "Alice Johnson");
        assert_eq!(item.date, "1975-03-01");
        assert_eq!(item.doi, "10.1/x");
    }

    #[test]
    fn software_author_defers_to_creator() {
        assert_eq!(choose_author("Adobe Acrobat 9.0", "Alice Johnson"), "Alice Johnson");
    }

    #[test]
    fn longer_creator_wins() {
        assert_eq!(
            choose_author("A.J.", "Alice Johnson, Bob Quux"),
            "Alice Johnson, Bob Quux"
        );
    }

    #[test]
    fn software_creator_never_chosen() {
        assert_eq!(choose_author("Alice Johnson", "Microsoft Word 2010"), "Alice Johnson");
        assert_eq!(choose_author("ABBYY FineReader", "Adobe InDesign"), "");
    }

    #[test]
    fn exif_date_normalized() {
        assert_eq!(normalize_exif_date("2020:01:15 10:22:33+01:00"), "2020-01-15");
        assert_eq!(normalize_exif_date(""), "");
    }

    #[test]
    fn malformed_json_is_permanent() {
        assert!(matches!(
            parse_exiftool_json("not json").unwrap_err(),
            ScrapeError::Permanent
        ));
    }
}
