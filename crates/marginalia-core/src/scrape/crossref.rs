//! Crossref DOI → abstract lookup, shared by the PDF scraper.

use std::time::Duration;

use super::ScrapeError;

/// Fetch the abstract registered for a DOI, if any.
///
/// `Ok(None)` means Crossref answered but has no abstract for the work;
/// errors carry the usual permanent/temporary classification.
pub async fn doi_abstract(
    doi: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<Option<String>, ScrapeError> {
    if doi.is_empty() {
        return Ok(None);
    }
    let url = format!("https://api.crossref.org/works/{}", urlencoding::encode(doi));
    let resp = client
        .get(&url)
        .header("User-Agent", super::arxiv::USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ScrapeError::Temporary(e.to_string()))?;

    // Crossref answers unknown DOIs with a plain-text body, not JSON.
    if body.trim() == "Resource not found." {
        return Ok(None);
    }
    if status.as_u16() == 429 {
        return Err(ScrapeError::Temporary("HTTP 429".into()));
    }
    if !status.is_success() {
        return Err(super::classify_status(status));
    }

    let data: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| ScrapeError::Temporary(e.to_string()))?;
    Ok(data["message"]["abstract"]
        .as_str()
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty()))
}
