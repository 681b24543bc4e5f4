//! Scraper trait, per-source implementations, and the URL dispatcher.
//!
//! The dispatcher is the single boundary where scrape failures are
//! classified: **permanent** failures are cached negatively in the auto
//! file so future builds skip the URL; **temporary** failures (network,
//! timeout, rate limit) are never cached and retry next build.

pub mod arxiv;
pub mod biorxiv;
pub mod crossref;
pub mod pdf;
pub mod pubmed;
pub mod wikipedia;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::BuildError;
use crate::authors::clean_author_list;
use crate::cleaner::clean_abstract_html;
use crate::invert::ImageCheck;
use crate::metadata::MetadataItem;
use crate::rate_limit::SourceLimiters;

/// Scrape failure classification. The taxonomy is the contract: the
/// pipeline caches permanents, retries temporaries, aborts on fatals.
#[derive(Debug)]
pub enum ScrapeError {
    /// Nothing will ever be available; record a negative cache entry.
    Permanent,
    /// Transient (network error, timeout, 429). Retry next build.
    Temporary(String),
    /// Human intervention required; aborts the build.
    Fatal(BuildError),
}

impl std::fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeError::Permanent => write!(f, "permanent failure"),
            ScrapeError::Temporary(reason) => write!(f, "temporary failure: {reason}"),
            ScrapeError::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

pub type ScrapeResult = Result<MetadataItem, ScrapeError>;
pub type ScrapeFuture<'a> = Pin<Box<dyn Future<Output = ScrapeResult> + Send + 'a>>;

/// Anything the pipeline can ask for a missing annotation: the real
/// [`Dispatcher`] in production, a mock in tests.
pub trait AnnotationFetcher: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a str) -> ScrapeFuture<'a>;
}

/// A per-source annotation fetcher.
pub trait Scraper: Send + Sync {
    /// Limiter key and log name ("arxiv", "biorxiv", ...).
    fn name(&self) -> &'static str;

    fn scrape<'a>(
        &'a self,
        path: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> ScrapeFuture<'a>;
}

/// How Wikipedia links are annotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WikipediaMode {
    /// The in-browser popup script fetches summaries itself; the store
    /// never annotates Wikipedia links.
    #[default]
    Client,
    /// Scrape the REST summary endpoint into the store.
    Scraped,
}

/// Routing decision for a canonical path. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Wikipedia,
    Arxiv,
    BioRxiv,
    PubMed,
    LocalPdf,
    /// Never annotatable: cache negatively.
    Permanent,
    /// Handled elsewhere (client-side Wikipedia): do not cache.
    Temporary,
}

const PUBMED_DOMAINS: &[&str] = &[
    "ncbi.nlm.nih.gov/pmc",
    "pmc.ncbi.nlm.nih.gov",
    "journals.plos.org",
    "plosone.org",
    "plosbiology.org",
    "plosmedicine.org",
    "ploscompbiol.org",
    "plosgenetics.org",
    "plospathogens.org",
];

/// Classify a canonical path. Pure; the dispatcher applies it.
pub fn route(path: &str, wikipedia: WikipediaMode) -> Route {
    if path.contains(".wikipedia.org/wiki/") {
        return match wikipedia {
            WikipediaMode::Client => Route::Temporary,
            WikipediaMode::Scraped => Route::Wikipedia,
        };
    }
    if path.contains("arxiv.org/abs/") || path.contains("arxiv.org/pdf/") {
        return Route::Arxiv;
    }
    if path.contains("biorxiv.org/content/") || path.contains("medrxiv.org/content/") {
        return Route::BioRxiv;
    }
    if PUBMED_DOMAINS.iter().any(|d| path.contains(d)) {
        return Route::PubMed;
    }
    if path.is_empty() {
        return Route::Permanent;
    }
    if path.starts_with('/') && crate::metadata::strip_fragment(path).ends_with(".pdf") {
        return Route::LocalPdf;
    }
    // Remaining local paths and self-URLs describe themselves at read time.
    Route::Permanent
}

/// Configuration for the dispatcher and its scrapers.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub site_url: String,
    pub wikipedia_mode: WikipediaMode,
    /// External helper emitting five lines (title, author, date, doi,
    /// abstract) for a PubMed/PLOS URL.
    pub pubmed_helper: PathBuf,
    pub exiftool: PathBuf,
    /// Root that local `/doc/...` paths resolve under.
    pub content_root: PathBuf,
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            wikipedia_mode: WikipediaMode::Client,
            pubmed_helper: PathBuf::from("pubmed-annotation"),
            exiftool: PathBuf::from("exiftool"),
            content_root: PathBuf::from("."),
            timeout: Duration::from_secs(30),
        }
    }
}

/// URL → scraper routing plus failure classification and rate limiting.
pub struct Dispatcher {
    config: ScrapeConfig,
    client: reqwest::Client,
    limiters: Arc<SourceLimiters>,
    arxiv: arxiv::Arxiv,
    biorxiv: biorxiv::BioRxiv,
    pubmed: pubmed::PubMedHelper,
    pdf: pdf::LocalPdf,
    wikipedia: wikipedia::Wikipedia,
}

impl Dispatcher {
    pub fn new(config: ScrapeConfig, limiters: Arc<SourceLimiters>, image_check: Arc<ImageCheck>) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let pubmed = pubmed::PubMedHelper::new(config.pubmed_helper.clone());
        let pdf = pdf::LocalPdf::new(config.exiftool.clone(), config.content_root.clone());
        let wikipedia = wikipedia::Wikipedia::new(image_check);
        Self {
            config,
            client,
            limiters,
            arxiv: arxiv::Arxiv,
            biorxiv: biorxiv::BioRxiv,
            pubmed,
            pdf,
            wikipedia,
        }
    }

    pub fn wikipedia_mode(&self) -> WikipediaMode {
        self.config.wikipedia_mode
    }

    /// Scrape an annotation for a canonical path.
    ///
    /// Applies routing, the per-source rate limiter, and the shared
    /// post-processing (author normalization, abstract cleaning).
    pub async fn fetch(&self, path: &str) -> ScrapeResult {
        let scraper: &dyn Scraper = match route(path, self.config.wikipedia_mode) {
            Route::Permanent => return Err(ScrapeError::Permanent),
            Route::Temporary => {
                return Err(ScrapeError::Temporary(
                    "handled by the client-side popup script".into(),
                ));
            }
            Route::Wikipedia => &self.wikipedia,
            Route::Arxiv => &self.arxiv,
            Route::BioRxiv => &self.biorxiv,
            Route::PubMed => &self.pubmed,
            Route::LocalPdf => &self.pdf,
        };

        self.limiters.acquire(scraper.name()).await;
        let result = scraper
            .scrape(path, &self.client, self.config.timeout)
            .await;

        match result {
            Ok(item) => Ok(postprocess(item)),
            Err(ScrapeError::Temporary(reason)) => {
                // Rate-limit responses land here too: temporary, never
                // cached, retried next build.
                tracing::debug!(source = scraper.name(), path, reason, "temporary scrape failure");
                Err(ScrapeError::Temporary(reason))
            }
            Err(other) => Err(other),
        }
    }
}

impl AnnotationFetcher for Dispatcher {
    fn fetch<'a>(&'a self, path: &'a str) -> ScrapeFuture<'a> {
        Box::pin(self.fetch(path))
    }
}

/// Shared post-processing: every scraper's output passes through the
/// author normalizer and the HTML cleaner.
fn postprocess(mut item: MetadataItem) -> MetadataItem {
    item.author = clean_author_list(&item.author);
    item.abstract_html = clean_abstract_html(&item.abstract_html);
    item.title = item.title.trim().to_string();
    item.date = item.date.trim().to_string();
    item.doi = item.doi.trim().to_string();
    item
}

/// Map an HTTP-level failure to the scrape taxonomy: 403/404 permanent,
/// everything else temporary.
pub(crate) fn classify_status(status: reqwest::StatusCode) -> ScrapeError {
    match status.as_u16() {
        403 | 404 | 410 => ScrapeError::Permanent,
        code => ScrapeError::Temporary(format!("HTTP {code}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wikipedia_routes_by_mode() {
        let url = "https://en.wikipedia.org/wiki/Attention";
        assert_eq!(route(url, WikipediaMode::Client), Route::Temporary);
        assert_eq!(route(url, WikipediaMode::Scraped), Route::Wikipedia);
    }

    #[test]
    fn arxiv_abs_and_pdf_forms() {
        assert_eq!(
            route("https://arxiv.org/abs/1706.03762", WikipediaMode::Client),
            Route::Arxiv
        );
        assert_eq!(
            route("https://arxiv.org/pdf/1706.03762.pdf", WikipediaMode::Client),
            Route::Arxiv
        );
    }

    #[test]
    fn biorxiv_and_medrxiv() {
        assert_eq!(
            route(
                "https://www.biorxiv.org/content/10.1101/2020.01.01.123",
                WikipediaMode::Client
            ),
            Route::BioRxiv
        );
        assert_eq!(
            route(
                "https://www.medrxiv.org/content/10.1101/2021.02.02.456v1",
                WikipediaMode::Client
            ),
            Route::BioRxiv
        );
    }

    #[test]
    fn pubmed_domains() {
        assert_eq!(
            route(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123456/",
                WikipediaMode::Client
            ),
            Route::PubMed
        );
        assert_eq!(
            route(
                "https://journals.plos.org/plosone/article?id=10.1371/journal.pone.0001",
                WikipediaMode::Client
            ),
            Route::PubMed
        );
    }

    #[test]
    fn empty_url_is_permanent() {
        assert_eq!(route("", WikipediaMode::Client), Route::Permanent);
    }

    #[test]
    fn local_pdf_routes_to_pdf_scraper() {
        assert_eq!(
            route("/doc/stats/1975-johnson.pdf", WikipediaMode::Client),
            Route::LocalPdf
        );
        assert_eq!(
            route("/doc/stats/1975-johnson.pdf#page=3", WikipediaMode::Client),
            Route::LocalPdf
        );
    }

    #[test]
    fn other_local_paths_are_permanent() {
        assert_eq!(route("/notes/scaling", WikipediaMode::Client), Route::Permanent);
        assert_eq!(route("?special-def", WikipediaMode::Client), Route::Permanent);
    }

    #[test]
    fn unknown_remote_is_permanent() {
        assert_eq!(
            route("https://blog.example.com/post", WikipediaMode::Client),
            Route::Permanent
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::FORBIDDEN),
            ScrapeError::Permanent
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::NOT_FOUND),
            ScrapeError::Permanent
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ScrapeError::Temporary(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ScrapeError::Temporary(_)
        ));
    }

    #[test]
    fn postprocess_normalizes_fields() {
        let item = MetadataItem {
            title: "  A Title ".into(),
            author: "A.Smith and B.Jones".into(),
            date: "2020-01-01".into(),
            doi: "".into(),
            tags: vec![],
            abstract_html: "<jats:p>n=10</jats:p>".into(),
        };
        let out = postprocess(item);
        assert_eq!(out.title, "A Title");
        assert_eq!(out.author, "A. Smith, B. Jones");
        assert_eq!(out.abstract_html, "<p><em>n</em> = 10</p>");
    }
}
