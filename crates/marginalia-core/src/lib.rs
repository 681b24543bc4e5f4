//! Core of the marginalia site generator: the annotation store, the
//! scraper dispatcher, the link archiver, and the typed-AST rewrite
//! pipeline that decorates every document with annotation metadata.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod archive;
pub mod ast;
pub mod authors;
pub mod cleaner;
pub mod config_file;
pub mod fragment;
pub mod html;
pub mod ident;
pub mod invert;
pub mod metadata;
pub mod passes;
pub mod pipeline;
pub mod rate_limit;
pub mod scrape;

pub use cleaner::clean_abstract_html;
pub use ident::generate_id;
pub use metadata::{MetadataItem, MetadataStore};
pub use pipeline::{BuildReport, run_build};
pub use rate_limit::SourceLimiters;
pub use scrape::{Dispatcher, ScrapeError, WikipediaMode};

/// Fatal build failures. Each names the offending record so the author
/// can fix the corpus; the driver aborts on any of these.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("duplicate url in curated metadata: {url}")]
    DuplicateUrl { url: String },
    #[error("duplicate title in curated metadata: {title:?} (urls: {urls})")]
    DuplicateTitle { title: String, urls: String },
    #[error("duplicate abstract in curated metadata (urls: {urls})")]
    DuplicateAbstract { urls: String },
    #[error("empty mandatory field `{field}` in curated metadata record for {url:?}")]
    EmptyMandatoryField { url: String, field: &'static str },
    #[error("malformed url in curated metadata: {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },
    #[error("header id {id:?} contains a forbidden character ('.', '#', or ':')")]
    ForbiddenHeaderId { id: String },
    #[error("header {original:?} produces an empty id; give it an explicit one")]
    EmptyHeaderId { original: String },
    #[error("malformed footnote anchor {text:?}: short spaceless text inside a note")]
    MalformedFootnote { text: String },
    #[error("wikipedia disambiguation page linked: {url}; link the specific article")]
    Disambiguation { url: String },
    #[error("yaml error in {path}: {message}")]
    Yaml { path: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Progress events emitted by the pipeline driver.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseStarted {
        phase: &'static str,
    },
    DocumentLoaded {
        source: String,
        index: usize,
        total: usize,
    },
    AnnotationScraped {
        path: String,
        outcome: ScrapeOutcome,
    },
    Archived {
        url: String,
        local_path: Option<String>,
    },
    DocumentRewritten {
        source: String,
    },
    FragmentWritten {
        path: String,
    },
    Warning {
        message: String,
    },
}

/// Condensed scrape result for progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Found,
    Permanent,
    Temporary,
}

/// Configuration for one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// The site's absolute URL prefix, stripped during canonicalization.
    pub site_url: String,
    /// Root the local content tree (`/doc/...`, `/images/...`) lives under.
    pub content_root: PathBuf,
    /// Directory of source documents (HTML).
    pub source_dir: PathBuf,
    /// Directory the decorated site is emitted into.
    pub output_dir: PathBuf,
    pub curated_path: PathBuf,
    pub auto_path: PathBuf,
    pub archive_store_path: PathBuf,
    /// Persistent invertibility cache; memory-only when unset.
    pub invert_cache_path: Option<PathBuf>,
    pub num_workers: usize,
    /// Cap on new snapshots per build.
    pub archive_cap: usize,
    /// `--check`: report missing archives without fetching.
    pub check_only: bool,
    pub no_preview: bool,
    pub wikipedia_mode: WikipediaMode,
    pub pubmed_helper: PathBuf,
    pub exiftool: PathBuf,
    pub single_file: PathBuf,
    pub imagemagick: PathBuf,
    pub scrape_timeout: Duration,
    /// Auto-linker phrase table.
    pub phrases: Vec<(String, String)>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            content_root: PathBuf::from("."),
            source_dir: PathBuf::from("src-html"),
            output_dir: PathBuf::from("_site"),
            curated_path: PathBuf::from("metadata/curated.yaml"),
            auto_path: PathBuf::from("metadata/auto.yaml"),
            archive_store_path: PathBuf::from("metadata/archive.json"),
            invert_cache_path: None,
            num_workers: 4,
            archive_cap: 100,
            check_only: false,
            no_preview: true,
            wikipedia_mode: WikipediaMode::Client,
            pubmed_helper: PathBuf::from("pubmed-annotation"),
            exiftool: PathBuf::from("exiftool"),
            single_file: PathBuf::from("single-file"),
            imagemagick: PathBuf::from("convert"),
            scrape_timeout: Duration::from_secs(30),
            phrases: vec![],
        }
    }
}
