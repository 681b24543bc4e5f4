//! Annotation store: in-memory map plus the two on-disk YAML backings.
//!
//! The curated file is hand-edited and authoritative; it must pass the
//! strict invariants or the build aborts. The auto file is an append-only
//! log of scraper output, compacted on load (last write wins) and unioned
//! under the curated entries.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::BuildError;

/// Minimum abstract length (chars) for an annotation to be worth a popup.
/// Anything shorter is left to the plain link tooltip.
pub const MIN_ABSTRACT_LEN: usize = 180;

/// One annotation record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataItem {
    pub title: String,
    pub author: String,
    /// ISO `YYYY-MM-DD` (or a prefix of it), or empty.
    pub date: String,
    pub doi: String,
    /// Slash-separated tag paths, in order.
    pub tags: Vec<String>,
    pub abstract_html: String,
}

impl MetadataItem {
    /// A negative cache entry: scraping was attempted, nothing is available.
    pub fn negative() -> Self {
        Self::default()
    }

    pub fn is_negative(&self) -> bool {
        self.title.is_empty() && self.author.is_empty() && self.abstract_html.is_empty()
    }

    /// Whether the annotation is substantial enough to drive a popup.
    pub fn has_usable_abstract(&self) -> bool {
        self.abstract_html.chars().count() >= MIN_ABSTRACT_LEN
    }
}

// ── Path canonicalization ───────────────────────────────────────────────

/// Canonicalize a link target against the site's own URL.
///
/// The site's absolute prefix collapses to a leading `/`; a leading `./`
/// is dropped. The fragment is kept — it is part of the path for display.
/// Idempotent.
pub fn canonicalize(site_url: &str, path: &str) -> String {
    let mut p = path.trim().to_string();
    if !site_url.is_empty() {
        if let Some(rest) = p.strip_prefix(site_url) {
            p = if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            };
        }
    }
    if let Some(rest) = p.strip_prefix("./") {
        p = format!("/{rest}");
    }
    p
}

/// Drop the `#fragment` part for hashing and map lookup.
pub fn strip_fragment(path: &str) -> &str {
    match path.split_once('#') {
        Some((base, _)) => base,
        None => path,
    }
}

/// Derive tag paths from a local document path: the directory components
/// between the leading content directory and the filename.
pub fn tags_from_path(path: &str) -> Vec<String> {
    let path = strip_fragment(path);
    let trimmed = path
        .strip_prefix("/doc/")
        .or_else(|| path.strip_prefix("/"))
        .unwrap_or(path);
    let mut parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() <= 1 {
        return vec![];
    }
    parts.pop(); // filename
    vec![parts.join("/")]
}

// ── YAML record format ──────────────────────────────────────────────────

/// Six-element record shape shared by the curated and auto files:
/// `[url, title, author, date, doi, abstract]`.
type Record = Vec<String>;

fn record_to_item(rec: &Record) -> MetadataItem {
    MetadataItem {
        title: rec[1].clone(),
        author: rec[2].clone(),
        date: rec[3].clone(),
        doi: rec[4].clone(),
        tags: if rec[0].starts_with('/') {
            tags_from_path(&rec[0])
        } else {
            vec![]
        },
        abstract_html: rec[5].clone(),
    }
}

fn item_to_record(url: &str, item: &MetadataItem) -> Record {
    vec![
        url.to_string(),
        item.title.clone(),
        item.author.clone(),
        item.date.clone(),
        item.doi.clone(),
        item.abstract_html.clone(),
    ]
}

fn parse_records(path: &Path, content: &str) -> Result<Vec<Record>, BuildError> {
    if content.trim().is_empty() {
        return Ok(vec![]);
    }
    let records: Vec<Record> =
        serde_yaml::from_str(content).map_err(|e| BuildError::Yaml {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    for rec in &records {
        if rec.len() != 6 {
            return Err(BuildError::Yaml {
                path: path.display().to_string(),
                message: format!(
                    "record for {:?} has {} fields, expected 6",
                    rec.first().map(String::as_str).unwrap_or(""),
                    rec.len()
                ),
            });
        }
    }
    Ok(records)
}

// ── Invariants ──────────────────────────────────────────────────────────

/// Strict checks on the curated file. Any breach is fatal and names the
/// offending record so a human can fix the file.
fn check_curated_invariants(records: &[Record]) -> Result<(), BuildError> {
    let mut urls: HashMap<&str, ()> = HashMap::new();
    let mut titles: HashMap<&str, &str> = HashMap::new();
    let mut abstracts: HashMap<&str, &str> = HashMap::new();

    for rec in records {
        let (url, title, author, abstract_html) = (&rec[0], &rec[1], &rec[2], &rec[5]);

        for (field, value) in [
            ("url", url),
            ("title", title),
            ("author", author),
            ("abstract", abstract_html),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::EmptyMandatoryField {
                    url: url.clone(),
                    field,
                });
            }
        }

        if !(url.starts_with('h') || url.starts_with('/') || url.starts_with('?')) {
            return Err(BuildError::MalformedUrl {
                url: url.clone(),
                reason: "must start with 'h', '/', or '?'".into(),
            });
        }
        if url.chars().any(char::is_whitespace) {
            return Err(BuildError::MalformedUrl {
                url: url.clone(),
                reason: "contains whitespace".into(),
            });
        }

        if urls.insert(url.as_str(), ()).is_some() {
            return Err(BuildError::DuplicateUrl { url: url.clone() });
        }
        if let Some(first) = titles.insert(title.as_str(), url.as_str()) {
            return Err(BuildError::DuplicateTitle {
                title: title.clone(),
                urls: format!("{first}, {url}"),
            });
        }
        if let Some(first) = abstracts.insert(abstract_html.as_str(), url.as_str()) {
            return Err(BuildError::DuplicateAbstract {
                urls: format!("{first}, {url}"),
            });
        }
    }
    Ok(())
}

// ── Store ───────────────────────────────────────────────────────────────

/// In-memory annotation map with its disk backings.
///
/// Constructed once per build. During a build the curated file is
/// read-only and only [`append_auto`](MetadataStore::append_auto) writes,
/// serialized through an internal mutex.
#[derive(Debug)]
pub struct MetadataStore {
    site_url: String,
    auto_path: PathBuf,
    map: HashMap<String, MetadataItem>,
}

impl MetadataStore {
    /// Load, check, and compact both backings.
    ///
    /// The curated file is required; a missing auto file is treated as
    /// empty. The auto file is compacted in place: re-read, deduplicated
    /// last-write-wins, rewritten.
    pub fn load(site_url: &str, curated_path: &Path, auto_path: &Path) -> Result<Self, BuildError> {
        let curated_content =
            fs::read_to_string(curated_path).map_err(|e| BuildError::Yaml {
                path: curated_path.display().to_string(),
                message: format!("curated metadata is required: {e}"),
            })?;
        let curated = parse_records(curated_path, &curated_content)?;
        check_curated_invariants(&curated)?;

        let auto_content = fs::read_to_string(auto_path).unwrap_or_default();
        let auto = parse_records(auto_path, &auto_content)?;
        let auto = compact(auto);
        write_records_atomic(auto_path, &auto)?;
        tracing::debug!(
            curated = curated.len(),
            auto = auto.len(),
            "metadata loaded"
        );

        // Left-biased union: curated wins.
        let mut map = HashMap::new();
        for rec in &auto {
            map.insert(rec[0].clone(), record_to_item(rec));
        }
        for rec in &curated {
            map.insert(rec[0].clone(), record_to_item(rec));
        }

        Ok(Self {
            site_url: site_url.to_string(),
            auto_path: auto_path.to_path_buf(),
            map,
        })
    }

    /// An empty store (tests, fragment rendering without a corpus).
    pub fn empty(site_url: &str, auto_path: &Path) -> Self {
        Self {
            site_url: site_url.to_string(),
            auto_path: auto_path.to_path_buf(),
            map: HashMap::new(),
        }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Canonicalize, strip the fragment, and look up.
    pub fn lookup(&self, path: &str) -> Option<&MetadataItem> {
        let canonical = canonicalize(&self.site_url, path);
        self.map.get(strip_fragment(&canonical))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Iterate (path, item) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataItem)> {
        self.map.iter()
    }

    /// In-memory-only insert: no auto-file write. For tests and for
    /// assembling synthetic stores (fragment previews).
    pub fn insert_memory(&mut self, path: &str, item: MetadataItem) {
        let canonical = canonicalize(&self.site_url, path);
        let key = strip_fragment(&canonical).to_string();
        self.map.entry(key).or_insert(item);
    }

    /// Append one record to the auto file and refresh the in-memory map.
    ///
    /// Single-writer: callers synchronize externally (the pipeline holds
    /// the store behind one mutex during the scrape phase). Curated
    /// entries are never overwritten.
    pub fn append_auto(&mut self, path: &str, item: &MetadataItem) -> Result<(), BuildError> {
        let canonical = canonicalize(&self.site_url, path);
        let key = strip_fragment(&canonical).to_string();
        let chunk = serde_yaml::to_string(&vec![item_to_record(&key, item)]).map_err(|e| {
            BuildError::Yaml {
                path: self.auto_path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        let mut existing = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.auto_path)?;
        use std::io::Write;
        existing.write_all(chunk.as_bytes())?;
        self.map.entry(key).or_insert_with(|| item.clone());
        Ok(())
    }

    /// One level of recursive inlining: each abstract is parsed, decorated
    /// by `decorate` against this very store, and re-serialized.
    ///
    /// One level is a fixed-point approximation — popups load further
    /// popups lazily, so deeper materialization never pays for itself.
    pub fn recurse_inline(
        &mut self,
        decorate: impl Fn(&MetadataStore, &str) -> String,
    ) -> usize {
        let work: Vec<(String, String)> = self
            .map
            .iter()
            .filter(|(_, item)| !item.abstract_html.is_empty())
            .map(|(path, item)| (path.clone(), item.abstract_html.clone()))
            .collect();

        let mut changed = 0;
        for (path, abstract_html) in work {
            let inlined = decorate(self, &abstract_html);
            if inlined != abstract_html {
                if let Some(item) = self.map.get_mut(&path) {
                    item.abstract_html = inlined;
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Last-write-wins dedupe preserving first-occurrence order.
fn compact(records: Vec<Record>) -> Vec<Record> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, Record> = HashMap::new();
    for rec in records {
        let url = rec[0].clone();
        if !latest.contains_key(&url) {
            order.push(url.clone());
        }
        latest.insert(url, rec);
    }
    order
        .into_iter()
        .filter_map(|url| latest.remove(&url))
        .collect()
}

/// Rewrite a records file atomically: temp file in the same directory,
/// then rename over the target.
fn write_records_atomic(path: &Path, records: &[Record]) -> Result<(), BuildError> {
    let serialized = if records.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(records).map_err(|e| BuildError::Yaml {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(serialized.as_bytes())?;
    tmp.persist(path).map_err(|e| BuildError::Io(e.error))?;
    Ok(())
}
