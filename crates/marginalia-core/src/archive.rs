//! Link archiver: snapshots external URLs into `doc/www/` and keeps the
//! URL → (state, local path) database.
//!
//! Snapshots are addressed by `sha1(url-without-fragment)` under the
//! lower-cased domain. The store is linearizable — one mutex guards the
//! map and every mutation is persisted before the lock drops — and each
//! URL has at most one fetch in flight; a second caller waits and
//! observes the first result.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Error-page bodies that mean the snapshot captured a refusal, not the
/// document.
const ERROR_PAGE_MARKERS: &[&str] = &[
    "403 Forbidden",
    "404 Not Found",
    "Download Limit Exceeded",
    "Access Denied",
    "Instance has been rate limited",
];

/// Substack pages break under headless capture unless scripts are
/// stripped.
const SUBSTACK_MARKER: &str = "substackcdn.com";

/// Hard wall-clock ceiling for a headless snapshot.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(16 * 60);

/// Archival status of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveState {
    /// Never attempted.
    PendingNever,
    /// Attempted and failed transiently; retry after the timestamp ages.
    PendingRetry { last_attempt: u64 },
    Succeeded,
    PermanentFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveRecord {
    url: String,
    state: ArchiveState,
    local_path: String,
}

#[derive(Debug)]
pub enum ArchiveError {
    /// 403/404, failed PDF verification, error-page snapshot.
    Permanent(String),
    /// Network trouble or the per-build cap; retry next build.
    Temporary(String),
    /// `--check` mode: report missing without fetching.
    CheckOnly,
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Permanent(reason) => write!(f, "permanent archive failure: {reason}"),
            ArchiveError::Temporary(reason) => write!(f, "temporary archive failure: {reason}"),
            ArchiveError::CheckOnly => write!(f, "not archived (check mode)"),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────

/// URL → (state, local path), persisted as a JSON list rewritten
/// atomically on every mutation.
pub struct ArchiveStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, (ArchiveState, String)>>,
}

impl ArchiveStore {
    pub fn open(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<Vec<ArchiveRecord>>(&content).ok())
            .map(|records| {
                records
                    .into_iter()
                    .map(|r| (r.url, (r.state, r.local_path)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, url: &str) -> Option<(ArchiveState, String)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(url).cloned()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Record a state and persist before releasing the lock, so every
    /// observed on-disk state is a prefix of the in-memory history.
    pub fn record(&self, url: &str, state: ArchiveState, local_path: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(url.to_string(), (state, local_path.to_string()));
        let mut records: Vec<ArchiveRecord> = entries
            .iter()
            .map(|(url, (state, local_path))| ArchiveRecord {
                url: url.clone(),
                state: state.clone(),
                local_path: local_path.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        if let Err(e) = write_atomic(&self.path, &records) {
            tracing::warn!(error = %e, "archive store persist failed");
        }
    }
}

fn write_atomic(path: &Path, records: &[ArchiveRecord]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let serialized = serde_json::to_string_pretty(records)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(serialized.as_bytes())?;
    tmp.persist(path)?;
    Ok(())
}

// ── Layout ──────────────────────────────────────────────────────────────

/// `https://Example.com/a/b?q=1#frag` → (`example.com`, sha1 hex of the
/// fragmentless URL, the fragment if any).
pub fn snapshot_address(url: &str) -> (String, String, Option<String>) {
    let (base, fragment) = match url.split_once('#') {
        Some((base, frag)) => (base, Some(frag.to_string())),
        None => (url, None),
    };
    let after_scheme = base.split_once("://").map(|(_, r)| r).unwrap_or(base);
    let domain = after_scheme
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase();
    let digest = Sha1::digest(base.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    (domain, hex, fragment)
}

/// Relative snapshot path under the content root, without extension.
fn snapshot_stem(domain: &str, hash: &str) -> String {
    format!("doc/www/{domain}/{hash}")
}

// ── Fetcher trait ───────────────────────────────────────────────────────

pub struct ProbeResult {
    pub status: u16,
    pub content_type: String,
    /// Leading bytes of the body, enough for fingerprint checks.
    pub body_prefix: String,
}

type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Network/browser side of archiving, behind a trait so the archiver is
/// testable without a browser.
pub trait SnapshotFetcher: Send + Sync {
    /// Full GET — never HEAD, some hosts lie on HEAD.
    fn probe<'a>(&'a self, url: &'a str) -> FetchFuture<'a, ProbeResult>;

    /// Bounded-time download of a document to `dest`.
    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> FetchFuture<'a, ()>;

    /// Headless single-file snapshot of a page to `dest`.
    fn snapshot<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        remove_scripts: bool,
    ) -> FetchFuture<'a, ()>;
}

/// Production fetcher: reqwest for probes and downloads, the external
/// `single-file` CLI for page snapshots.
pub struct HttpFetcher {
    client: reqwest::Client,
    single_file: PathBuf,
    download_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(single_file: PathBuf) -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            single_file,
            download_timeout: Duration::from_secs(120),
        }
    }
}

impl SnapshotFetcher for HttpFetcher {
    fn probe<'a>(&'a self, url: &'a str) -> FetchFuture<'a, ProbeResult> {
        Box::pin(async move {
            let resp = self
                .client
                .get(url)
                .header("User-Agent", crate::scrape::arxiv::USER_AGENT)
                .timeout(self.download_timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let body = resp.bytes().await.map_err(|e| e.to_string())?;
            let prefix_len = body.len().min(65536);
            let body_prefix = String::from_utf8_lossy(&body[..prefix_len]).to_string();
            Ok(ProbeResult {
                status,
                content_type,
                body_prefix,
            })
        })
    }

    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> FetchFuture<'a, ()> {
        Box::pin(async move {
            let resp = self
                .client
                .get(url)
                .header("User-Agent", crate::scrape::arxiv::USER_AGENT)
                .timeout(self.download_timeout)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("HTTP {}", resp.status()));
            }
            let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
            std::fs::write(dest, &bytes).map_err(|e| e.to_string())
        })
    }

    fn snapshot<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
        remove_scripts: bool,
    ) -> FetchFuture<'a, ()> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&self.single_file);
            cmd.arg("--compress-CSS=true")
                .arg("--load-deferred-images-max-idle-time=4000")
                .arg("--browser-wait-until=networkIdle");
            if remove_scripts {
                cmd.arg("--remove-scripts=true");
            }
            cmd.arg(url).arg(dest);
            let output = tokio::time::timeout(
                SNAPSHOT_TIMEOUT,
                cmd.stdout(Stdio::null()).stderr(Stdio::piped()).output(),
            )
            .await
            .map_err(|_| "snapshot timed out".to_string())?
            .map_err(|e| e.to_string())?;
            if !output.status.success() {
                return Err(format!(
                    "single-file exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ));
            }
            Ok(())
        })
    }
}

// ── Archiver ────────────────────────────────────────────────────────────

/// Contract: given an external URL, the path of a local snapshot or an
/// error for this URL.
pub struct Archiver {
    store: ArchiveStore,
    fetcher: Box<dyn SnapshotFetcher>,
    /// Content root the `doc/www/` tree lives under.
    root: PathBuf,
    /// `--check` mode: never fetch.
    check_only: bool,
    /// Open snapshot and original for review after a new capture.
    preview: bool,
    /// Per-build cap on new snapshots; `usize::MAX` when unlimited.
    cap: usize,
    new_fetches: AtomicUsize,
    /// One in-flight fetch per URL.
    inflight: DashMap<String, std::sync::Arc<tokio::sync::Mutex<()>>>,
}

impl Archiver {
    pub fn new(
        store: ArchiveStore,
        fetcher: Box<dyn SnapshotFetcher>,
        root: PathBuf,
        check_only: bool,
        preview: bool,
        cap: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            root,
            check_only,
            preview,
            cap,
            new_fetches: AtomicUsize::new(0),
            inflight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Snapshot `url` (or find its existing snapshot) and return the
    /// site-relative path, original fragment re-attached.
    pub async fn archive(&self, url: &str) -> Result<String, ArchiveError> {
        let (domain, hash, fragment) = snapshot_address(url);
        if domain.is_empty() {
            return Err(ArchiveError::Permanent("no domain".into()));
        }
        let base_url = crate::metadata::strip_fragment(url).to_string();

        // One fetch per URL: later callers wait here and then observe
        // the first caller's result via the store/filesystem re-check.
        let gate = self
            .inflight
            .entry(base_url.clone())
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        match self.store.get(&base_url) {
            Some((ArchiveState::Succeeded, local)) if !local.is_empty() => {
                return Ok(attach_fragment(&local, &fragment));
            }
            Some((ArchiveState::PermanentFailure, _)) => {
                return Err(ArchiveError::Permanent("recorded failure".into()));
            }
            _ => {}
        }

        // A file already in place short-circuits the fetch.
        let stem = snapshot_stem(&domain, &hash);
        for ext in ["html", "pdf"] {
            let rel = format!("{stem}.{ext}");
            if self.root.join(&rel).exists() {
                let local = format!("/{rel}");
                self.store.record(&base_url, ArchiveState::Succeeded, &local);
                return Ok(attach_fragment(&local, &fragment));
            }
        }

        if self.check_only {
            return Err(ArchiveError::CheckOnly);
        }
        if self.new_fetches.load(Ordering::SeqCst) >= self.cap {
            self.retry_later(&base_url);
            return Err(ArchiveError::Temporary("per-build archive cap reached".into()));
        }
        self.new_fetches.fetch_add(1, Ordering::SeqCst);

        // arXiv asks crawlers to use the export host.
        let fetch_url = base_url.replace("://arxiv.org/", "://export.arxiv.org/");

        let probe = match self.fetcher.probe(&fetch_url).await {
            Ok(probe) => probe,
            Err(reason) => {
                self.retry_later(&base_url);
                return Err(ArchiveError::Temporary(reason));
            }
        };
        match probe.status {
            403 | 404 => {
                self.store
                    .record(&base_url, ArchiveState::PermanentFailure, "");
                return Err(ArchiveError::Permanent(format!("HTTP {}", probe.status)));
            }
            code if code >= 400 => {
                self.retry_later(&base_url);
                return Err(ArchiveError::Temporary(format!("HTTP {code}")));
            }
            _ => {}
        }

        let is_pdf = probe.content_type.contains("application/pdf")
            || crate::metadata::strip_fragment(&base_url).ends_with(".pdf");

        let rel = if is_pdf {
            self.archive_pdf(&base_url, &fetch_url, &stem).await?
        } else {
            self.archive_page(&base_url, &fetch_url, &stem, &probe.body_prefix)
                .await?
        };

        let local = format!("/{rel}");
        self.store.record(&base_url, ArchiveState::Succeeded, &local);
        tracing::info!(url = %base_url, local = %local, "archived");
        if self.preview {
            self.open_preview(&self.root.join(&rel), &base_url);
        }
        Ok(attach_fragment(&local, &fragment))
    }

    async fn archive_pdf(
        &self,
        base_url: &str,
        fetch_url: &str,
        stem: &str,
    ) -> Result<String, ArchiveError> {
        let rel = format!("{stem}.pdf");
        let dest = self.root.join(&rel);
        if let Some(parent) = dest.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = dest.with_extension("pdf.tmp");
        if let Err(reason) = self.fetcher.download(fetch_url, &tmp).await {
            let _ = std::fs::remove_file(&tmp);
            self.retry_later(base_url);
            return Err(ArchiveError::Temporary(reason));
        }
        // The server may have sent an HTML error page with a PDF label.
        let magic_ok = std::fs::read(&tmp)
            .map(|bytes| bytes.starts_with(b"%PDF"))
            .unwrap_or(false);
        if !magic_ok {
            let _ = std::fs::remove_file(&tmp);
            self.store
                .record(base_url, ArchiveState::PermanentFailure, "");
            return Err(ArchiveError::Permanent("downloaded file is not a PDF".into()));
        }
        std::fs::rename(&tmp, &dest)
            .map_err(|e| ArchiveError::Temporary(format!("rename: {e}")))?;
        tracing::info!(path = %dest.display(), "PDF archived; queued for post-compression");
        Ok(rel)
    }

    async fn archive_page(
        &self,
        base_url: &str,
        fetch_url: &str,
        stem: &str,
        body_prefix: &str,
    ) -> Result<String, ArchiveError> {
        let rel = format!("{stem}.html");
        let dest = self.root.join(&rel);
        if let Some(parent) = dest.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let remove_scripts = body_prefix.contains(SUBSTACK_MARKER);
        if let Err(reason) = self
            .fetcher
            .snapshot(fetch_url, &dest, remove_scripts)
            .await
        {
            let _ = std::fs::remove_file(&dest);
            self.retry_later(base_url);
            return Err(ArchiveError::Temporary(reason));
        }
        // Snapshots of refusal pages are worse than nothing.
        let content = std::fs::read_to_string(&dest).unwrap_or_default();
        if let Some(marker) = ERROR_PAGE_MARKERS.iter().find(|m| content.contains(**m)) {
            let _ = std::fs::remove_file(&dest);
            self.store
                .record(base_url, ArchiveState::PermanentFailure, "");
            return Err(ArchiveError::Permanent(format!("snapshot is an error page: {marker}")));
        }
        Ok(rel)
    }

    fn retry_later(&self, base_url: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.store
            .record(base_url, ArchiveState::PendingRetry { last_attempt: now }, "");
    }

    fn open_preview(&self, snapshot: &Path, original: &str) {
        tracing::warn!(
            snapshot = %snapshot.display(),
            original,
            "opening snapshot beside original for review"
        );
        for target in [snapshot.display().to_string(), original.to_string()] {
            let _ = std::process::Command::new("xdg-open")
                .arg(target)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
        }
    }
}

fn attach_fragment(local: &str, fragment: &Option<String>) -> String {
    match fragment {
        Some(frag) => format!("{local}#{frag}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct MockFetcher {
        probes: AtomicUsize,
        snapshots: AtomicUsize,
        status: u16,
        content_type: &'static str,
        payload: &'static [u8],
    }

    impl MockFetcher {
        fn html(payload: &'static [u8]) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                snapshots: AtomicUsize::new(0),
                status: 200,
                content_type: "text/html",
                payload,
            }
        }

        fn pdf(payload: &'static [u8]) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                snapshots: AtomicUsize::new(0),
                status: 200,
                content_type: "application/pdf",
                payload,
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                snapshots: AtomicUsize::new(0),
                status,
                content_type: "text/html",
                payload: b"",
            }
        }
    }

    impl SnapshotFetcher for MockFetcher {
        fn probe<'a>(&'a self, _url: &'a str) -> FetchFuture<'a, ProbeResult> {
            Box::pin(async move {
                self.probes.fetch_add(1, Ordering::SeqCst);
                Ok(ProbeResult {
                    status: self.status,
                    content_type: self.content_type.to_string(),
                    body_prefix: String::from_utf8_lossy(self.payload).to_string(),
                })
            })
        }

        fn download<'a>(&'a self, _url: &'a str, dest: &'a Path) -> FetchFuture<'a, ()> {
            Box::pin(async move {
                std::fs::write(dest, self.payload).map_err(|e| e.to_string())
            })
        }

        fn snapshot<'a>(
            &'a self,
            _url: &'a str,
            dest: &'a Path,
            _remove_scripts: bool,
        ) -> FetchFuture<'a, ()> {
            Box::pin(async move {
                self.snapshots.fetch_add(1, Ordering::SeqCst);
                std::fs::write(dest, self.payload).map_err(|e| e.to_string())
            })
        }
    }

    fn archiver(dir: &TempDir, fetcher: MockFetcher) -> Archiver {
        let store = ArchiveStore::open(&dir.path().join("archive.json"));
        Archiver::new(
            store,
            Box::new(fetcher),
            dir.path().to_path_buf(),
            false,
            false,
            usize::MAX,
        )
    }

    #[test]
    fn address_layout() {
        let (domain, hash, fragment) = snapshot_address("https://Example.com/a/b#sec");
        assert_eq!(domain, "example.com");
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fragment.as_deref(), Some("sec"));
    }

    #[test]
    fn fragment_excluded_from_hash() {
        let (_, with_frag, _) = snapshot_address("https://example.com/a#one");
        let (_, without, _) = snapshot_address("https://example.com/a");
        assert_eq!(with_frag, without);
    }

    #[tokio::test]
    async fn miss_then_hit_does_not_refetch() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::html(b"<html>fine</html>"));

        let first = archiver.archive("https://example.com/a").await.unwrap();
        let second = archiver.archive("https://example.com/a").await.unwrap();
        assert_eq!(first, second);

        // The store remembers success, so the probe ran exactly once.
        assert!(matches!(
            archiver.store.get("https://example.com/a"),
            Some((ArchiveState::Succeeded, _))
        ));
        assert_eq!(archiver.new_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pdf_magic_verified() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::pdf(b"%PDF-1.5 body"));
        let path = archiver
            .archive("https://example.com/paper.pdf")
            .await
            .unwrap();
        assert!(path.ends_with(".pdf"), "{path}");
        assert!(dir.path().join(path.trim_start_matches('/')).exists());
    }

    #[tokio::test]
    async fn fake_pdf_is_permanent_failure() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::pdf(b"<html>not a pdf</html>"));
        let err = archiver
            .archive("https://example.com/paper.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Permanent(_)), "{err}");
        assert!(matches!(
            archiver.store.get("https://example.com/paper.pdf"),
            Some((ArchiveState::PermanentFailure, _))
        ));
    }

    #[tokio::test]
    async fn http_403_is_permanent() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::failing(403));
        let err = archiver.archive("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Permanent(_)));
    }

    #[tokio::test]
    async fn http_500_is_temporary_with_retry_state() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::failing(500));
        let err = archiver.archive("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Temporary(_)));
        assert!(matches!(
            archiver.store.get("https://example.com/x"),
            Some((ArchiveState::PendingRetry { .. }, _))
        ));
    }

    #[tokio::test]
    async fn error_page_snapshot_deleted_and_failed() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::html(b"<html>403 Forbidden</html>"));
        let err = archiver.archive("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Permanent(_)), "{err}");
        // Nothing left under doc/www
        let (domain, hash, _) = snapshot_address("https://example.com/x");
        assert!(!dir
            .path()
            .join(format!("doc/www/{domain}/{hash}.html"))
            .exists());
    }

    #[tokio::test]
    async fn check_mode_reports_without_fetching() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(&dir.path().join("archive.json"));
        let archiver = Archiver::new(
            store,
            Box::new(MockFetcher::html(b"x")),
            dir.path().to_path_buf(),
            true,
            false,
            usize::MAX,
        );
        let err = archiver.archive("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, ArchiveError::CheckOnly));
        assert_eq!(archiver.new_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn build_cap_limits_new_archives() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(&dir.path().join("archive.json"));
        let archiver = Archiver::new(
            store,
            Box::new(MockFetcher::html(b"<html>ok</html>")),
            dir.path().to_path_buf(),
            false,
            false,
            1,
        );
        archiver.archive("https://example.com/a").await.unwrap();
        let err = archiver.archive("https://example.com/b").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Temporary(_)));
    }

    #[tokio::test]
    async fn fragment_preserved_on_returned_path() {
        let dir = TempDir::new().unwrap();
        let archiver = archiver(&dir, MockFetcher::html(b"<html>ok</html>"));
        let path = archiver
            .archive("https://example.com/a#part-3")
            .await
            .unwrap();
        assert!(path.ends_with("#part-3"), "{path}");
    }

    #[tokio::test]
    async fn concurrent_calls_fetch_once() {
        let dir = TempDir::new().unwrap();
        let archiver = Arc::new(archiver(&dir, MockFetcher::html(b"<html>ok</html>")));
        let a = archiver.clone();
        let b = archiver.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.archive("https://example.com/a").await.unwrap() }),
            tokio::spawn(async move { b.archive("https://example.com/a").await.unwrap() }),
        );
        assert_eq!(ra.unwrap(), rb.unwrap());
        assert_eq!(archiver.new_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_file_short_circuits() {
        let dir = TempDir::new().unwrap();
        let (domain, hash, _) = snapshot_address("https://example.com/pre");
        let rel = format!("doc/www/{domain}/{hash}.html");
        let full = dir.path().join(&rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, "<html>already here</html>").unwrap();

        let archiver = archiver(&dir, MockFetcher::failing(500));
        let path = archiver.archive("https://example.com/pre").await.unwrap();
        assert_eq!(path, format!("/{rel}"));
        assert_eq!(archiver.new_fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn store_round_trips_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.json");
        {
            let store = ArchiveStore::open(&path);
            store.record("https://a", ArchiveState::Succeeded, "/doc/www/a/abc.html");
            store.record(
                "https://b",
                ArchiveState::PendingRetry { last_attempt: 123 },
                "",
            );
        }
        let store = ArchiveStore::open(&path);
        assert_eq!(store.len(), 2);
        assert!(matches!(
            store.get("https://a"),
            Some((ArchiveState::Succeeded, ref local)) if local == "/doc/www/a/abc.html"
        ));
        assert!(matches!(
            store.get("https://b"),
            Some((ArchiveState::PendingRetry { last_attempt: 123 }, _))
        ));
    }
}
