//! Near-monochrome image detection for dark mode.
//!
//! An image whose mean HSL lightness falls below the threshold gets the
//! `invertible-auto` class so CSS can invert it in dark mode. The
//! decision is expensive (a shell-out per image, a download for remote
//! URLs), so it is memoized in a two-tier cache — a [`DashMap`] in front
//! of an optional SQLite table — keyed by path and mtime, with mtime
//! mismatch as the invalidation rule.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::{Connection, params};
use tokio::process::Command;

/// Mean-lightness threshold below which an image counts as invertible.
pub const INVERT_THRESHOLD: f64 = 0.09;

// ── Cache ───────────────────────────────────────────────────────────────

/// L1 DashMap / L2 SQLite memo for invertibility decisions.
pub struct InvertCache {
    entries: DashMap<String, (u64, bool)>,
    sqlite: Option<Mutex<Connection>>,
}

impl InvertCache {
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            sqlite: None,
        }
    }

    /// Open a persistent cache; falls back to memory-only on failure.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match Connection::open(path) {
            Ok(conn) => {
                let created = conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS invert_cache (
                         key        TEXT NOT NULL PRIMARY KEY,
                         mtime      INTEGER NOT NULL,
                         invertible INTEGER NOT NULL
                     );",
                );
                match created {
                    Ok(()) => Self {
                        entries: DashMap::new(),
                        sqlite: Some(Mutex::new(conn)),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "invert cache schema failed; memory only");
                        Self::in_memory()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "invert cache open failed; memory only");
                Self::in_memory()
            }
        }
    }

    /// Look up a decision. An mtime mismatch is a miss: the file changed,
    /// the old decision is invalid and removed.
    pub fn get(&self, key: &str, mtime: u64) -> Option<bool> {
        if let Some(entry) = self.entries.get(key) {
            let (cached_mtime, invertible) = *entry;
            if cached_mtime == mtime {
                return Some(invertible);
            }
            drop(entry);
            self.entries.remove(key);
        }
        let row = {
            let conn = self.sqlite.as_ref()?.lock().ok()?;
            conn.query_row(
                "SELECT mtime, invertible FROM invert_cache WHERE key = ?1",
                params![key],
                |row| {
                    let mtime: u64 = row.get(0)?;
                    let invertible: i64 = row.get(1)?;
                    Ok((mtime, invertible != 0))
                },
            )
            .ok()?
        };
        let (cached_mtime, invertible) = row;
        if cached_mtime != mtime {
            self.invalidate(key);
            return None;
        }
        // Promote to L1
        self.entries.insert(key.to_string(), (mtime, invertible));
        Some(invertible)
    }

    /// Write-through insert.
    pub fn insert(&self, key: &str, mtime: u64, invertible: bool) {
        self.entries.insert(key.to_string(), (mtime, invertible));
        if let Some(ref sqlite) = self.sqlite
            && let Ok(conn) = sqlite.lock()
        {
            let _ = conn.execute(
                "INSERT OR REPLACE INTO invert_cache (key, mtime, invertible) VALUES (?1, ?2, ?3)",
                params![key, mtime, invertible as i64],
            );
        }
    }

    /// Drop a stale decision from both tiers.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        if let Some(ref sqlite) = self.sqlite
            && let Ok(conn) = sqlite.lock()
        {
            let _ = conn.execute("DELETE FROM invert_cache WHERE key = ?1", params![key]);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Checker ─────────────────────────────────────────────────────────────

/// Classifies images, caching every verdict.
pub struct ImageCheck {
    cache: InvertCache,
    magick: PathBuf,
    threshold: f64,
    timeout: Duration,
    /// Open newly-classified images for human review.
    preview: bool,
}

impl ImageCheck {
    pub fn new(cache: InvertCache, magick: PathBuf, preview: bool) -> Self {
        Self {
            cache,
            magick,
            threshold: INVERT_THRESHOLD,
            timeout: Duration::from_secs(60),
            preview,
        }
    }

    /// Decide for a local file. `key` is the canonical site path; `None`
    /// when the file is missing or the tool fails (no class is added).
    pub async fn is_invertible_local(&self, key: &str, file: &Path) -> Option<bool> {
        let mtime = file_mtime(file)?;
        if let Some(cached) = self.cache.get(key, mtime) {
            return Some(cached);
        }
        let mean = self.mean_lightness(file).await?;
        let invertible = mean < self.threshold;
        self.cache.insert(key, mtime, invertible);
        if invertible {
            tracing::info!(key, mean, "image classified invertible-auto");
            if self.preview {
                self.open_preview(file);
            }
        }
        Some(invertible)
    }

    /// Decide for a remote URL: fetched to a temp file once, then cached
    /// forever under the URL (remote content is assumed immutable).
    pub async fn is_invertible_remote(
        &self,
        url: &str,
        client: &reqwest::Client,
    ) -> Option<bool> {
        if let Some(cached) = self.cache.get(url, 0) {
            return Some(cached);
        }
        let bytes = client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .ok()?
            .bytes()
            .await
            .ok()?;
        let tmp = tempfile::NamedTempFile::new().ok()?;
        std::fs::write(tmp.path(), &bytes).ok()?;
        let mean = self.mean_lightness(tmp.path()).await?;
        let invertible = mean < self.threshold;
        self.cache.insert(url, 0, invertible);
        Some(invertible)
    }

    /// Mean lightness in [0, 1] via ImageMagick: convert to HSL, take the
    /// L channel, read its mean.
    async fn mean_lightness(&self, file: &Path) -> Option<f64> {
        let child = Command::new(&self.magick)
            .arg(file)
            .arg("-colorspace")
            .arg("HSL")
            .arg("-channel")
            .arg("B")
            .arg("-separate")
            .arg("-format")
            .arg("%[fmt:mean]")
            .arg("info:")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();
        let output = tokio::time::timeout(self.timeout, child).await.ok()?.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_mean(&String::from_utf8_lossy(&output.stdout))
    }

    fn open_preview(&self, file: &Path) {
        tracing::warn!(file = %file.display(), "new invertible image; opening preview");
        let _ = std::process::Command::new("xdg-open")
            .arg(file)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
    }
}

/// Parse ImageMagick's mean output; quantum-scale values normalize to
/// [0, 1].
pub(crate) fn parse_mean(output: &str) -> Option<f64> {
    let value: f64 = output.trim().parse().ok()?;
    if value.is_nan() || value < 0.0 {
        return None;
    }
    if value > 1.0 {
        // 16-bit quantum output
        Some(value / 65535.0)
    } else {
        Some(value)
    }
}

fn file_mtime(file: &Path) -> Option<u64> {
    let meta = std::fs::metadata(file).ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
