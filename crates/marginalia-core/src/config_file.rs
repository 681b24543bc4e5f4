//! On-disk TOML configuration.
//!
//! All fields are optional so partial configs work; the CLI merges a
//! project-local `.marginalia.toml` over the platform config, then
//! applies flags on top.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BuildConfig;
use crate::scrape::WikipediaMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub site: Option<SiteConfig>,
    pub paths: Option<PathsConfig>,
    pub build: Option<BuildSection>,
    pub tools: Option<ToolsConfig>,
    /// Auto-linker phrases: phrase → URL.
    pub phrases: Option<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: Option<String>,
    /// "client" (default) or "scraped".
    pub wikipedia_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub content_root: Option<String>,
    pub source_dir: Option<String>,
    pub output_dir: Option<String>,
    pub curated: Option<String>,
    pub auto: Option<String>,
    pub archive_store: Option<String>,
    pub invert_cache: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    pub num_workers: Option<usize>,
    pub archive_cap: Option<usize>,
    pub scrape_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub pubmed_helper: Option<String>,
    pub exiftool: Option<String>,
    pub single_file: Option<String>,
    pub imagemagick: Option<String>,
}

/// Load a config file; `None` when missing or unparseable.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config file ignored");
            None
        }
    }
}

/// Merge two configs: `overlay` values win.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    fn pick<T>(overlay: Option<T>, base: Option<T>) -> Option<T> {
        overlay.or(base)
    }
    ConfigFile {
        site: Some(SiteConfig {
            url: pick(
                overlay.site.as_ref().and_then(|s| s.url.clone()),
                base.site.as_ref().and_then(|s| s.url.clone()),
            ),
            wikipedia_mode: pick(
                overlay.site.as_ref().and_then(|s| s.wikipedia_mode.clone()),
                base.site.as_ref().and_then(|s| s.wikipedia_mode.clone()),
            ),
        }),
        paths: Some(PathsConfig {
            content_root: pick(
                overlay.paths.as_ref().and_then(|p| p.content_root.clone()),
                base.paths.as_ref().and_then(|p| p.content_root.clone()),
            ),
            source_dir: pick(
                overlay.paths.as_ref().and_then(|p| p.source_dir.clone()),
                base.paths.as_ref().and_then(|p| p.source_dir.clone()),
            ),
            output_dir: pick(
                overlay.paths.as_ref().and_then(|p| p.output_dir.clone()),
                base.paths.as_ref().and_then(|p| p.output_dir.clone()),
            ),
            curated: pick(
                overlay.paths.as_ref().and_then(|p| p.curated.clone()),
                base.paths.as_ref().and_then(|p| p.curated.clone()),
            ),
            auto: pick(
                overlay.paths.as_ref().and_then(|p| p.auto.clone()),
                base.paths.as_ref().and_then(|p| p.auto.clone()),
            ),
            archive_store: pick(
                overlay.paths.as_ref().and_then(|p| p.archive_store.clone()),
                base.paths.as_ref().and_then(|p| p.archive_store.clone()),
            ),
            invert_cache: pick(
                overlay.paths.as_ref().and_then(|p| p.invert_cache.clone()),
                base.paths.as_ref().and_then(|p| p.invert_cache.clone()),
            ),
        }),
        build: Some(BuildSection {
            num_workers: pick(
                overlay.build.as_ref().and_then(|b| b.num_workers),
                base.build.as_ref().and_then(|b| b.num_workers),
            ),
            archive_cap: pick(
                overlay.build.as_ref().and_then(|b| b.archive_cap),
                base.build.as_ref().and_then(|b| b.archive_cap),
            ),
            scrape_timeout_secs: pick(
                overlay.build.as_ref().and_then(|b| b.scrape_timeout_secs),
                base.build.as_ref().and_then(|b| b.scrape_timeout_secs),
            ),
        }),
        tools: Some(ToolsConfig {
            pubmed_helper: pick(
                overlay.tools.as_ref().and_then(|t| t.pubmed_helper.clone()),
                base.tools.as_ref().and_then(|t| t.pubmed_helper.clone()),
            ),
            exiftool: pick(
                overlay.tools.as_ref().and_then(|t| t.exiftool.clone()),
                base.tools.as_ref().and_then(|t| t.exiftool.clone()),
            ),
            single_file: pick(
                overlay.tools.as_ref().and_then(|t| t.single_file.clone()),
                base.tools.as_ref().and_then(|t| t.single_file.clone()),
            ),
            imagemagick: pick(
                overlay.tools.as_ref().and_then(|t| t.imagemagick.clone()),
                base.tools.as_ref().and_then(|t| t.imagemagick.clone()),
            ),
        }),
        phrases: pick(overlay.phrases, base.phrases),
    }
}

/// Fold a parsed config file into a [`BuildConfig`].
pub fn apply(file: &ConfigFile, mut config: BuildConfig) -> BuildConfig {
    if let Some(site) = &file.site {
        if let Some(url) = &site.url {
            config.site_url = url.clone();
        }
        if let Some(mode) = &site.wikipedia_mode {
            config.wikipedia_mode = match mode.as_str() {
                "scraped" => WikipediaMode::Scraped,
                _ => WikipediaMode::Client,
            };
        }
    }
    if let Some(paths) = &file.paths {
        if let Some(v) = &paths.content_root {
            config.content_root = PathBuf::from(v);
        }
        if let Some(v) = &paths.source_dir {
            config.source_dir = PathBuf::from(v);
        }
        if let Some(v) = &paths.output_dir {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = &paths.curated {
            config.curated_path = PathBuf::from(v);
        }
        if let Some(v) = &paths.auto {
            config.auto_path = PathBuf::from(v);
        }
        if let Some(v) = &paths.archive_store {
            config.archive_store_path = PathBuf::from(v);
        }
        if let Some(v) = &paths.invert_cache {
            config.invert_cache_path = Some(PathBuf::from(v));
        }
    }
    if let Some(build) = &file.build {
        if let Some(v) = build.num_workers {
            config.num_workers = v.max(1);
        }
        if let Some(v) = build.archive_cap {
            config.archive_cap = v;
        }
        if let Some(v) = build.scrape_timeout_secs {
            config.scrape_timeout = Duration::from_secs(v);
        }
    }
    if let Some(tools) = &file.tools {
        if let Some(v) = &tools.pubmed_helper {
            config.pubmed_helper = PathBuf::from(v);
        }
        if let Some(v) = &tools.exiftool {
            config.exiftool = PathBuf::from(v);
        }
        if let Some(v) = &tools.single_file {
            config.single_file = PathBuf::from(v);
        }
        if let Some(v) = &tools.imagemagick {
            config.imagemagick = PathBuf::from(v);
        }
    }
    if let Some(phrases) = &file.phrases {
        config.phrases = phrases.clone();
    }
    config
}
