//! Build driver: orders the passes, runs the I/O phases over a worker
//! pool, and guards the store invariants.
//!
//! Phase order per build:
//!
//! 1. load and invariant-check the metadata store
//! 2. parse documents, run the early pure passes (auto-link, interwiki,
//!    footnote check)
//! 3. scrape phase — every link target missing from the store goes to
//!    the dispatcher; successes and permanent failures append to the
//!    auto file (serialized), temporaries retry next build
//! 4. one level of recursive annotation inlining
//! 5. archive phase — snapshots for external links
//! 6. image phase — invertibility decisions
//! 7. pure rewrite phase — passes 5–13, documents in parallel, all
//!    observing the same frozen metadata snapshot
//! 8. fragment writing and document emission (write-if-changed)

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveStore, Archiver, HttpFetcher};
use crate::ast::Document;
use crate::html::{blocks_to_html, parse_fragment};
use crate::invert::{ImageCheck, InvertCache};
use crate::metadata::{MetadataItem, MetadataStore};
use crate::passes::{self, PageIndex, RewriteContext, annotate, autolink::PhraseTable, images};
use crate::scrape::{AnnotationFetcher, Dispatcher, ScrapeConfig, ScrapeError, WikipediaMode};
use crate::{BuildConfig, BuildError, ProgressEvent, ScrapeOutcome};

/// Summary of one build.
#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub documents: usize,
    pub annotations_created: usize,
    pub negative_entries: usize,
    pub temporary_failures: usize,
    pub archived: usize,
    pub fragments_written: usize,
}

/// Counters from the scrape phase.
#[derive(Debug, Default, Clone)]
pub struct ScrapeStats {
    pub created: usize,
    pub negative: usize,
    pub temporary: usize,
}

/// Run a complete build.
pub async fn run_build(
    config: BuildConfig,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<BuildReport, BuildError> {
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
    let mut report = BuildReport::default();

    // ── Phase 1: metadata ───────────────────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "metadata" });
    let mut store = MetadataStore::load(&config.site_url, &config.curated_path, &config.auto_path)?;
    tracing::info!(entries = store.len(), "metadata store loaded");

    // ── Phase 2: parse + early passes ───────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "parse" });
    let mut documents = load_documents(&config.source_dir)?;
    report.documents = documents.len();
    let phrases = PhraseTable::new(config.phrases.clone());
    let total = documents.len();
    for (index, doc) in documents.iter_mut().enumerate() {
        passes::early_passes(doc, &phrases)?;
        progress(ProgressEvent::DocumentLoaded {
            source: doc.source.clone(),
            index,
            total,
        });
    }

    // ── Phase 3: scrape ─────────────────────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "scrape" });
    let mut link_targets: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for doc in &documents {
        for target in annotate::collect_link_targets(&doc.blocks) {
            if seen.insert(target.clone()) {
                link_targets.push(target);
            }
        }
    }

    let limiters = Arc::new(crate::rate_limit::SourceLimiters::new());
    let invert_cache = match &config.invert_cache_path {
        Some(path) => InvertCache::open(path),
        None => InvertCache::in_memory(),
    };
    let image_check = Arc::new(ImageCheck::new(
        invert_cache,
        config.imagemagick.clone(),
        !config.no_preview,
    ));
    let dispatcher: Arc<dyn AnnotationFetcher> = Arc::new(Dispatcher::new(
        ScrapeConfig {
            site_url: config.site_url.clone(),
            wikipedia_mode: config.wikipedia_mode,
            pubmed_helper: config.pubmed_helper.clone(),
            exiftool: config.exiftool.clone(),
            content_root: config.content_root.clone(),
            timeout: config.scrape_timeout,
        },
        limiters,
        image_check.clone(),
    ));

    let stats = ensure_annotations(
        &mut store,
        &link_targets,
        dispatcher,
        config.num_workers,
        &cancel,
        progress.as_ref(),
    )
    .await?;
    report.annotations_created = stats.created;
    report.negative_entries = stats.negative;
    report.temporary_failures = stats.temporary;

    // ── Phase 4: recursive inlining (one level) ─────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "inline" });
    let wikipedia_mode = config.wikipedia_mode;
    store.recurse_inline(|meta, html| {
        let mut blocks = parse_fragment(html);
        annotate::mark_annotated_links(&mut blocks, meta, wikipedia_mode);
        blocks_to_html(&blocks)
    });

    // The store is frozen from here on: every document observes this
    // snapshot.
    let store = Arc::new(store);

    // ── Phase 5: archive ────────────────────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "archive" });
    let archiver = Arc::new(Archiver::new(
        ArchiveStore::open(&config.archive_store_path),
        Box::new(HttpFetcher::new(config.single_file.clone())),
        config.content_root.clone(),
        config.check_only,
        !config.no_preview,
        config.archive_cap,
    ));
    let external: Vec<String> = link_targets
        .iter()
        .filter(|t| t.starts_with("http"))
        .cloned()
        .collect();
    let archived = archive_links(
        archiver,
        &external,
        config.num_workers,
        &cancel,
        progress.as_ref(),
    )
    .await;
    report.archived = archived.len();

    // ── Phase 6: images ─────────────────────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "images" });
    let mut image_targets: Vec<String> = Vec::new();
    for doc in &documents {
        image_targets.extend(images::collect_image_targets(&doc.blocks));
    }
    image_targets.sort();
    image_targets.dedup();
    let invertible = classify_images(
        image_check,
        &image_targets,
        &config.content_root,
        &cancel,
    )
    .await;

    // ── Phase 7: rewrite ────────────────────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "rewrite" });
    let pages = Arc::new(build_page_index(&documents, &store));
    let archived = Arc::new(archived);
    let invertible = Arc::new(invertible);
    let documents = rewrite_documents(
        documents,
        store.clone(),
        archived.clone(),
        invertible.clone(),
        pages,
        wikipedia_mode,
        config.num_workers,
        &cancel,
        progress.as_ref(),
    )
    .await?;

    // ── Phase 8: fragments + emission ───────────────────────────────
    progress(ProgressEvent::PhaseStarted { phase: "emit" });
    report.fragments_written = write_fragments(
        &config.output_dir,
        &store,
        &archived,
        wikipedia_mode,
        &cancel,
        progress.as_ref(),
    )?;

    for doc in &documents {
        if cancel.is_cancelled() {
            break;
        }
        let dest = config.output_dir.join(&doc.source);
        let html = blocks_to_html(&doc.blocks);
        crate::fragment::write_if_changed(&dest, html.as_bytes())?;
    }

    tracing::info!(
        documents = report.documents,
        annotations = report.annotations_created,
        archived = report.archived,
        fragments = report.fragments_written,
        "build complete"
    );
    Ok(report)
}

// ── Documents ───────────────────────────────────────────────────────────

fn collect_html_files(dir: &Path, base: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_html_files(&path, base, out)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Parse every `.html` under the source directory.
pub fn load_documents(source_dir: &Path) -> Result<Vec<Document>, BuildError> {
    let mut files = Vec::new();
    collect_html_files(source_dir, source_dir, &mut files)?;
    files.sort();
    let mut documents = Vec::with_capacity(files.len());
    for rel in files {
        let content = std::fs::read_to_string(source_dir.join(&rel))?;
        documents.push(Document {
            source: rel.to_string_lossy().into_owned(),
            blocks: parse_fragment(&content),
        });
    }
    Ok(documents)
}

// ── Scrape phase ────────────────────────────────────────────────────────

/// Ensure an annotation (or negative entry) exists for every target.
///
/// Fetches run concurrently across the worker pool; auto-file appends
/// happen serially here, in the collection loop. Fatal scrape errors
/// (a disambiguation page) abort the build.
pub async fn ensure_annotations(
    store: &mut MetadataStore,
    targets: &[String],
    fetcher: Arc<dyn AnnotationFetcher>,
    num_workers: usize,
    cancel: &CancellationToken,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> Result<ScrapeStats, BuildError> {
    let missing: Vec<String> = targets
        .iter()
        .filter(|t| !store.contains(t))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(ScrapeStats::default());
    }
    tracing::info!(missing = missing.len(), "scraping missing annotations");

    let (job_tx, job_rx) = async_channel::unbounded::<String>();
    let (res_tx, res_rx) =
        async_channel::unbounded::<(String, Result<MetadataItem, ScrapeError>)>();

    let mut handles = Vec::new();
    for _ in 0..num_workers.max(1) {
        let job_rx = job_rx.clone();
        let res_tx = res_tx.clone();
        let fetcher = fetcher.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            while let Ok(path) = job_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                let result = fetcher.fetch(&path).await;
                if res_tx.send((path, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(job_rx);
    drop(res_tx);

    for path in &missing {
        let _ = job_tx.send(path.clone()).await;
    }
    job_tx.close();

    let mut stats = ScrapeStats::default();
    let mut fatal: Option<BuildError> = None;
    while let Ok((path, result)) = res_rx.recv().await {
        match result {
            Ok(item) => {
                store.append_auto(&path, &item)?;
                stats.created += 1;
                progress(ProgressEvent::AnnotationScraped {
                    path,
                    outcome: ScrapeOutcome::Found,
                });
            }
            Err(ScrapeError::Permanent) => {
                store.append_auto(&path, &MetadataItem::negative())?;
                stats.negative += 1;
                progress(ProgressEvent::AnnotationScraped {
                    path,
                    outcome: ScrapeOutcome::Permanent,
                });
            }
            Err(ScrapeError::Temporary(reason)) => {
                stats.temporary += 1;
                tracing::debug!(path, reason, "temporary scrape failure; retry next build");
                progress(ProgressEvent::AnnotationScraped {
                    path,
                    outcome: ScrapeOutcome::Temporary,
                });
            }
            Err(ScrapeError::Fatal(err)) => {
                // Drain remaining results, then abort.
                if fatal.is_none() {
                    cancel.cancel();
                    fatal = Some(err);
                }
            }
        }
    }
    for handle in handles {
        let _ = handle.await;
    }
    match fatal {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}

// ── Archive phase ───────────────────────────────────────────────────────

async fn archive_links(
    archiver: Arc<Archiver>,
    urls: &[String],
    num_workers: usize,
    cancel: &CancellationToken,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> HashMap<String, String> {
    let (job_tx, job_rx) = async_channel::unbounded::<String>();
    let (res_tx, res_rx) = async_channel::unbounded::<(String, Option<String>)>();

    let mut handles = Vec::new();
    for _ in 0..num_workers.max(1) {
        let job_rx = job_rx.clone();
        let res_tx = res_tx.clone();
        let archiver = archiver.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            while let Ok(url) = job_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                let result = match archiver.archive(&url).await {
                    Ok(local) => Some(local),
                    Err(err) => {
                        tracing::debug!(url, %err, "not archived");
                        None
                    }
                };
                if res_tx.send((url, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(job_rx);
    drop(res_tx);

    for url in urls {
        let _ = job_tx.send(url.clone()).await;
    }
    job_tx.close();

    let mut archived = HashMap::new();
    while let Ok((url, result)) = res_rx.recv().await {
        progress(ProgressEvent::Archived {
            url: url.clone(),
            local_path: result.clone(),
        });
        if let Some(local) = result {
            let base = crate::metadata::strip_fragment(&url).to_string();
            let local_base = crate::metadata::strip_fragment(&local).to_string();
            archived.insert(base, local_base);
        }
    }
    for handle in handles {
        let _ = handle.await;
    }
    archived
}

// ── Image phase ─────────────────────────────────────────────────────────

async fn classify_images(
    image_check: Arc<ImageCheck>,
    targets: &[String],
    content_root: &Path,
    cancel: &CancellationToken,
) -> HashMap<String, bool> {
    let client = reqwest::Client::new();
    let mut decisions = HashMap::new();
    for target in targets {
        if cancel.is_cancelled() {
            break;
        }
        let decision = if target.starts_with('/') {
            let file = content_root.join(target.trim_start_matches('/'));
            image_check.is_invertible_local(target, &file).await
        } else if target.starts_with("http") {
            image_check.is_invertible_remote(target, &client).await
        } else {
            None
        };
        if let Some(invertible) = decision {
            decisions.insert(target.clone(), invertible);
        }
    }
    decisions
}

// ── Rewrite phase ───────────────────────────────────────────────────────

fn build_page_index(documents: &[Document], store: &MetadataStore) -> PageIndex {
    let mut pages = PageIndex::default();
    for doc in documents {
        for target in annotate::collect_link_targets(&doc.blocks) {
            if target.starts_with('/') {
                pages
                    .backlink_targets
                    .insert(crate::metadata::strip_fragment(&target).to_string());
            }
        }
    }
    for (path, item) in store.iter() {
        if path.starts_with('/') && !item.tags.is_empty() {
            pages.tag_map.insert(path.clone(), item.tags.clone());
        }
    }
    pages
}

#[allow(clippy::too_many_arguments)]
async fn rewrite_documents(
    documents: Vec<Document>,
    store: Arc<MetadataStore>,
    archived: Arc<HashMap<String, String>>,
    invertible: Arc<HashMap<String, bool>>,
    pages: Arc<PageIndex>,
    wikipedia_mode: WikipediaMode,
    num_workers: usize,
    cancel: &CancellationToken,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> Result<Vec<Document>, BuildError> {
    let total = documents.len();
    let (job_tx, job_rx) = async_channel::unbounded::<(usize, Document)>();
    let (res_tx, res_rx) =
        async_channel::unbounded::<(usize, Result<Document, BuildError>)>();

    let mut handles = Vec::new();
    for _ in 0..num_workers.max(1) {
        let job_rx = job_rx.clone();
        let res_tx = res_tx.clone();
        let store = store.clone();
        let archived = archived.clone();
        let invertible = invertible.clone();
        let pages = pages.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            while let Ok((index, mut doc)) = job_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                let ctx = RewriteContext {
                    meta: &store,
                    archived: &archived,
                    invertible: &invertible,
                    pages: &pages,
                    wikipedia_mode,
                };
                let result = passes::rewrite_document(&mut doc, &ctx).map(|()| doc);
                if res_tx.send((index, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(job_rx);
    drop(res_tx);

    for (index, doc) in documents.into_iter().enumerate() {
        let _ = job_tx.send((index, doc)).await;
    }
    job_tx.close();

    let mut rewritten: Vec<Option<Document>> = (0..total).map(|_| None).collect();
    let mut failure: Option<BuildError> = None;
    while let Ok((index, result)) = res_rx.recv().await {
        match result {
            Ok(doc) => {
                progress(ProgressEvent::DocumentRewritten {
                    source: doc.source.clone(),
                });
                rewritten[index] = Some(doc);
            }
            Err(err) => {
                if failure.is_none() {
                    cancel.cancel();
                    failure = Some(err);
                }
            }
        }
    }
    for handle in handles {
        let _ = handle.await;
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(rewritten.into_iter().flatten().collect()),
    }
}

// ── Fragments ───────────────────────────────────────────────────────────

fn write_fragments(
    output_dir: &Path,
    store: &MetadataStore,
    archived: &HashMap<String, String>,
    wikipedia_mode: WikipediaMode,
    cancel: &CancellationToken,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> Result<usize, BuildError> {
    let mut written = 0;
    for (path, item) in store.iter() {
        if cancel.is_cancelled() {
            break;
        }
        if crate::fragment::write_fragment(
            output_dir,
            path,
            item,
            store,
            archived,
            wikipedia_mode,
        )?
        .is_some()
        {
            written += 1;
            progress(ProgressEvent::FragmentWritten { path: path.clone() });
        }
    }
    Ok(written)
}
