//! Integration tests for the build pipeline.
//!
//! These run entirely offline: every link in the corpus routes to the
//! dispatcher's permanent-failure path (local pages) or is already in
//! the curated store, so no HTTP requests are made.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use marginalia_core::metadata::{MetadataItem, MetadataStore};
use marginalia_core::pipeline::ensure_annotations;
use marginalia_core::scrape::{AnnotationFetcher, ScrapeError, ScrapeFuture};
use marginalia_core::{BuildConfig, ProgressEvent, run_build};

fn long_abstract() -> String {
    format!(
        "<p>{}</p>",
        "A long enough abstract sentence for a popup. ".repeat(6)
    )
}

/// Write a curated file with one annotated local document.
fn write_corpus(dir: &TempDir) -> BuildConfig {
    let source_dir = dir.path().join("src-html");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::write(
        source_dir.join("index.html"),
        concat!(
            "<h2>peer review at scale</h2>\n",
            "<p>See <a href=\"/doc/stats/1975-johnson.pdf\">the study</a> ",
            "and <a href=\"/notes/other\">other notes</a>, either/or.</p>\n",
            "<hr /><p>mid</p><hr /><p>mid</p><hr /><p>mid</p><hr />\n",
        ),
    )
    .unwrap();

    let metadata_dir = dir.path().join("metadata");
    std::fs::create_dir_all(&metadata_dir).unwrap();
    let curated = metadata_dir.join("curated.yaml");
    let records = vec![
        vec![
            "/doc/stats/1975-johnson.pdf".to_string(),
            "Peer review under scarcity".to_string(),
            "Alice Johnson, Bob Quux".to_string(),
            "1975-03-01".to_string(),
            "10.1/x".to_string(),
            long_abstract(),
        ],
        vec![
            "/notes/other".to_string(),
            "Other notes".to_string(),
            "Carol Xi".to_string(),
            "2020-05-01".to_string(),
            String::new(),
            "Too short for a popup.".to_string(),
        ],
    ];
    std::fs::write(&curated, serde_yaml::to_string(&records).unwrap()).unwrap();

    BuildConfig {
        site_url: "https://www.example.net".into(),
        content_root: dir.path().to_path_buf(),
        source_dir,
        output_dir: dir.path().join("_site"),
        curated_path: curated,
        auto_path: metadata_dir.join("auto.yaml"),
        archive_store_path: metadata_dir.join("archive.json"),
        check_only: true,
        num_workers: 2,
        ..BuildConfig::default()
    }
}

#[tokio::test]
async fn offline_build_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = write_corpus(&dir);
    let output_dir = config.output_dir.clone();

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let progress = move |event: ProgressEvent| {
        let tag = match event {
            ProgressEvent::PhaseStarted { phase } => phase.to_string(),
            _ => return,
        };
        events_clone.lock().unwrap().push(tag);
    };

    let report = run_build(config, progress, CancellationToken::new())
        .await
        .expect("offline build succeeds");

    assert_eq!(report.documents, 1);
    // The annotated PDF merits a fragment; the short note does not.
    assert_eq!(report.fragments_written, 1);

    // Phases ran in order
    let phases = events.lock().unwrap().clone();
    assert_eq!(
        phases,
        vec!["metadata", "parse", "scrape", "inline", "archive", "images", "rewrite", "emit"]
    );

    let html = std::fs::read_to_string(output_dir.join("index.html")).unwrap();

    // Annotated link: marker class + deterministic ID
    assert!(html.contains("docMetadata"), "{html}");
    assert!(html.contains("id=\"johnson-quux-1975\""), "{html}");

    // Header: self-link with title-cased text and section tooltip
    assert!(html.contains("Peer Review at Scale"), "{html}");
    assert!(html.contains("Link to section"), "{html}");

    // Horizontal rules cycle 0,1,2,0 in source order
    for class in [
        "horizontalRule-nth-0",
        "horizontalRule-nth-1",
        "horizontalRule-nth-2",
    ] {
        assert!(html.contains(class), "missing {class} in {html}");
    }
    assert_eq!(html.matches("horizontalRule-nth-0").count(), 2);

    // Slash breaker left the visible text intact
    assert!(html.contains("either/\u{200B}or"), "{html}");

    // Local page link classified
    assert!(html.contains("link-local"), "{html}");

    // The fragment landed under metadata/annotation with an encoded name
    let fragment_dir = output_dir.join("metadata/annotation");
    let fragments: Vec<_> = std::fs::read_dir(&fragment_dir).unwrap().collect();
    assert_eq!(fragments.len(), 1);
}

#[tokio::test]
async fn second_build_is_stable() {
    let dir = TempDir::new().unwrap();
    let config = write_corpus(&dir);
    let output_dir = config.output_dir.clone();

    run_build(config.clone(), |_| {}, CancellationToken::new())
        .await
        .unwrap();
    let first = std::fs::read_to_string(output_dir.join("index.html")).unwrap();

    run_build(config, |_| {}, CancellationToken::new())
        .await
        .unwrap();
    let second = std::fs::read_to_string(output_dir.join("index.html")).unwrap();

    assert_eq!(first, second);
}

// ── Scrape phase against a scripted fetcher ─────────────────────────────

struct ScriptedFetcher {
    item: MetadataItem,
    url: String,
    calls: std::sync::atomic::AtomicUsize,
}

impl AnnotationFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, path: &'a str) -> ScrapeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if path == self.url {
                Ok(self.item.clone())
            } else {
                Err(ScrapeError::Permanent)
            }
        })
    }
}

#[tokio::test]
async fn arxiv_link_gains_annotation_and_id() {
    let dir = TempDir::new().unwrap();
    let metadata_dir = dir.path().join("metadata");
    std::fs::create_dir_all(&metadata_dir).unwrap();
    let curated = metadata_dir.join("curated.yaml");
    let records = vec![vec![
        "/notes/seed".to_string(),
        "Seed".to_string(),
        "Carol Xi".to_string(),
        "2020-01-01".to_string(),
        String::new(),
        "Seed abstract.".to_string(),
    ]];
    std::fs::write(&curated, serde_yaml::to_string(&records).unwrap()).unwrap();

    let auto = metadata_dir.join("auto.yaml");
    let mut store = MetadataStore::load("", &curated, &auto).unwrap();

    let url = "https://arxiv.org/abs/1706.03762";
    let fetcher = Arc::new(ScriptedFetcher {
        item: MetadataItem {
            title: "Attention Is All You Need".into(),
            author: "Ashish Vaswani, Noam Shazeer, Niki Parmar".into(),
            date: "2017-06-12".into(),
            doi: "10.48550/arXiv.1706.03762".into(),
            tags: vec![],
            abstract_html: long_abstract(),
        },
        url: url.to_string(),
        calls: std::sync::atomic::AtomicUsize::new(0),
    });

    let stats = ensure_annotations(
        &mut store,
        &[url.to_string()],
        fetcher.clone(),
        2,
        &CancellationToken::new(),
        &|_| {},
    )
    .await
    .unwrap();

    // Exactly one fetch, one new record
    assert_eq!(stats.created, 1);
    assert_eq!(
        fetcher.calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    // The auto file now carries the scraped record with every field set
    let content = std::fs::read_to_string(&auto).unwrap();
    let written: Vec<Vec<String>> = serde_yaml::from_str(&content).unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0][1..].iter().take(4).all(|f| !f.is_empty()));

    // A document linking the paper renders with class + generated id
    let mut blocks = marginalia_core::html::parse_fragment(&format!(
        "<p><a href=\"{url}\">paper</a></p>"
    ));
    marginalia_core::passes::annotate::mark_annotated_links(
        &mut blocks,
        &store,
        marginalia_core::WikipediaMode::Client,
    );
    let html = marginalia_core::html::blocks_to_html(&blocks);
    assert!(html.contains("docMetadata"), "{html}");
    assert!(html.contains("id=\"vaswani-et-al-2017\""), "{html}");

    // A second run fetches nothing
    let stats2 = ensure_annotations(
        &mut store,
        &[url.to_string()],
        fetcher.clone(),
        2,
        &CancellationToken::new(),
        &|_| {},
    )
    .await
    .unwrap();
    assert_eq!(stats2.created, 0);
    assert_eq!(
        fetcher.calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}
