use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use marginalia_core::{BuildConfig, ProgressEvent, config_file, run_build};

/// marginalia - annotation-driven site builder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the site: scrape missing annotations, archive external
    /// links, rewrite documents, emit fragments
    Build {
        /// Config file (defaults to .marginalia.toml, over the platform config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of worker tasks
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Report missing archives without fetching anything
        #[arg(long)]
        check: bool,

        /// Never open snapshots or images for review
        #[arg(long)]
        no_preview: bool,

        /// Cap on new link archives this build
        #[arg(long)]
        archive_cap: Option<usize>,

        /// Quiet progress (warnings only)
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Platform config path: `<config_dir>/marginalia/config.toml`.
fn platform_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("marginalia").join("config.toml"))
}

fn resolve_config(explicit: Option<PathBuf>) -> config_file::ConfigFile {
    if let Some(path) = explicit {
        return config_file::load_from_path(&path).unwrap_or_default();
    }
    let platform = platform_config_path().and_then(|p| config_file::load_from_path(&p));
    let local = config_file::load_from_path(&PathBuf::from(".marginalia.toml"));
    match (platform, local) {
        (None, None) => config_file::ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(l)) => l,
        (Some(p), Some(l)) => config_file::merge(p, l),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            config,
            workers,
            check,
            no_preview,
            archive_cap,
            quiet,
        } => {
            let file = resolve_config(config);
            let mut build_config = config_file::apply(&file, BuildConfig::default());
            if let Some(workers) = workers {
                build_config.num_workers = workers.max(1);
            }
            if let Some(cap) = archive_cap {
                build_config.archive_cap = cap;
            }
            build_config.check_only = check;
            build_config.no_preview = build_config.no_preview || no_preview;

            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; finishing in-flight work");
                    ctrl_c_cancel.cancel();
                }
            });

            let progress = move |event: ProgressEvent| {
                if quiet {
                    return;
                }
                match event {
                    ProgressEvent::PhaseStarted { phase } => {
                        tracing::info!(phase, "phase started")
                    }
                    ProgressEvent::AnnotationScraped { path, outcome } => {
                        tracing::info!(path, ?outcome, "annotation")
                    }
                    ProgressEvent::Archived { url, local_path } => {
                        tracing::debug!(url, ?local_path, "archive")
                    }
                    ProgressEvent::DocumentRewritten { source } => {
                        tracing::debug!(source, "rewritten")
                    }
                    ProgressEvent::FragmentWritten { path } => {
                        tracing::debug!(path, "fragment")
                    }
                    ProgressEvent::Warning { message } => tracing::warn!("{message}"),
                    ProgressEvent::DocumentLoaded { .. } => {}
                }
            };

            let report = run_build(build_config, progress, cancel).await?;
            println!(
                "built {} documents: +{} annotations ({} negative, {} deferred), {} archived, {} fragments",
                report.documents,
                report.annotations_created,
                report.negative_entries,
                report.temporary_failures,
                report.archived,
                report.fragments_written,
            );
        }
    }
    Ok(())
}
