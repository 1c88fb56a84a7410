//! # Article Harness CLI (`ah`)
//!
//! The `ah` binary drives ingestion from the upstream article API into the
//! local SQLite store.
//!
//! ## Usage
//!
//! ```bash
//! ah --config ./config/harness.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ah init` | Create the SQLite database and tables |
//! | `ah archive [years] [month_offset]` | Ingest whole archive months, oldest first |
//! | `ah archive --latest [N]` | Ingest only the last N months (default 1) |
//! | `ah search [pages]` | Ingest search result pages with sequence ids |
//! | `ah get <uri>` | Print one stored record as JSON |
//! | `ah stats` | Per-collection counts and date bounds |
//!
//! Ingestion commands need `NYTIMES_API_KEY` in the environment.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use article_harness::config;
use article_harness::get;
use article_harness::ingest;
use article_harness::migrate;
use article_harness::progress::ProgressMode;
use article_harness::stats;
use article_harness_core::models::Collection;

/// Article Harness: incremental, rate-limited article ingestion.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harness.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ah",
    about = "Article Harness: incremental, rate-limited article ingestion",
    version,
    long_about = "Article Harness walks the upstream archive by month or the search API by page, \
    normalizes every article and upserts it into a local SQLite store keyed by uri. \
    Reruns are safe: known records are skipped or rewritten in place."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harness.toml`. A missing file means built-in
    /// defaults.
    #[arg(long, global = true, default_value = "./config/harness.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the collection tables. Running it
    /// again is a no-op.
    Init,

    /// Ingest whole months from the archive API.
    ///
    /// `ah archive [years] [month_offset]` walks from `years` before the
    /// anchor month up to the anchor, where the anchor is the current month
    /// minus `month_offset`. Input that is not one or two non-negative
    /// integers falls back to the configured default window.
    Archive {
        /// Only ingest the last N months, ending at the current month.
        #[arg(short, long, num_args = 0..=1, default_missing_value = "1")]
        latest: Option<u32>,

        /// `[years] [month_offset]`.
        #[arg(value_name = "ARGS", num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Ingest result pages from the search API.
    ///
    /// Every written record receives the next sequence id, continuing from
    /// the highest id already stored.
    Search {
        /// Number of pages to fetch, starting at page 0.
        pages: Option<String>,
    },

    /// Print a stored record by its uri.
    Get {
        /// Record uri, e.g. `nyt://article/...`.
        uri: String,

        /// Only look in this collection (`archive` or `search`).
        #[arg(long)]
        collection: Option<Collection>,
    },

    /// Show per-collection counts, date bounds and the sequence checkpoint.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    // Ingestion fails fast without a key, before touching the store or network.
    if matches!(cli.command, Commands::Archive { .. } | Commands::Search { .. }) {
        if let Err(e) = cfg.require_api_key() {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Archive { latest, args } => {
            let window = ingest::archive_window(&cfg, &args, latest);
            ingest::run_archive_command(&cfg, window, progress).await?;
        }
        Commands::Search { pages } => {
            let pages = ingest::search_page_count(&cfg, pages.as_deref());
            ingest::run_search_command(&cfg, pages, progress).await?;
        }
        Commands::Get { uri, collection } => {
            get::run_get(&cfg, &uri, collection).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
