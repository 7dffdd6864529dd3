//! # docqa CLI
//!
//! The `docqa` binary answers questions about the documents in a corpus
//! directory. The index is built on first use and persisted for later runs.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa status` | Initialize (load or build the index) and print the state |
//! | `docqa index [--force]` | Build the index, or rebuild it from scratch |
//! | `docqa invalidate` | Delete the persisted index |
//! | `docqa search "<query>"` | Print the nearest chunks with their sources |
//! | `docqa ask "<question>"` | Answer one question |
//! | `docqa chat` | Answer questions read from stdin |
//!
//! `OPENAI_API_KEY` must be set for any command that embeds or answers.
//! Diagnostics are controlled with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::commands;
use docqa::config;
use docqa::progress::ProgressMode;

/// docqa: question answering over a local document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: retrieval-augmented question answering over local documents",
    version,
    long_about = "docqa loads .txt, .pdf, and .docx files from a corpus directory, splits them \
    into overlapping chunks, embeds them into a persisted vector index, and answers questions \
    from the most similar chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. See `config/docqa.example.toml`.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Index build progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize and print the orchestrator state.
    ///
    /// Loads the persisted index if there is one, otherwise builds it.
    /// Exits non-zero when initialization fails.
    Status,

    /// Build the index.
    Index {
        /// Rebuild from the corpus even when a persisted index exists.
        #[arg(long)]
        force: bool,
    },

    /// Delete the persisted index so the next run rebuilds it.
    Invalidate,

    /// Print the chunks nearest to a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (default: `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        question: String,

        /// JSON transcript to load and append to.
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Interactive question loop on stdin.
    Chat {
        /// JSON transcript to load and append to.
        #[arg(long)]
        session: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Status => {
            commands::run_status(&cfg, progress).await?;
        }
        Commands::Index { force } => {
            commands::run_index(&cfg, force, progress).await?;
        }
        Commands::Invalidate => {
            commands::run_invalidate(&cfg)?;
        }
        Commands::Search { query, k } => {
            commands::run_search(&cfg, &query, k, progress).await?;
        }
        Commands::Ask { question, session } => {
            commands::run_ask(&cfg, &question, session.as_deref(), progress).await?;
        }
        Commands::Chat { session } => {
            commands::run_chat(&cfg, session.as_deref(), progress).await?;
        }
    }

    Ok(())
}
