//! `nisen`: record quiz answers and study days, and show learning progress.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nisen_core::MasteryRule;
use nisen_core::model::{CharacterId, ModuleCatalog, ModuleId};
use services::{Clock, ProgressEngine};
use storage::repository::Storage;

mod commands;
mod db;

#[derive(Parser)]
#[command(name = "nisen", version, about = "Character-memorization progress tracker")]
struct Cli {
    /// SQLite database URL or path
    #[arg(long, env = "NISEN_DB_URL", default_value = "sqlite:nisen.sqlite3", global = true)]
    db: String,

    /// TOML module catalog (defaults to the built-in Japanese sets)
    #[arg(long, env = "NISEN_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// Correct answers needed before a character counts as learned
    #[arg(long, default_value = "1", global = true)]
    mastery: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a quiz answer
    Record {
        /// Module identifier (e.g. hiragana)
        module: ModuleId,

        /// Character identifier (e.g. あ)
        character: CharacterId,

        /// The answer was correct
        #[arg(long, conflicts_with = "incorrect", required_unless_present = "incorrect")]
        correct: bool,

        /// The answer was wrong
        #[arg(long)]
        incorrect: bool,
    },

    /// Mark today as a study day
    Study,

    /// Show progress statistics
    Stats {
        /// Restrict to one module
        #[arg(long)]
        module: Option<ModuleId>,
    },

    /// List recorded quiz attempts, oldest first
    History {
        /// Restrict to one module
        #[arg(long)]
        module: Option<ModuleId>,

        /// Show at most this many of the latest attempts
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Erase all recorded progress
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

fn load_catalog(path: Option<&PathBuf>) -> Result<ModuleCatalog> {
    let Some(path) = path else {
        return Ok(ModuleCatalog::japanese());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    ModuleCatalog::from_toml_str(&raw)
        .with_context(|| format!("invalid catalog {}", path.display()))
}

async fn run(cli: Cli) -> Result<()> {
    let catalog = load_catalog(cli.catalog.as_ref())?;

    // Open + migrate SQLite here so core/services stay storage-agnostic.
    let db_url = db::normalize_sqlite_url(&cli.db);
    db::prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("failed to open {db_url}"))?;

    let engine = ProgressEngine::load(storage.kv, catalog, Clock::default_clock())
        .await
        .with_mastery_rule(MasteryRule::from_threshold(cli.mastery));

    match cli.command {
        Commands::Record {
            module,
            character,
            correct,
            incorrect: _,
        } => commands::record(&engine, module, character, correct).await,
        Commands::Study => commands::study(&engine).await,
        Commands::Stats { module } => commands::stats(&engine, module),
        Commands::History { module, limit } => commands::history(&engine, module, limit),
        Commands::Reset { yes } => commands::reset(&engine, yes).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
