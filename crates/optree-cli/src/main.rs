//! `optree`: build, prune, query and serve chess opening trees.
//!
//! # Usage
//!
//! ```text
//! optree build --max-ply 30 --min-rating 1800 games/
//! optree prune --max-closeness 5
//! optree query --fen "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
//! optree serve --trees blitz:blitz.db --trees classical:classical.db
//! optree normalize-keys --dry-run
//! ```
//!
//! Settings come from `optree.toml` (or `--config`) and `OPTREE_*`
//! environment variables; flags override both.

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use optree_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use commands::{
  build::BuildArgs, normalize::NormalizeArgs, prune::PruneArgs, query::QueryArgs,
  serve::ServeArgs,
};
use settings::Settings;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "optree", version, about = "Chess opening-tree builder and server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "optree.toml")]
  config: PathBuf,

  /// Store file; overrides `store_path` from the settings.
  #[arg(long, global = true, value_name = "FILE")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import PGN files or directories into the store.
  Build(BuildArgs),
  /// Delete rarely-visited positions far from any popular one.
  Prune(PruneArgs),
  /// Show the moves played from a position.
  Query(QueryArgs),
  /// Serve one or more stores over HTTP, read-only.
  Serve(ServeArgs),
  /// Re-apply key normalisation to every stored position.
  NormalizeKeys(NormalizeArgs),
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let store_path = cli.db.clone().unwrap_or_else(|| settings.store_path.clone());
  let cancel = interrupt_token();

  match cli.command {
    Command::Build(args) => {
      let store = open_store(&store_path).await?;
      commands::build::run(&store, &settings, args, &cancel).await
    }
    Command::Prune(args) => {
      let store = open_store(&store_path).await?;
      commands::prune::run(&store, &settings, args, &cancel).await
    }
    Command::Query(args) => {
      let store = SqliteStore::open_read_only(&store_path)
        .await
        .with_context(|| format!("failed to open store at {}", store_path.display()))?;
      commands::query::run(&store, args).await
    }
    Command::Serve(args) => commands::serve::run(&settings, args, cancel).await,
    Command::NormalizeKeys(args) => {
      let store = open_store(&store_path).await?;
      commands::normalize::run(&store, args, &cancel).await
    }
  }
}

async fn open_store(path: &std::path::Path) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {}", path.display()))
}

/// A token cancelled on Ctrl-C. Batch commands stop at the next transaction
/// boundary; the server shuts down gracefully.
fn interrupt_token() -> CancellationToken {
  let token = CancellationToken::new();
  let trigger = token.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, stopping at the next safe point");
      trigger.cancel();
    }
  });
  token
}
