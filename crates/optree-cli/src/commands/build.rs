//! `optree build`: import game sources.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Args;
use optree_core::{
  import::{ImportOptions, ImportSummary, Importer},
  store::TreeStore,
};
use optree_pgn::{PgnSource, collect_sources, fingerprint};
use optree_store_sqlite::SqliteStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{commands::print_json, settings::Settings};

#[derive(Args)]
pub struct BuildArgs {
  /// Half-moves replayed per game.
  #[arg(long)]
  max_ply: Option<usize>,

  /// Skip games where either player is rated below this.
  #[arg(long)]
  min_rating: Option<u32>,

  /// PGN files, or directories searched recursively for `*.pgn`.
  #[arg(required = true, value_name = "SOURCE")]
  sources: Vec<PathBuf>,
}

pub async fn run(
  store: &SqliteStore,
  settings: &Settings,
  args: BuildArgs,
  cancel: &CancellationToken,
) -> anyhow::Result<()> {
  let options = ImportOptions {
    max_ply:    args.max_ply.unwrap_or(settings.max_ply),
    min_rating: args.min_rating.unwrap_or(settings.min_rating),
  };
  let files = collect_sources(&args.sources).context("failed to collect sources")?;
  info!(files = files.len(), ?options, "build started");

  let mut summaries: Vec<ImportSummary> = Vec::with_capacity(files.len());
  for file in &files {
    if cancel.is_cancelled() {
      break;
    }
    let summary = import_file(store, options, file, cancel).await?;
    let interrupted = summary.interrupted;
    summaries.push(summary);
    if interrupted {
      break;
    }
  }

  let counts = store.counts().await.context("failed to count store rows")?;
  info!(
    positions = counts.positions,
    moves = counts.moves,
    imported_files = counts.imported_files,
    "build finished"
  );
  print_json(&serde_json::json!({ "sources": summaries, "store": counts }))
}

/// Games waiting between the reader thread and the importer.
const GAME_BUFFER: usize = 256;

async fn import_file(
  store: &SqliteStore,
  options: ImportOptions,
  file: &Path,
  cancel: &CancellationToken,
) -> anyhow::Result<ImportSummary> {
  let stamp = fingerprint(file).with_context(|| format!("failed to fingerprint {}", file.display()))?;
  let games = PgnSource::open(Path::new(&stamp.path), options.max_ply)
    .with_context(|| format!("failed to open {}", file.display()))?;

  // PGN reading and move replay block, so they run off the async workers.
  let (tx, rx) = mpsc::channel(GAME_BUFFER);
  let reader = tokio::task::spawn_blocking(move || {
    for game in games {
      if tx.blocking_send(game).is_err() {
        break;
      }
    }
  });

  let summary = Importer::new(store, options)
    .with_cancellation(cancel.clone())
    .import_channel(&stamp, rx)
    .await
    .with_context(|| format!("failed to import {}", file.display()))?;
  reader.await.context("pgn reader thread failed")?;
  Ok(summary)
}
