//! `optree prune`: drop distant singleton branches.

use anyhow::Context as _;
use clap::Args;
use optree_core::{prune::Pruner, store::TreeStore};
use optree_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{commands::print_json, settings::Settings};

#[derive(Args)]
pub struct PruneArgs {
  /// Keep positions at most this many moves from a position seen in more
  /// than one game.
  #[arg(long)]
  max_closeness: Option<u32>,

  /// Positions deleted per transaction.
  #[arg(long)]
  batch_size: Option<usize>,

  /// Skip reclaiming disk space afterwards.
  #[arg(long)]
  no_vacuum: bool,
}

pub async fn run(
  store: &SqliteStore,
  settings: &Settings,
  args: PruneArgs,
  cancel: &CancellationToken,
) -> anyhow::Result<()> {
  let max_closeness = args.max_closeness.unwrap_or(settings.max_closeness);
  let batch_size = args.batch_size.unwrap_or(settings.batch_size);

  let summary = Pruner::new(store)
    .with_cancellation(cancel.clone())
    .prune(max_closeness, batch_size)
    .await
    .context("prune failed")?;

  if !args.no_vacuum && !summary.interrupted && summary.deleted > 0 {
    info!("compacting store");
    store.compact().await.context("failed to compact store")?;
  }

  let counts = store.counts().await.context("failed to count store rows")?;
  print_json(&serde_json::json!({ "prune": summary, "store": counts }))
}
