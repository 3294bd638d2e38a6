//! `optree normalize-keys`: bring stored keys up to the current normaliser.

use anyhow::Context as _;
use clap::Args;
use optree_core::maintenance::normalize_keys;
use optree_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;

use crate::commands::print_json;

#[derive(Args)]
pub struct NormalizeArgs {
  /// Report what would change without writing.
  #[arg(long)]
  dry_run: bool,
}

pub async fn run(
  store: &SqliteStore,
  args: NormalizeArgs,
  cancel: &CancellationToken,
) -> anyhow::Result<()> {
  let summary = normalize_keys(store, args.dry_run, cancel)
    .await
    .context("key normalisation failed")?;
  print_json(&summary)
}
