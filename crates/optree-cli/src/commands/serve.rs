//! `optree serve`: the read-only HTTP API.

use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context as _, bail};
use clap::Args;
use optree_api::Trees;
use optree_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::settings::{Settings, TreeConfig};

/// A `name:path` pair given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeArg(TreeConfig);

impl FromStr for TreeArg {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some((name, path)) if !name.is_empty() && !path.is_empty() => {
        Ok(Self(TreeConfig { name: name.to_owned(), path: PathBuf::from(path) }))
      }
      _ => Err(format!("expected NAME:PATH, got {s:?}")),
    }
  }
}

#[derive(Args)]
pub struct ServeArgs {
  /// Trees to serve; replaces the `trees` list from the settings.
  #[arg(long, value_name = "NAME:PATH", num_args = 1..)]
  trees: Vec<TreeArg>,

  #[arg(long)]
  host: Option<String>,

  #[arg(long)]
  port: Option<u16>,
}

pub async fn run(settings: &Settings, args: ServeArgs, cancel: CancellationToken) -> anyhow::Result<()> {
  let configured: Vec<TreeConfig> = if args.trees.is_empty() {
    settings.trees.clone()
  } else {
    args.trees.into_iter().map(|t| t.0).collect()
  };
  if configured.is_empty() {
    bail!("no trees to serve; pass --trees NAME:PATH or list them in the config file");
  }

  let mut trees = Trees::new();
  for tree in configured {
    let store = SqliteStore::open_read_only(&tree.path)
      .await
      .with_context(|| format!("failed to open tree {:?} at {}", tree.name, tree.path.display()))?;
    info!(name = %tree.name, path = %tree.path.display(), "tree opened");
    trees.insert(tree.name, Arc::new(store));
  }

  let app = optree_api::router(Arc::new(trees));
  let host = args.host.unwrap_or_else(|| settings.host.clone());
  let port = args.port.unwrap_or(settings.port);
  let address = format!("{host}:{port}");

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await
    .context("server error")?;

  Ok(())
}
