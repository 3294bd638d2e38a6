//! Layered configuration: defaults, then an optional TOML file, then
//! `OPTREE_*` environment variables. Command-line flags are applied on top
//! by each command.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// A tree served by `optree serve`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeConfig {
  pub name: String,
  pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:    PathBuf,
  pub max_ply:       usize,
  pub min_rating:    u32,
  pub max_closeness: u32,
  pub batch_size:    usize,
  pub host:          String,
  pub port:          u16,
  pub trees:         Vec<TreeConfig>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:    PathBuf::from("opening_tree.db"),
      max_ply:       30,
      min_rating:    0,
      max_closeness: 5,
      batch_size:    1000,
      host:          "127.0.0.1".to_owned(),
      port:          2882,
      trees:         Vec::new(),
    }
  }
}

impl Settings {
  /// Load settings from `path` (if it exists) and the environment.
  ///
  /// Relative tree paths in the file are resolved against the file's
  /// directory.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let mut settings: Settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("OPTREE"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise settings")?;

    let base = path.parent().unwrap_or(Path::new(""));
    for tree in &mut settings.trees {
      if tree.path.is_relative() {
        tree.path = base.join(&tree.path);
      }
    }
    Ok(settings)
  }
}
