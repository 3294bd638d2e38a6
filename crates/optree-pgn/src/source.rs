//! Locating and fingerprinting PGN sources.

use std::{
  fs::{self, File},
  io,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use optree_core::store::SourceStamp;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Error, Result};

/// Identify a source file by absolute path, SHA-256 of its content and
/// modification time.
pub fn fingerprint(path: &Path) -> Result<SourceStamp> {
  let absolute = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
  let metadata = fs::metadata(&absolute).map_err(|e| Error::io(&absolute, e))?;
  let modified = metadata.modified().map_err(|e| Error::io(&absolute, e))?;

  let mut file = File::open(&absolute).map_err(|e| Error::io(&absolute, e))?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(|e| Error::io(&absolute, e))?;

  Ok(SourceStamp {
    path:          absolute.display().to_string(),
    content_hash:  hex::encode(hasher.finalize()),
    last_modified: DateTime::<Utc>::from(modified),
  })
}

fn is_pgn_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("pgn"))
}

/// Expand command-line inputs into the list of files to import.
///
/// Files are taken as given, whatever their extension. Directories are
/// walked recursively for `*.pgn` files, which are returned in sorted order.
pub fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
  let mut sources = Vec::new();
  for input in inputs {
    if input.is_file() {
      sources.push(input.clone());
    } else if input.is_dir() {
      let mut found = Vec::new();
      walk(input, &mut found)?;
      found.sort();
      debug!(dir = %input.display(), files = found.len(), "collected pgn files");
      sources.extend(found);
    } else {
      return Err(Error::NotASource(input.clone()));
    }
  }
  Ok(sources)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
  let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
  for entry in entries {
    let path = entry.map_err(|e| Error::io(dir, e))?.path();
    if path.is_dir() {
      walk(&path, found)?;
    } else if is_pgn_file(&path) {
      found.push(path);
    }
  }
  Ok(())
}
