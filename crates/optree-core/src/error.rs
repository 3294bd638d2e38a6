//! Error types for `optree-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A descriptor or game record could not be understood. The offending item
  /// is skipped; the surrounding batch continues.
  #[error("malformed input: {0}")]
  MalformedInput(String),

  /// A game the importer does not handle (chess variants, custom start
  /// positions). Counted as filtered, not failed.
  #[error("unsupported game: {0}")]
  Unsupported(String),

  /// A duplicate insert was attempted. Indicates a caller logic bug.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A deletion would have left an edge pointing at a missing position.
  #[error("integrity violation: {0}")]
  Integrity(String),

  #[error("store error: {0}")]
  StoreIo(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// Reading a game source failed part-way through.
  #[error("source read error: {0}")]
  SourceIo(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
