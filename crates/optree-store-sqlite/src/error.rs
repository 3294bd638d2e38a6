//! Error type for `optree-store-sqlite`.

use optree_core::position::PositionId;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("position not found: {0}")]
  PositionNotFound(PositionId),

  /// The file opened read-only was never initialised as a store.
  #[error("not an opening-tree store (schema version {0})")]
  NotAStore(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// The extended SQLite result code, if this is a SQLite failure.
  fn sqlite_code(&self) -> Option<i32> {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        Some(e.extended_code)
      }
      _ => None,
    }
  }
}

impl From<Error> for optree_core::Error {
  fn from(e: Error) -> Self {
    match e.sqlite_code() {
      Some(ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
        return optree_core::Error::Conflict(e.to_string());
      }
      Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY | ffi::SQLITE_CONSTRAINT_CHECK) => {
        return optree_core::Error::Integrity(e.to_string());
      }
      _ => {}
    }
    match e {
      Error::DateParse(_) | Error::PositionNotFound(_) | Error::NotAStore(_) => {
        optree_core::Error::Integrity(e.to_string())
      }
      Error::Database(_) => optree_core::Error::StoreIo(Box::new(e)),
    }
  }
}
