//! Error type for `optree-pgn`.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{0} is neither a file nor a directory")]
  NotASource(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    Error::Io { path: path.into(), source }
  }
}

impl From<Error> for optree_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Io { source, .. } => optree_core::Error::SourceIo(source),
      Error::NotASource(_) => {
        optree_core::Error::SourceIo(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
      }
    }
  }
}
