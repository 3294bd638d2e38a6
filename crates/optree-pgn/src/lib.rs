//! Game-record ingestion for the opening-tree store.
//!
//! Reads PGN files with [`pgn_reader`], replays each main line with
//! [`shakmaty`] and hands the importer ready-made
//! [`GameRecord`](optree_core::import::GameRecord)s. Also fingerprints source
//! files so unchanged files are not imported twice.

pub mod date;
pub mod error;
pub mod reader;
pub mod replay;
pub mod source;

pub use error::{Error, Result};
pub use reader::PgnSource;
pub use source::{collect_sources, fingerprint};
