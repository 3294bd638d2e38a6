//! Core types and algorithms for the opening-tree store.
//!
//! This crate is free of database, HTTP and chess-rules dependencies. Storage
//! backends implement [`store::TreeStore`]; the importer, the prune engine and
//! the query read contract are written against that trait.

pub mod error;
pub mod import;
pub mod key;
pub mod maintenance;
pub mod position;
pub mod prune;
pub mod query;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use key::PositionKey;
