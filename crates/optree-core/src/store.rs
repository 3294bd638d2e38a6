//! The `TreeStore` trait and the records it exchanges.
//!
//! The trait is implemented by storage backends (e.g. `optree-store-sqlite`).
//! The importer, the prune engine and the query service depend on this
//! abstraction, not on any concrete backend.
//!
//! Writers are serialised externally: one importer or pruner per store at a
//! time. Every method that changes more than one row does so atomically.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  key::PositionKey,
  position::{Move, OutgoingMove, Position, PositionId},
  stats::{PositionStats, StatsDelta},
};

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Identity of a game source at the moment it is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
  pub path:          String,
  pub content_hash:  String,
  pub last_modified: DateTime<Utc>,
}

/// A source recorded as fully imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedFile {
  pub path:          String,
  pub content_hash:  String,
  pub last_modified: DateTime<Utc>,
  pub processed_at:  DateTime<Utc>,
}

impl ImportedFile {
  /// Whether `stamp` describes exactly the content recorded here.
  pub fn matches(&self, stamp: &SourceStamp) -> bool {
    self.path == stamp.path
      && self.content_hash == stamp.content_hash
      && self.last_modified == stamp.last_modified
  }
}

// ─── Game application ────────────────────────────────────────────────────────

/// One edge traversed by a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStep {
  pub from:     PositionKey,
  pub to:       PositionKey,
  pub notation: String,
}

/// Everything one game contributes to the graph, applied as a single unit by
/// [`TreeStore::record_game`].
#[derive(Debug, Clone, Default)]
pub struct GamePath {
  pub steps:         Vec<GameStep>,
  /// One entry per distinct position visited, in visiting order.
  pub contributions: Vec<(PositionKey, StatsDelta)>,
}

/// Rows created while applying a [`GamePath`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameApplied {
  pub positions_created: u64,
  pub moves_created:     u64,
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// The graph's shape, as needed by the prune engine.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
  pub positions: Vec<PositionId>,
  /// Positions with `total_games > 1`.
  pub anchored:  Vec<PositionId>,
  /// Distinct `(from, to)` pairs over all edges.
  pub edges:     Vec<(PositionId, PositionId)>,
}

/// Row counts, for operator reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
  pub positions:      u64,
  pub moves:          u64,
  pub imported_files: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an opening-tree store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait TreeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Positions and moves ───────────────────────────────────────────────

  /// Look a position up by its canonical key.
  fn find_position<'a>(
    &'a self,
    key: &'a PositionKey,
  ) -> impl Future<Output = Result<Option<Position>, Self::Error>> + Send + 'a;

  /// Every stored position whose placement, side to move and castling rights
  /// match `key`, whatever its en-passant field. `key` itself included.
  fn find_variants<'a>(
    &'a self,
    key: &'a PositionKey,
  ) -> impl Future<Output = Result<Vec<Position>, Self::Error>> + Send + 'a;

  /// Insert a new position. Fails with a conflict if the key already exists;
  /// callers check first.
  fn insert_position<'a>(
    &'a self,
    key: &'a PositionKey,
  ) -> impl Future<Output = Result<Position, Self::Error>> + Send + 'a;

  /// Insert an edge. Duplicate `(from, to, notation)` edges are not
  /// rejected.
  fn insert_move<'a>(
    &'a self,
    from: PositionId,
    to: PositionId,
    notation: &'a str,
  ) -> impl Future<Output = Result<Move, Self::Error>> + Send + 'a;

  /// Merge `delta` into the position's aggregate, creating it if absent.
  fn upsert_stats<'a>(
    &'a self,
    position_id: PositionId,
    delta: &'a StatsDelta,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_stats(
    &self,
    position_id: PositionId,
  ) -> impl Future<Output = Result<Option<PositionStats>, Self::Error>> + Send + '_;

  /// Apply one game atomically: ensure every position and edge on the path
  /// exists, then merge each contribution.
  fn record_game<'a>(
    &'a self,
    path: &'a GamePath,
  ) -> impl Future<Output = Result<GameApplied, Self::Error>> + Send + 'a;

  /// Edges leaving `position_id`, joined with destination and its stats.
  fn outgoing_moves(
    &self,
    position_id: PositionId,
  ) -> impl Future<Output = Result<Vec<OutgoingMove>, Self::Error>> + Send + '_;

  // ── Provenance ────────────────────────────────────────────────────────

  /// Whether this exact source content was already imported.
  fn was_imported<'a>(
    &'a self,
    stamp: &'a SourceStamp,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Record (or refresh) the import of a source.
  fn record_imported<'a>(
    &'a self,
    stamp: &'a SourceStamp,
  ) -> impl Future<Output = Result<ImportedFile, Self::Error>> + Send + 'a;

  // ── Maintenance ───────────────────────────────────────────────────────

  fn graph_snapshot(
    &self,
  ) -> impl Future<Output = Result<GraphSnapshot, Self::Error>> + Send + '_;

  /// Delete positions, every edge touching them and their aggregates in a
  /// single transaction. Returns the number of positions removed.
  fn delete_subset<'a>(
    &'a self,
    position_ids: &'a [PositionId],
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  fn list_positions(
    &self,
  ) -> impl Future<Output = Result<Vec<Position>, Self::Error>> + Send + '_;

  /// Change a position's key in place. Fails with a conflict if the new key
  /// is taken.
  fn rekey_position<'a>(
    &'a self,
    position_id: PositionId,
    key: &'a PositionKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fold position `from` into `into`: aggregates are summed, edges are
  /// re-pointed (dropping ones that would duplicate an existing edge) and
  /// `from` is deleted. Atomic.
  fn merge_positions(
    &self,
    from: PositionId,
    into: PositionId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Reclaim space after large deletions.
  fn compact(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn counts(&self) -> impl Future<Output = Result<StoreCounts, Self::Error>> + Send + '_;
}
