//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Position keys are stored as
//! their canonical text.

use chrono::{DateTime, Utc};
use optree_core::{
  PositionKey,
  position::{OutgoingMove, Position},
  stats::PositionStats,
  store::ImportedFile,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for a stats row, in this order.
pub const STATS_COLUMNS: &str = "position_id, total_games, white_wins, black_wins, draws,
   total_player_elo, total_player_performance, last_played_date, game_ref";

/// Read a [`PositionStats`] from `row`, starting at column `offset` in
/// [`STATS_COLUMNS`] order.
pub fn stats_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<PositionStats> {
  Ok(PositionStats {
    position_id:              row.get(offset)?,
    total_games:              row.get(offset + 1)?,
    white_wins:               row.get(offset + 2)?,
    black_wins:               row.get(offset + 3)?,
    draws:                    row.get(offset + 4)?,
    total_player_elo:         row.get(offset + 5)?,
    total_player_performance: row.get(offset + 6)?,
    last_played_date:         row.get(offset + 7)?,
    game_ref:                 row.get(offset + 8)?,
  })
}

pub fn position_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Position> {
  Ok(Position { id: row.get(0)?, key: PositionKey::from_canonical(row.get(1)?) })
}

/// An outgoing edge joined with its destination and, when present, the
/// destination's stats row.
pub struct RawOutgoing {
  pub notation: String,
  pub to:       Position,
  pub stats:    Option<PositionStats>,
}

impl RawOutgoing {
  pub fn into_outgoing(self) -> OutgoingMove {
    OutgoingMove { notation: self.notation, to: self.to, stats: self.stats }
  }
}

/// Raw strings read directly from an `imported_files` row.
pub struct RawImportedFile {
  pub path:          String,
  pub content_hash:  String,
  pub last_modified: String,
  pub processed_at:  String,
}

impl RawImportedFile {
  pub fn into_imported_file(self) -> Result<ImportedFile> {
    Ok(ImportedFile {
      path:          self.path,
      content_hash:  self.content_hash,
      last_modified: decode_dt(&self.last_modified)?,
      processed_at:  decode_dt(&self.processed_at)?,
    })
  }
}
