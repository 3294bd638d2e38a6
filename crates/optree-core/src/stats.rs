//! Per-position aggregates.
//!
//! Only integer sums are stored. Averages are derived at read time as
//! `sum / total_games` so repeated incremental updates never accumulate
//! rounding error.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::position::PositionId;

/// Swing applied to the opponent's rating for a decisive single game under the
/// linear performance-rating approximation.
pub const PERFORMANCE_SPREAD: i64 = 400;

// ─── Game outcome ────────────────────────────────────────────────────────────

/// A side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  White,
  Black,
}

impl Side {
  pub fn opponent(self) -> Side {
    match self {
      Side::White => Side::Black,
      Side::Black => Side::White,
    }
  }
}

/// A decided game result, spelled the way game records spell it.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum GameResult {
  #[strum(serialize = "1-0")]
  #[serde(rename = "1-0")]
  WhiteWin,
  #[strum(serialize = "0-1")]
  #[serde(rename = "0-1")]
  BlackWin,
  #[strum(serialize = "1/2-1/2")]
  #[serde(rename = "1/2-1/2")]
  Draw,
}

impl GameResult {
  /// `1` for a win, `0` for a draw, `-1` for a loss, from `side`'s view.
  pub fn outcome_for(self, side: Side) -> i64 {
    match (self, side) {
      (GameResult::Draw, _) => 0,
      (GameResult::WhiteWin, Side::White) | (GameResult::BlackWin, Side::Black) => 1,
      _ => -1,
    }
  }
}

/// Single-game performance rating: the opponent's rating shifted by
/// [`PERFORMANCE_SPREAD`] towards the result.
pub fn performance_rating(opponent_rating: u32, result: GameResult, side: Side) -> i64 {
  i64::from(opponent_rating) + PERFORMANCE_SPREAD * result.outcome_for(side)
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Stored aggregate for one position.
///
/// Invariant: `total_games == white_wins + black_wins + draws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionStats {
  pub position_id:              PositionId,
  pub total_games:              i64,
  pub white_wins:               i64,
  pub black_wins:               i64,
  pub draws:                    i64,
  pub total_player_elo:         i64,
  pub total_player_performance: i64,
  /// ISO-8601 date prefix (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`), or empty.
  pub last_played_date:         String,
  /// A representative game for this position.
  pub game_ref:                 Option<String>,
}

impl PositionStats {
  /// Anchored positions are never pruned and seed the closeness search.
  pub fn is_anchored(&self) -> bool { self.total_games > 1 }

  /// Integer-truncated average rating of the credited players.
  pub fn average_rating(&self) -> i64 { average(self.total_player_elo, self.total_games) }

  /// Integer-truncated average performance of the credited players.
  pub fn average_performance(&self) -> i64 {
    average(self.total_player_performance, self.total_games)
  }

  /// White-win / draw / black-win percentages.
  pub fn wdl_percent(&self) -> (f64, f64, f64) {
    if self.total_games == 0 {
      return (0.0, 0.0, 0.0);
    }
    let total = self.total_games as f64;
    (
      100.0 * self.white_wins as f64 / total,
      100.0 * self.draws as f64 / total,
      100.0 * self.black_wins as f64 / total,
    )
  }
}

fn average(sum: i64, count: i64) -> i64 {
  if count == 0 { 0 } else { sum / count }
}

// ─── Delta ───────────────────────────────────────────────────────────────────

/// An additive contribution merged into a [`PositionStats`] row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsDelta {
  pub total_games:        i64,
  pub white_wins:         i64,
  pub black_wins:         i64,
  pub draws:              i64,
  pub player_elo:         i64,
  pub player_performance: i64,
  pub played_date:        String,
  pub game_ref:           Option<String>,
}

impl StatsDelta {
  /// One game's contribution, crediting `credited` (the side that made the
  /// move reaching the position).
  pub fn for_game(
    result:     GameResult,
    white_elo:  u32,
    black_elo:  u32,
    credited:   Side,
    date:       &str,
    game_ref:   Option<&str>,
  ) -> Self {
    let (own, opponent) = match credited {
      Side::White => (white_elo, black_elo),
      Side::Black => (black_elo, white_elo),
    };
    Self {
      total_games:        1,
      white_wins:         i64::from(result == GameResult::WhiteWin),
      black_wins:         i64::from(result == GameResult::BlackWin),
      draws:              i64::from(result == GameResult::Draw),
      player_elo:         i64::from(own),
      player_performance: performance_rating(opponent, result, credited),
      played_date:        date.to_owned(),
      game_ref:           game_ref.map(str::to_owned),
    }
  }
}

impl From<&PositionStats> for StatsDelta {
  /// The whole aggregate as a delta, for folding one position into another.
  fn from(stats: &PositionStats) -> Self {
    Self {
      total_games:        stats.total_games,
      white_wins:         stats.white_wins,
      black_wins:         stats.black_wins,
      draws:              stats.draws,
      player_elo:         stats.total_player_elo,
      player_performance: stats.total_player_performance,
      played_date:        stats.last_played_date.clone(),
      game_ref:           stats.game_ref.clone(),
    }
  }
}
