//! The query read contract: a position and its continuations.
//!
//! Games that record a spurious en-passant target and games that do not can
//! store one logical position under two keys. A query merges the outgoing
//! moves of every such variant, de-duplicated by move notation with the
//! exact match seen first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  key::PositionKey,
  position::{OutgoingMove, Position},
  store::TreeStore,
};

/// One continuation from the queried position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
  #[serde(rename = "move")]
  pub notation:         String,
  pub key:              PositionKey,
  pub total_games:      i64,
  pub white_wins:       i64,
  pub draws:            i64,
  pub black_wins:       i64,
  pub last_played_date: String,
  pub game_ref:         Option<String>,
  /// Average rating of the players who chose this move.
  pub rating:           i64,
  /// Average performance of the players who chose this move.
  pub performance:      i64,
}

impl From<OutgoingMove> for MoveReport {
  fn from(m: OutgoingMove) -> Self {
    let Some(stats) = m.stats else {
      return Self {
        notation:         m.notation,
        key:              m.to.key,
        total_games:      0,
        white_wins:       0,
        draws:            0,
        black_wins:       0,
        last_played_date: String::new(),
        game_ref:         None,
        rating:           0,
        performance:      0,
      };
    };
    Self {
      rating: stats.average_rating(),
      performance: stats.average_performance(),
      notation: m.notation,
      key: m.to.key,
      total_games: stats.total_games,
      white_wins: stats.white_wins,
      draws: stats.draws,
      black_wins: stats.black_wins,
      last_played_date: stats.last_played_date,
      game_ref: stats.game_ref,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
  pub key:   PositionKey,
  pub moves: Vec<MoveReport>,
}

/// Concatenate move lists, keeping the first occurrence of each notation,
/// then order by popularity (ties by notation).
pub fn merge_moves<I>(lists: I) -> Vec<MoveReport>
where
  I: IntoIterator<Item = Vec<MoveReport>>,
{
  let mut seen = HashSet::new();
  let mut merged: Vec<MoveReport> = lists
    .into_iter()
    .flatten()
    .filter(|m| seen.insert(m.notation.clone()))
    .collect();
  merged.sort_by(|a, b| {
    b.total_games
      .cmp(&a.total_games)
      .then_with(|| a.notation.cmp(&b.notation))
  });
  merged
}

/// Order in which variants are consulted: the exact key, then the variant
/// without an en-passant target, then the rest by key.
fn variant_rank(queried: &PositionKey, position: &Position) -> (u8, String) {
  let rank = if position.key == *queried {
    0
  } else if position.key.en_passant().is_none() {
    1
  } else {
    2
  };
  (rank, position.key.as_str().to_owned())
}

/// Look up `descriptor` (a full descriptor or a key) and report its moves.
///
/// When the normalised key carries an en-passant target only the exact key
/// and its stripped form are merged. Without one, every en-passant variant of
/// the position is merged. `None` if no variant is stored.
pub async fn query_position<S: TreeStore>(
  store: &S,
  descriptor: &str,
) -> Result<Option<PositionReport>> {
  let key = PositionKey::normalize(descriptor)?;

  let mut variants = store.find_variants(&key).await.map_err(Into::into)?;
  if let Some(stripped) = key.without_en_passant() {
    variants.retain(|p| p.key == key || p.key == stripped);
  }
  if variants.is_empty() {
    return Ok(None);
  }
  variants.sort_by_cached_key(|p| variant_rank(&key, p));

  let mut lists = Vec::with_capacity(variants.len());
  for position in &variants {
    let moves = store.outgoing_moves(position.id).await.map_err(Into::into)?;
    lists.push(moves.into_iter().map(MoveReport::from).collect());
  }

  Ok(Some(PositionReport { key, moves: merge_moves(lists) }))
}
