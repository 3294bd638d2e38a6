//! Main-line replay: SAN tokens in, plies with position descriptors out.

use optree_core::{Error, Result, import::Ply};
use shakmaty::{Chess, EnPassantMode, fen::Fen, san::SanPlus};

/// Play `moves` from the standard starting position.
///
/// Each ply records the move as re-derived from the position (so check and
/// mate suffixes are always right) and the full descriptor after it. The
/// descriptor always names the en-passant square after a double push; the
/// normaliser decides whether it matters.
pub fn replay(moves: &[SanPlus]) -> Result<Vec<Ply>> {
  let mut pos = Chess::default();
  let mut plies = Vec::with_capacity(moves.len());

  for (index, san_plus) in moves.iter().enumerate() {
    let m = san_plus.san.to_move(&pos).map_err(|e| {
      Error::MalformedInput(format!("move {} ({san_plus}) is not playable: {e}", index + 1))
    })?;
    let notation = SanPlus::from_move_and_play_unchecked(&mut pos, &m);
    let descriptor = Fen::from_position(pos.clone(), EnPassantMode::Always).to_string();
    plies.push(Ply { notation: notation.to_string(), descriptor });
  }

  Ok(plies)
}
