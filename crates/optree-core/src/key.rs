//! Position keys: the canonical, four-field form of a board descriptor.
//!
//! A descriptor in FEN layout carries six whitespace-separated fields. Only the
//! first four influence which moves can follow: piece placement, side to move,
//! castling rights and the en-passant target. The move clocks are dropped, and
//! the en-passant target is kept only when a pawn of the side to move stands
//! next to the double-pushed pawn.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Placeholder used for "no en-passant target".
pub const NO_EN_PASSANT: &str = "-";

/// Key of the standard starting position.
pub const INITIAL_KEY: &str =
  "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -";

// ─── PositionKey ─────────────────────────────────────────────────────────────

/// A canonical position key, unique per distinct position in the store.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
  /// Normalise a full descriptor into a key. See [`normalize`].
  pub fn normalize(descriptor: &str) -> Result<Self> { normalize(descriptor) }

  /// The key of the standard starting position.
  pub fn initial() -> Self { Self(INITIAL_KEY.to_owned()) }

  /// Wrap a string that is already canonical (read back from a store).
  pub fn from_canonical(key: String) -> Self { Self(key) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_string(self) -> String { self.0 }

  fn field(&self, index: usize) -> &str {
    self.0.split(' ').nth(index).unwrap_or(NO_EN_PASSANT)
  }

  pub fn placement(&self) -> &str { self.field(0) }

  pub fn side_to_move(&self) -> &str { self.field(1) }

  pub fn castling(&self) -> &str { self.field(2) }

  /// The en-passant target, if the key carries one.
  pub fn en_passant(&self) -> Option<&str> {
    let ep = self.field(3);
    (ep != NO_EN_PASSANT).then_some(ep)
  }

  /// The same position with its en-passant field forced to `-`. `None` when
  /// the key has no en-passant target to begin with.
  pub fn without_en_passant(&self) -> Option<PositionKey> {
    self.en_passant()?;
    Some(Self(format!(
      "{} {} {} {NO_EN_PASSANT}",
      self.placement(),
      self.side_to_move(),
      self.castling()
    )))
  }
}

impl fmt::Display for PositionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for PositionKey {
  fn as_ref(&self) -> &str { &self.0 }
}

impl FromStr for PositionKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { normalize(s) }
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Reduce `descriptor` to its canonical key.
///
/// Pure and idempotent. Fails with [`Error::MalformedInput`] when fewer than
/// four fields are present.
pub fn normalize(descriptor: &str) -> Result<PositionKey> {
  let fields: Vec<&str> = descriptor.split_whitespace().collect();
  let [placement, side, castling, ep, ..] = fields[..] else {
    return Err(Error::MalformedInput(format!(
      "descriptor needs at least 4 fields, got {}: {descriptor:?}",
      fields.len()
    )));
  };

  let ep = resolve_en_passant(placement, side, ep);
  Ok(PositionKey(format!("{placement} {side} {castling} {ep}")))
}

/// Decide whether an en-passant target survives normalisation.
///
/// Targets that do not look like a legal en-passant square for the side to
/// move are passed through untouched.
fn resolve_en_passant<'a>(placement: &str, side: &str, target: &'a str) -> &'a str {
  if target == NO_EN_PASSANT {
    return target;
  }

  // (capturing pawn, rank the capturer stands on, rank of the target square)
  let (pawn, capture_rank, target_rank) = match side {
    "w" => (b'P', 5, b'6'),
    "b" => (b'p', 4, b'3'),
    _ => return target,
  };

  let &[file, rank] = target.as_bytes() else {
    return target;
  };
  if !(b'a'..=b'h').contains(&file) || rank != target_rank {
    return target;
  }

  let Some(squares) = expand_rank(placement, capture_rank) else {
    return target;
  };

  let file = usize::from(file - b'a');
  let left = file.checked_sub(1);
  let right = (file < 7).then_some(file + 1);
  let capturable = [left, right]
    .into_iter()
    .flatten()
    .any(|f| squares[f] == pawn);

  if capturable { target } else { NO_EN_PASSANT }
}

/// Expand one rank (1..=8) of a placement field into eight squares, with
/// `b' '` for empty squares. `None` if the rank is not well-formed.
fn expand_rank(placement: &str, rank: usize) -> Option<[u8; 8]> {
  let ranks: Vec<&str> = placement.split('/').collect();
  if ranks.len() != 8 {
    return None;
  }
  let encoded = ranks[8 - rank];

  let mut squares = [b' '; 8];
  let mut i = 0;
  for c in encoded.bytes() {
    if c.is_ascii_digit() {
      i += usize::from(c - b'0');
    } else {
      *squares.get_mut(i)? = c;
      i += 1;
    }
    if i > 8 {
      return None;
    }
  }
  (i == 8).then_some(squares)
}
