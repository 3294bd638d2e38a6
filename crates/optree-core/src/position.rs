//! Graph nodes and edges.
//!
//! Positions are identified by a stable integer assigned on first insertion.
//! The graph may contain cycles (transpositions, repetitions), so nothing here
//! owns anything else; edges refer to positions by id only.

use serde::{Deserialize, Serialize};

use crate::{key::PositionKey, stats::PositionStats};

pub type PositionId = i64;
pub type MoveId = i64;

/// A graph node: one distinct canonical position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
  pub id:  PositionId,
  pub key: PositionKey,
}

/// A directed edge between two positions, labelled with the move as played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
  pub id:               MoveId,
  pub from_position_id: PositionId,
  pub to_position_id:   PositionId,
  pub notation:         String,
}

/// An outgoing edge joined with its destination and the destination's
/// aggregate. This is the read contract consumed by the query service.
#[derive(Debug, Clone)]
pub struct OutgoingMove {
  pub notation: String,
  pub to:       Position,
  pub stats:    Option<PositionStats>,
}
