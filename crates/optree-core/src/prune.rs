//! The prune engine. Trims rarely-visited branches far from busy positions.
//!
//! A position is *anchored* when more than one game reached it. Its
//! *closeness* is the number of edge hops, ignoring direction, to the nearest
//! anchored position. Every position whose closeness exceeds the limit (or
//! that no anchor reaches at all) is deleted, in fixed-size batches that each
//! commit atomically.
//!
//! Closeness is recomputed from scratch on every run.

use std::collections::{HashMap, VecDeque, hash_map::Entry};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  position::PositionId,
  store::{GraphSnapshot, TreeStore},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
  pub positions_examined: u64,
  pub anchored:           u64,
  /// Positions within reach of an anchor, anchors included.
  pub retained:           u64,
  pub candidates:         u64,
  pub deleted:            u64,
  pub batches_committed:  u64,
  /// A stop was requested; remaining batches were not attempted.
  pub interrupted:        bool,
}

// ─── Closeness ───────────────────────────────────────────────────────────────

/// Multi-source breadth-first search from every anchored position over the
/// undirected graph, bounded at `max_closeness` hops.
///
/// Returns the closeness of every position reached. Positions absent from
/// the map are further than `max_closeness` from any anchor.
pub fn closeness(snapshot: &GraphSnapshot, max_closeness: u32) -> HashMap<PositionId, u32> {
  let mut neighbours: HashMap<PositionId, Vec<PositionId>> =
    HashMap::with_capacity(snapshot.positions.len());
  for &(from, to) in &snapshot.edges {
    if from == to {
      continue;
    }
    neighbours.entry(from).or_default().push(to);
    neighbours.entry(to).or_default().push(from);
  }

  let mut reached: HashMap<PositionId, u32> = HashMap::with_capacity(snapshot.anchored.len());
  let mut queue = VecDeque::new();
  for &anchor in &snapshot.anchored {
    if let Entry::Vacant(slot) = reached.entry(anchor) {
      slot.insert(0);
      queue.push_back((anchor, 0));
    }
  }

  while let Some((id, distance)) = queue.pop_front() {
    if distance == max_closeness {
      continue;
    }
    for &next in neighbours.get(&id).into_iter().flatten() {
      if let Entry::Vacant(slot) = reached.entry(next) {
        slot.insert(distance + 1);
        queue.push_back((next, distance + 1));
      }
    }
  }

  reached
}

/// Positions to delete, ascending by id.
pub fn deletion_candidates(snapshot: &GraphSnapshot, max_closeness: u32) -> Vec<PositionId> {
  unreached(snapshot, &closeness(snapshot, max_closeness))
}

/// Positions of `snapshot` absent from `reached`, ascending by id.
fn unreached(snapshot: &GraphSnapshot, reached: &HashMap<PositionId, u32>) -> Vec<PositionId> {
  let mut candidates: Vec<PositionId> = snapshot
    .positions
    .iter()
    .copied()
    .filter(|id| !reached.contains_key(id))
    .collect();
  candidates.sort_unstable();
  candidates.dedup();
  candidates
}

// ─── Pruner ──────────────────────────────────────────────────────────────────

pub struct Pruner<'s, S> {
  store:  &'s S,
  cancel: CancellationToken,
}

impl<'s, S: TreeStore> Pruner<'s, S> {
  pub fn new(store: &'s S) -> Self { Self { store, cancel: CancellationToken::new() } }

  /// Stop between batches once `token` is cancelled.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  /// Delete every position further than `max_closeness` hops from an
  /// anchored position, `batch_size` positions per transaction.
  ///
  /// A failing batch aborts the run; batches committed before it stand.
  pub async fn prune(&self, max_closeness: u32, batch_size: usize) -> Result<PruneSummary> {
    if batch_size == 0 {
      return Err(Error::MalformedInput("batch size must be at least 1".into()));
    }

    let snapshot = self.store.graph_snapshot().await.map_err(Into::into)?;
    let reached = closeness(&snapshot, max_closeness);
    let candidates = unreached(&snapshot, &reached);

    let mut summary = PruneSummary {
      positions_examined: snapshot.positions.len() as u64,
      anchored: snapshot.anchored.len() as u64,
      retained: reached.len() as u64,
      candidates: candidates.len() as u64,
      ..Default::default()
    };
    info!(
      positions = summary.positions_examined,
      anchored = summary.anchored,
      candidates = summary.candidates,
      max_closeness,
      "closeness computed"
    );

    for batch in candidates.chunks(batch_size) {
      if self.cancel.is_cancelled() {
        warn!(deleted = summary.deleted, "prune interrupted at batch boundary");
        summary.interrupted = true;
        break;
      }

      match self.store.delete_subset(batch).await {
        Ok(deleted) => {
          summary.deleted += deleted;
          summary.batches_committed += 1;
          debug!(batch = summary.batches_committed, deleted = summary.deleted, "batch committed");
        }
        Err(e) => {
          let e: Error = e.into();
          error!(
            batches_committed = summary.batches_committed,
            deleted = summary.deleted,
            error = %e,
            "prune batch failed; remaining batches abandoned"
          );
          return Err(e);
        }
      }
    }

    info!(deleted = summary.deleted, batches = summary.batches_committed, "prune finished");
    Ok(summary)
  }
}
