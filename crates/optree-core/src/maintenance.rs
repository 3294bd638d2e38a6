//! Key re-normalisation for stores built before the current normaliser.
//!
//! Every stored key is run through [`normalize`](crate::key::normalize)
//! again. A key that changes is rewritten in place, or, when its new form is
//! already stored, folded into that position.

use std::collections::HashMap;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Result, key::PositionKey, position::PositionId, store::TreeStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
  pub examined:    u64,
  pub rekeyed:     u64,
  pub merged:      u64,
  /// Stored keys the normaliser rejects; left untouched.
  pub malformed:   u64,
  pub interrupted: bool,
}

/// Re-normalise every stored key. With `dry_run` nothing is written but the
/// summary reports what a real run would do.
pub async fn normalize_keys<S: TreeStore>(
  store: &S,
  dry_run: bool,
  cancel: &CancellationToken,
) -> Result<NormalizeSummary> {
  let mut positions = store.list_positions().await.map_err(Into::into)?;
  positions.sort_by_key(|p| p.id);

  let mut by_key: HashMap<PositionKey, PositionId> =
    positions.iter().map(|p| (p.key.clone(), p.id)).collect();
  let mut summary = NormalizeSummary::default();

  for position in positions {
    if cancel.is_cancelled() {
      warn!(examined = summary.examined, "key normalisation interrupted");
      summary.interrupted = true;
      break;
    }
    summary.examined += 1;

    let normalized = match PositionKey::normalize(position.key.as_str()) {
      Ok(key) => key,
      Err(e) => {
        warn!(id = position.id, key = %position.key, error = %e, "stored key is malformed");
        summary.malformed += 1;
        continue;
      }
    };
    if normalized == position.key {
      continue;
    }

    match by_key.get(&normalized).copied() {
      Some(target) => {
        debug!(from = position.id, into = target, key = %normalized, "merging position");
        if !dry_run {
          store.merge_positions(position.id, target).await.map_err(Into::into)?;
        }
        summary.merged += 1;
      }
      None => {
        debug!(id = position.id, old = %position.key, new = %normalized, "rekeying position");
        if !dry_run {
          store.rekey_position(position.id, &normalized).await.map_err(Into::into)?;
        }
        by_key.insert(normalized, position.id);
        summary.rekeyed += 1;
      }
    }
    by_key.remove(&position.key);
  }

  info!(
    examined = summary.examined,
    rekeyed = summary.rekeyed,
    merged = summary.merged,
    malformed = summary.malformed,
    dry_run,
    "key normalisation finished"
  );
  Ok(summary)
}
