//! Handlers for tree listing and position lookup.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use optree_core::{
  query::{PositionReport, query_position},
  store::TreeStore,
};
use serde::Serialize;
use tracing::debug;

use crate::{Trees, error::ApiError};

#[derive(Debug, Serialize)]
pub struct TreeEntry {
  pub name: String,
  pub path: String,
}

/// `GET /`
pub async fn list<S: TreeStore>(State(trees): State<Arc<Trees<S>>>) -> Json<Vec<TreeEntry>> {
  Json(
    trees
      .keys()
      .map(|name| TreeEntry { name: name.clone(), path: format!("/{name}/") })
      .collect(),
  )
}

/// `GET /{tree}/{*descriptor}`
pub async fn position<S: TreeStore>(
  State(trees): State<Arc<Trees<S>>>,
  Path((tree, descriptor)): Path<(String, String)>,
) -> Result<Json<PositionReport>, ApiError> {
  let store = trees
    .get(&tree)
    .ok_or_else(|| ApiError::NotFound(format!("Tree '{tree}' not found")))?;

  debug!(%tree, %descriptor, "position lookup");
  match query_position(store.as_ref(), &descriptor).await? {
    Some(report) => Ok(Json(report)),
    None => Err(ApiError::NotFound(format!("Position not found: {descriptor}"))),
  }
}
