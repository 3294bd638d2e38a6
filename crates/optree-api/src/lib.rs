//! Read-only JSON API over one or more named opening trees.
//!
//! Exposes an axum [`Router`] backed by any [`optree_core::store::TreeStore`].
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/` | `[{"name", "path"}]` for every tree |
//! | `GET`  | `/{tree}/{descriptor}` | URL-encoded descriptor; 404 if unknown |

pub mod error;
pub mod trees;

use std::{collections::BTreeMap, sync::Arc};

use axum::{Router, routing::get};
use optree_core::store::TreeStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Named trees served by the API, ordered by name.
pub type Trees<S> = BTreeMap<String, Arc<S>>;

/// Build the API router for `trees`.
pub fn router<S>(trees: Arc<Trees<S>>) -> Router<()>
where
  S: TreeStore + 'static,
{
  Router::new()
    .route("/", get(trees::list::<S>))
    .route("/{tree}/{*descriptor}", get(trees::position::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(trees)
}
