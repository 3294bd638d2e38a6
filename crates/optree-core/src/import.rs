//! The importer. Folds game records into the graph.
//!
//! Each game becomes one [`GamePath`] applied in a single store transaction.
//! Bad games are counted and skipped; a store failure aborts the source
//! without marking it imported, so a retry starts the source from scratch.

use std::collections::HashSet;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  key::PositionKey,
  stats::{GameResult, Side, StatsDelta},
  store::{GamePath, GameStep, SourceStamp, TreeStore},
};

// ─── Input ───────────────────────────────────────────────────────────────────

/// One half-move as replayed by the rules engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
  /// The move in standard algebraic notation.
  pub notation:   String,
  /// Full descriptor of the position after the move.
  pub descriptor: String,
}

/// A game ready for import: metadata plus its replayed main line.
#[derive(Debug, Clone)]
pub struct GameRecord {
  pub white_elo: u32,
  pub black_elo: u32,
  pub result:    GameResult,
  /// ISO-8601 date prefix, or empty when unknown.
  pub date:      String,
  pub game_ref:  Option<String>,
  pub plies:     Vec<Ply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
  /// Half-moves replayed per game.
  pub max_ply:    usize,
  /// Games where either player is rated below this are skipped.
  pub min_rating: u32,
}

impl Default for ImportOptions {
  fn default() -> Self { Self { max_ply: 30, min_rating: 0 } }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
  pub source:            String,
  /// The source was already imported with identical content.
  pub skipped_source:    bool,
  pub games_read:        u64,
  pub games_imported:    u64,
  /// Skipped by policy: rating filter or unsupported game type.
  pub games_filtered:    u64,
  /// Skipped because the record or one of its moves was malformed.
  pub games_failed:      u64,
  pub positions_created: u64,
  pub moves_created:     u64,
  /// A stop was requested; the source was not marked imported.
  pub interrupted:       bool,
}

// ─── Importer ────────────────────────────────────────────────────────────────

pub struct Importer<'s, S> {
  store:   &'s S,
  options: ImportOptions,
  cancel:  CancellationToken,
}

impl<'s, S: TreeStore> Importer<'s, S> {
  pub fn new(store: &'s S, options: ImportOptions) -> Self {
    Self { store, options, cancel: CancellationToken::new() }
  }

  /// Stop between games once `token` is cancelled.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  /// Import every game from one source.
  ///
  /// Skips the source entirely if it was already imported with the same
  /// hash and modification time. Per-game errors (`MalformedInput`,
  /// `Unsupported`) are counted; any other error aborts the source.
  ///
  /// `games` is pulled on the calling task. Sources that block on file
  /// reads belong in [`import_channel`](Self::import_channel).
  pub async fn import_source<I>(&self, stamp: &SourceStamp, games: I) -> Result<ImportSummary>
  where
    I: IntoIterator<Item = Result<GameRecord>>,
  {
    let mut summary = self.begin(stamp).await?;
    if summary.skipped_source {
      return Ok(summary);
    }

    for game in games {
      if self.stop_requested(stamp, &mut summary) {
        return Ok(summary);
      }
      self.apply(stamp, game, &mut summary).await?;
    }

    self.finish(stamp, summary).await
  }

  /// Like [`import_source`](Self::import_source), with games produced
  /// elsewhere (typically a blocking reader thread) and received over
  /// `games`. The source is recorded once the sender side closes.
  pub async fn import_channel(
    &self,
    stamp: &SourceStamp,
    mut games: mpsc::Receiver<Result<GameRecord>>,
  ) -> Result<ImportSummary> {
    let mut summary = self.begin(stamp).await?;
    if summary.skipped_source {
      return Ok(summary);
    }

    while let Some(game) = games.recv().await {
      if self.stop_requested(stamp, &mut summary) {
        return Ok(summary);
      }
      self.apply(stamp, game, &mut summary).await?;
    }

    self.finish(stamp, summary).await
  }

  async fn begin(&self, stamp: &SourceStamp) -> Result<ImportSummary> {
    let mut summary = ImportSummary { source: stamp.path.clone(), ..Default::default() };

    if self.store.was_imported(stamp).await.map_err(Into::into)? {
      info!(source = %stamp.path, "source already imported, skipping");
      summary.skipped_source = true;
      return Ok(summary);
    }

    info!(
      source = %stamp.path,
      max_ply = self.options.max_ply,
      min_rating = self.options.min_rating,
      "importing source"
    );
    Ok(summary)
  }

  fn stop_requested(&self, stamp: &SourceStamp, summary: &mut ImportSummary) -> bool {
    if !self.cancel.is_cancelled() {
      return false;
    }
    warn!(
      source = %stamp.path,
      games_read = summary.games_read,
      "import interrupted; source not recorded"
    );
    summary.interrupted = true;
    true
  }

  /// Fold one game into the store, or count why it was skipped.
  async fn apply(
    &self,
    stamp: &SourceStamp,
    game: Result<GameRecord>,
    summary: &mut ImportSummary,
  ) -> Result<()> {
    summary.games_read += 1;
    let game = match game {
      Ok(game) => game,
      Err(Error::Unsupported(reason)) => {
        debug!(game = summary.games_read, %reason, "skipping unsupported game");
        summary.games_filtered += 1;
        return Ok(());
      }
      Err(Error::MalformedInput(reason)) => {
        warn!(game = summary.games_read, %reason, "skipping malformed game");
        summary.games_failed += 1;
        return Ok(());
      }
      Err(e) => return Err(e),
    };

    if game.white_elo < self.options.min_rating || game.black_elo < self.options.min_rating {
      summary.games_filtered += 1;
      return Ok(());
    }

    let path = match game_path(&game, self.options.max_ply) {
      Ok(path) => path,
      Err(e) => {
        warn!(game = summary.games_read, error = %e, "skipping game with malformed position");
        summary.games_failed += 1;
        return Ok(());
      }
    };

    match self.store.record_game(&path).await {
      Ok(applied) => {
        summary.games_imported += 1;
        summary.positions_created += applied.positions_created;
        summary.moves_created += applied.moves_created;
        Ok(())
      }
      Err(e) => {
        let e: Error = e.into();
        error!(
          source = %stamp.path,
          games_imported = summary.games_imported,
          error = %e,
          "store failure; source aborted and not recorded"
        );
        Err(e)
      }
    }
  }

  async fn finish(&self, stamp: &SourceStamp, summary: ImportSummary) -> Result<ImportSummary> {
    self.store.record_imported(stamp).await.map_err(Into::into)?;
    info!(
      source = %stamp.path,
      read = summary.games_read,
      imported = summary.games_imported,
      filtered = summary.games_filtered,
      failed = summary.games_failed,
      "source imported"
    );
    Ok(summary)
  }
}

/// Normalise a game's main line into the edges and per-position
/// contributions it adds, truncated to `max_ply` half-moves.
pub fn game_path(game: &GameRecord, max_ply: usize) -> Result<GamePath> {
  let mut path = GamePath::default();
  let mut seen = HashSet::new();

  let mut current = PositionKey::initial();
  contribute(&mut path, &mut seen, &current, game);

  for ply in game.plies.iter().take(max_ply) {
    let next = PositionKey::normalize(&ply.descriptor)?;
    path.steps.push(GameStep {
      from:     current,
      to:       next.clone(),
      notation: ply.notation.clone(),
    });
    contribute(&mut path, &mut seen, &next, game);
    current = next;
  }

  Ok(path)
}

/// Credit `game` to `key` unless this game already reached it.
fn contribute(
  path: &mut GamePath,
  seen: &mut HashSet<PositionKey>,
  key:  &PositionKey,
  game: &GameRecord,
) {
  if !seen.insert(key.clone()) {
    return;
  }
  let delta = StatsDelta::for_game(
    game.result,
    game.white_elo,
    game.black_elo,
    credited_side(key),
    &game.date,
    game.game_ref.as_deref(),
  );
  path.contributions.push((key.clone(), delta));
}

/// The player credited at a position: the side that made the move reaching
/// it, i.e. the side *not* to move. The starting position credits Black.
pub fn credited_side(key: &PositionKey) -> Side {
  match key.side_to_move() {
    "b" => Side::White,
    _ => Side::Black,
  }
}
