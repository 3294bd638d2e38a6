//! [`SqliteStore`]: the SQLite implementation of [`TreeStore`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::{OpenFlags, OptionalExtension as _};
use tracing::debug;

use optree_core::{
  PositionKey,
  position::{Move, OutgoingMove, Position, PositionId},
  stats::{PositionStats, StatsDelta},
  store::{
    GameApplied, GamePath, GraphSnapshot, ImportedFile, SourceStamp, StoreCounts, TreeStore,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawImportedFile, RawOutgoing, STATS_COLUMNS, encode_dt, position_from_row, stats_from_row,
  },
  schema::{SCHEMA, SCHEMA_VERSION},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An opening tree backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an existing store for queries only. Every write fails.
  pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = tokio_rusqlite::Connection::open_with_flags(path, flags).await?;

    let version: i64 = conn
      .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?))
      .await?;
    if version != SCHEMA_VERSION {
      return Err(Error::NotAStore(version));
    }
    Ok(Self { conn })
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Synchronous helpers ─────────────────────────────────────────────────────
//
// These run inside `Connection::call`, usually on an open transaction.

fn find_position_id(
  conn: &rusqlite::Connection,
  key: &PositionKey,
) -> rusqlite::Result<Option<PositionId>> {
  conn
    .query_row(
      "SELECT id FROM positions WHERE key = ?1",
      rusqlite::params![key.as_str()],
      |r| r.get(0),
    )
    .optional()
}

/// The id of `key`, inserting it if absent. The flag reports an insert.
fn ensure_position(
  conn: &rusqlite::Connection,
  key: &PositionKey,
) -> rusqlite::Result<(PositionId, bool)> {
  if let Some(id) = find_position_id(conn, key)? {
    return Ok((id, false));
  }
  conn.execute("INSERT INTO positions (key) VALUES (?1)", rusqlite::params![key.as_str()])?;
  Ok((conn.last_insert_rowid(), true))
}

/// Insert the edge unless an identical one exists. Returns whether it was
/// inserted.
fn ensure_move(
  conn: &rusqlite::Connection,
  from: PositionId,
  to: PositionId,
  notation: &str,
) -> rusqlite::Result<bool> {
  let exists = conn
    .query_row(
      "SELECT 1 FROM moves
       WHERE from_position_id = ?1 AND to_position_id = ?2 AND notation = ?3
       LIMIT 1",
      rusqlite::params![from, to, notation],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists {
    return Ok(false);
  }
  conn.execute(
    "INSERT INTO moves (from_position_id, to_position_id, notation) VALUES (?1, ?2, ?3)",
    rusqlite::params![from, to, notation],
  )?;
  Ok(true)
}

/// Additive merge of `delta` into the stats row of `position_id`.
///
/// `game_ref` follows the most recent game: it is replaced only when the
/// incoming date is strictly newer (or nothing is stored yet).
fn upsert_stats_row(
  conn: &rusqlite::Connection,
  position_id: PositionId,
  delta: &StatsDelta,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO position_stats (
       position_id, total_games, white_wins, black_wins, draws,
       total_player_elo, total_player_performance, last_played_date, game_ref
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(position_id) DO UPDATE SET
       total_games              = total_games + excluded.total_games,
       white_wins               = white_wins + excluded.white_wins,
       black_wins               = black_wins + excluded.black_wins,
       draws                    = draws + excluded.draws,
       total_player_elo         = total_player_elo + excluded.total_player_elo,
       total_player_performance = total_player_performance + excluded.total_player_performance,
       game_ref = CASE
         WHEN game_ref IS NULL OR excluded.last_played_date > last_played_date
           THEN COALESCE(excluded.game_ref, game_ref)
         ELSE game_ref
       END,
       last_played_date = MAX(last_played_date, excluded.last_played_date)",
    rusqlite::params![
      position_id,
      delta.total_games,
      delta.white_wins,
      delta.black_wins,
      delta.draws,
      delta.player_elo,
      delta.player_performance,
      delta.played_date,
      delta.game_ref,
    ],
  )?;
  Ok(())
}

fn read_stats(
  conn: &rusqlite::Connection,
  position_id: PositionId,
) -> rusqlite::Result<Option<PositionStats>> {
  conn
    .query_row(
      &format!("SELECT {STATS_COLUMNS} FROM position_stats WHERE position_id = ?1"),
      rusqlite::params![position_id],
      |row| stats_from_row(row, 0),
    )
    .optional()
}

fn position_exists(conn: &rusqlite::Connection, id: PositionId) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM positions WHERE id = ?1", rusqlite::params![id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

// ─── TreeStore impl ──────────────────────────────────────────────────────────

impl TreeStore for SqliteStore {
  type Error = Error;

  // ── Positions and moves ───────────────────────────────────────────────────

  async fn find_position(&self, key: &PositionKey) -> Result<Option<Position>> {
    let key = key.clone();
    let found = self
      .conn
      .call(move |conn| Ok(find_position_id(conn, &key)?.map(|id| Position { id, key })))
      .await?;
    Ok(found)
  }

  async fn find_variants(&self, key: &PositionKey) -> Result<Vec<Position>> {
    // Every key sharing the first three fields sorts in [prefix, prefix!)
    // since ' ' is immediately followed by '!'.
    let lower = format!("{} {} {} ", key.placement(), key.side_to_move(), key.castling());
    let upper = format!("{} {} {}!", key.placement(), key.side_to_move(), key.castling());

    let positions = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT id, key FROM positions WHERE key >= ?1 AND key < ?2 ORDER BY id")?;
        let rows = stmt
          .query_map(rusqlite::params![lower, upper], position_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(positions)
  }

  async fn insert_position(&self, key: &PositionKey) -> Result<Position> {
    let key_str = key.as_str().to_owned();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute("INSERT INTO positions (key) VALUES (?1)", rusqlite::params![key_str])?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(Position { id, key: key.clone() })
  }

  async fn insert_move(
    &self,
    from:     PositionId,
    to:       PositionId,
    notation: &str,
  ) -> Result<Move> {
    let notation = notation.to_owned();
    let (id, notation) = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO moves (from_position_id, to_position_id, notation) VALUES (?1, ?2, ?3)",
          rusqlite::params![from, to, notation],
        )?;
        Ok((conn.last_insert_rowid(), notation))
      })
      .await?;
    Ok(Move { id, from_position_id: from, to_position_id: to, notation })
  }

  async fn upsert_stats(&self, position_id: PositionId, delta: &StatsDelta) -> Result<()> {
    let delta = delta.clone();
    self
      .conn
      .call(move |conn| {
        upsert_stats_row(conn, position_id, &delta)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_stats(&self, position_id: PositionId) -> Result<Option<PositionStats>> {
    Ok(self.conn.call(move |conn| Ok(read_stats(conn, position_id)?)).await?)
  }

  async fn record_game(&self, path: &GamePath) -> Result<GameApplied> {
    let path = path.clone();
    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut applied = GameApplied::default();
        let mut ids: HashMap<PositionKey, PositionId> = HashMap::new();

        let mut resolve = |tx: &rusqlite::Connection, key: &PositionKey| {
          if let Some(&id) = ids.get(key) {
            return Ok(id);
          }
          let (id, created) = ensure_position(tx, key)?;
          if created {
            applied.positions_created += 1;
          }
          ids.insert(key.clone(), id);
          Ok::<_, rusqlite::Error>(id)
        };

        let mut edges = Vec::with_capacity(path.steps.len());
        for step in &path.steps {
          let from = resolve(&tx, &step.from)?;
          let to = resolve(&tx, &step.to)?;
          edges.push((from, to, step.notation.as_str()));
        }
        let mut contributions = Vec::with_capacity(path.contributions.len());
        for (key, delta) in &path.contributions {
          contributions.push((resolve(&tx, key)?, delta));
        }

        for (from, to, notation) in edges {
          if ensure_move(&tx, from, to, notation)? {
            applied.moves_created += 1;
          }
        }
        for (id, delta) in contributions {
          upsert_stats_row(&tx, id, delta)?;
        }

        tx.commit()?;
        Ok(applied)
      })
      .await?;
    Ok(applied)
  }

  async fn outgoing_moves(&self, position_id: PositionId) -> Result<Vec<OutgoingMove>> {
    let raws: Vec<RawOutgoing> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             m.notation, p.id, p.key,
             s.position_id, s.total_games, s.white_wins, s.black_wins, s.draws,
             s.total_player_elo, s.total_player_performance,
             s.last_played_date, s.game_ref
           FROM moves m
           JOIN positions p           ON p.id = m.to_position_id
           LEFT JOIN position_stats s ON s.position_id = p.id
           WHERE m.from_position_id = ?1
           ORDER BY m.id",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![position_id], |row| {
            let has_stats: Option<PositionId> = row.get(3)?;
            Ok(RawOutgoing {
              notation: row.get(0)?,
              to:       Position { id: row.get(1)?, key: PositionKey::from_canonical(row.get(2)?) },
              stats:    has_stats.map(|_| stats_from_row(row, 3)).transpose()?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawOutgoing::into_outgoing).collect())
  }

  // ── Provenance ────────────────────────────────────────────────────────────

  async fn was_imported(&self, stamp: &SourceStamp) -> Result<bool> {
    let path = stamp.path.clone();
    let raw: Option<RawImportedFile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT path, content_hash, last_modified, processed_at
               FROM imported_files WHERE path = ?1",
              rusqlite::params![path],
              |row| {
                Ok(RawImportedFile {
                  path:          row.get(0)?,
                  content_hash:  row.get(1)?,
                  last_modified: row.get(2)?,
                  processed_at:  row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    let Some(raw) = raw else { return Ok(false) };
    Ok(raw.into_imported_file()?.matches(stamp))
  }

  async fn record_imported(&self, stamp: &SourceStamp) -> Result<ImportedFile> {
    let imported = ImportedFile {
      path:          stamp.path.clone(),
      content_hash:  stamp.content_hash.clone(),
      last_modified: stamp.last_modified,
      processed_at:  Utc::now(),
    };

    let path          = imported.path.clone();
    let content_hash  = imported.content_hash.clone();
    let last_modified = encode_dt(imported.last_modified);
    let processed_at  = encode_dt(imported.processed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO imported_files (path, content_hash, last_modified, processed_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(path) DO UPDATE SET
             content_hash  = excluded.content_hash,
             last_modified = excluded.last_modified,
             processed_at  = excluded.processed_at",
          rusqlite::params![path, content_hash, last_modified, processed_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(imported)
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn graph_snapshot(&self) -> Result<GraphSnapshot> {
    let snapshot = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;

        let positions = tx
          .prepare("SELECT id FROM positions ORDER BY id")?
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let anchored = tx
          .prepare("SELECT position_id FROM position_stats WHERE total_games > 1")?
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let edges = tx
          .prepare("SELECT DISTINCT from_position_id, to_position_id FROM moves")?
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        tx.commit()?;
        Ok(GraphSnapshot { positions, anchored, edges })
      })
      .await?;
    Ok(snapshot)
  }

  async fn delete_subset(&self, position_ids: &[PositionId]) -> Result<u64> {
    let ids = position_ids.to_vec();
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(
          "CREATE TEMP TABLE IF NOT EXISTS prune_batch (id INTEGER PRIMARY KEY);
           DELETE FROM temp.prune_batch;",
        )?;
        {
          let mut stmt = tx.prepare("INSERT OR IGNORE INTO temp.prune_batch (id) VALUES (?1)")?;
          for id in &ids {
            stmt.execute(rusqlite::params![id])?;
          }
        }

        tx.execute(
          "DELETE FROM moves
           WHERE from_position_id IN (SELECT id FROM temp.prune_batch)
              OR to_position_id   IN (SELECT id FROM temp.prune_batch)",
          [],
        )?;
        tx.execute(
          "DELETE FROM position_stats WHERE position_id IN (SELECT id FROM temp.prune_batch)",
          [],
        )?;
        let deleted =
          tx.execute("DELETE FROM positions WHERE id IN (SELECT id FROM temp.prune_batch)", [])?;
        tx.execute("DELETE FROM temp.prune_batch", [])?;

        tx.commit()?;
        Ok(deleted as u64)
      })
      .await?;

    debug!(requested = position_ids.len(), deleted, "subset deleted");
    Ok(deleted)
  }

  async fn list_positions(&self) -> Result<Vec<Position>> {
    let positions = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT id, key FROM positions ORDER BY id")?;
        let rows = stmt.query_map([], position_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(positions)
  }

  async fn rekey_position(&self, position_id: PositionId, key: &PositionKey) -> Result<()> {
    let key_str = key.as_str().to_owned();
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE positions SET key = ?2 WHERE id = ?1",
          rusqlite::params![position_id, key_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::PositionNotFound(position_id));
    }
    Ok(())
  }

  async fn merge_positions(&self, from: PositionId, into: PositionId) -> Result<()> {
    if from == into {
      return Ok(());
    }

    let missing: Option<PositionId> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for id in [from, into] {
          if !position_exists(&tx, id)? {
            return Ok(Some(id));
          }
        }

        tx.execute(
          "UPDATE moves SET from_position_id = ?2 WHERE from_position_id = ?1",
          rusqlite::params![from, into],
        )?;
        tx.execute(
          "UPDATE moves SET to_position_id = ?2 WHERE to_position_id = ?1",
          rusqlite::params![from, into],
        )?;
        // Re-pointing can produce edges identical to ones `into` already had.
        tx.execute(
          "DELETE FROM moves
           WHERE (from_position_id = ?1 OR to_position_id = ?1)
             AND id NOT IN (
               SELECT MIN(id) FROM moves
               WHERE from_position_id = ?1 OR to_position_id = ?1
               GROUP BY from_position_id, to_position_id, notation
             )",
          rusqlite::params![into],
        )?;

        if let Some(stats) = read_stats(&tx, from)? {
          upsert_stats_row(&tx, into, &StatsDelta::from(&stats))?;
          tx.execute("DELETE FROM position_stats WHERE position_id = ?1", rusqlite::params![from])?;
        }
        tx.execute("DELETE FROM positions WHERE id = ?1", rusqlite::params![from])?;

        tx.commit()?;
        Ok(None)
      })
      .await?;

    match missing {
      Some(id) => Err(Error::PositionNotFound(id)),
      None => Ok(()),
    }
  }

  async fn compact(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("VACUUM")?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn counts(&self) -> Result<StoreCounts> {
    let counts = self
      .conn
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<u64> {
          let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
          Ok(n as u64)
        };
        Ok(StoreCounts {
          positions:      count("positions")?,
          moves:          count("moves")?,
          imported_files: count("imported_files")?,
        })
      })
      .await?;
    Ok(counts)
  }
}
