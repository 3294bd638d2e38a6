//! SQL schema for the opening-tree SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` marks a file
//! as initialised; read-only connections check it instead of running DDL.

/// Version written by [`SCHEMA`].
pub const SCHEMA_VERSION: i64 = 1;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- AUTOINCREMENT keeps ids monotonic: a pruned id is never handed out again.
CREATE TABLE IF NOT EXISTS positions (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    key  TEXT NOT NULL UNIQUE
);

-- No uniqueness on (from, to, notation): writers check before inserting.
CREATE TABLE IF NOT EXISTS moves (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    from_position_id  INTEGER NOT NULL REFERENCES positions(id),
    to_position_id    INTEGER NOT NULL REFERENCES positions(id),
    notation          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS position_stats (
    position_id               INTEGER PRIMARY KEY REFERENCES positions(id),
    total_games               INTEGER NOT NULL DEFAULT 0,
    white_wins                INTEGER NOT NULL DEFAULT 0,
    black_wins                INTEGER NOT NULL DEFAULT 0,
    draws                     INTEGER NOT NULL DEFAULT 0,
    total_player_elo          INTEGER NOT NULL DEFAULT 0,   -- sum, not average
    total_player_performance  INTEGER NOT NULL DEFAULT 0,   -- sum, not average
    last_played_date          TEXT NOT NULL DEFAULT '',     -- ISO 8601 prefix
    game_ref                  TEXT,
    CHECK (total_games = white_wins + black_wins + draws)
);

CREATE TABLE IF NOT EXISTS imported_files (
    path           TEXT PRIMARY KEY,
    content_hash   TEXT NOT NULL,   -- SHA-256, lowercase hex
    last_modified  TEXT NOT NULL,   -- RFC 3339 UTC
    processed_at   TEXT NOT NULL    -- RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS moves_edge_idx ON moves(from_position_id, to_position_id, notation);
CREATE INDEX IF NOT EXISTS moves_to_idx   ON moves(to_position_id);

PRAGMA user_version = 1;
";
