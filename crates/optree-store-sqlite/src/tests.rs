//! Integration tests for `SqliteStore`, mostly against in-memory databases.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use optree_core::{
  Error as CoreError, PositionKey,
  import::{ImportOptions, Importer},
  maintenance::normalize_keys,
  prune::{Pruner, deletion_candidates},
  query::query_position,
  stats::{GameResult, Side, StatsDelta},
  store::{SourceStamp, TreeStore},
};
use optree_pgn::PgnSource;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn key(s: &str) -> PositionKey { PositionKey::from_canonical(s.to_owned()) }

fn stamp(hash: &str) -> SourceStamp {
  SourceStamp {
    path:          "/games/test.pgn".into(),
    content_hash:  hash.into(),
    last_modified: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
  }
}

fn delta(date: &str, game_ref: Option<&str>) -> StatsDelta {
  StatsDelta::for_game(GameResult::Draw, 2000, 2000, Side::White, date, game_ref)
}

async fn import(s: &SqliteStore, pgn: &str, hash: &str) -> optree_core::import::ImportSummary {
  Importer::new(s, ImportOptions::default())
    .import_source(&stamp(hash), PgnSource::new(pgn.as_bytes(), "test.pgn", 30))
    .await
    .unwrap()
}

const E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -";
const E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -";

// ─── Positions and moves ─────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_find_position() {
  let s = store().await;
  let p = s.insert_position(&PositionKey::initial()).await.unwrap();

  let found = s.find_position(&PositionKey::initial()).await.unwrap();
  assert_eq!(found, Some(p));
  assert!(s.find_position(&key(E4)).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_key_is_a_conflict() {
  let s = store().await;
  s.insert_position(&key(E4)).await.unwrap();

  let err = s.insert_position(&key(E4)).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Conflict(_)));
}

#[tokio::test]
async fn edge_to_missing_position_is_an_integrity_error() {
  let s = store().await;
  let p = s.insert_position(&key(E4)).await.unwrap();

  let err = s.insert_move(p.id, 999, "e5").await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Integrity(_)));
}

#[tokio::test]
async fn duplicate_edges_are_not_rejected() {
  let s = store().await;
  let a = s.insert_position(&PositionKey::initial()).await.unwrap();
  let b = s.insert_position(&key(E4)).await.unwrap();

  let first = s.insert_move(a.id, b.id, "e4").await.unwrap();
  let second = s.insert_move(a.id, b.id, "e4").await.unwrap();
  assert!(second.id > first.id);
  assert_eq!(s.counts().await.unwrap().moves, 2);
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_is_additive() {
  let s = store().await;
  let p = s.insert_position(&key(E4)).await.unwrap();

  let win = StatsDelta::for_game(GameResult::WhiteWin, 2100, 1900, Side::White, "2024-01-01", None);
  let loss = StatsDelta::for_game(GameResult::BlackWin, 2000, 2200, Side::White, "2023", None);
  s.upsert_stats(p.id, &win).await.unwrap();
  s.upsert_stats(p.id, &loss).await.unwrap();

  let stats = s.get_stats(p.id).await.unwrap().unwrap();
  assert_eq!(stats.total_games, 2);
  assert_eq!((stats.white_wins, stats.black_wins, stats.draws), (1, 1, 0));
  assert_eq!(stats.total_games, stats.white_wins + stats.black_wins + stats.draws);
  assert_eq!(stats.total_player_elo, 4100);
  // 1900 + 400 and 2200 - 400.
  assert_eq!(stats.total_player_performance, 4100);
  assert_eq!(stats.last_played_date, "2024-01-01");
}

#[tokio::test]
async fn game_ref_follows_strictly_newer_games() {
  let s = store().await;
  let p = s.insert_position(&key(E4)).await.unwrap();

  let steps = [
    ("2024-01-01", Some("a"), "a"),
    ("2023-01-01", Some("b"), "a"),
    ("2024-01-01", Some("c"), "a"),
    ("2025", Some("d"), "d"),
    ("2026", None, "d"),
  ];
  for (date, game_ref, expected) in steps {
    s.upsert_stats(p.id, &delta(date, game_ref)).await.unwrap();
    let stats = s.get_stats(p.id).await.unwrap().unwrap();
    assert_eq!(stats.game_ref.as_deref(), Some(expected), "after {date}");
  }
  let stats = s.get_stats(p.id).await.unwrap().unwrap();
  assert_eq!(stats.last_played_date, "2026");
  assert_eq!(stats.total_games, 5);
}

#[tokio::test]
async fn stats_for_missing_position_is_an_integrity_error() {
  let s = store().await;
  let err = s.upsert_stats(42, &delta("", None)).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Integrity(_)));
}

// ─── Importer ────────────────────────────────────────────────────────────────

const TRANSPOSITION: &str = r#"[Site "https://example.org/g1"]
[Date "2024.02.01"]
[Result "1-0"]
[WhiteElo "2100"]
[BlackElo "1950"]

1. d4 Nf6 2. c4 e6 1-0

[Site "https://example.org/g2"]
[Date "2024.03.01"]
[Result "0-1"]
[WhiteElo "1800"]
[BlackElo "2000"]

1. c4 e6 2. d4 Nf6 0-1
"#;

#[tokio::test]
async fn transpositions_share_a_position() {
  let s = store().await;
  let summary = import(&s, TRANSPOSITION, "h1").await;

  assert_eq!(summary.games_read, 2);
  assert_eq!(summary.games_imported, 2);
  // Start, four positions for the first game, three new for the second.
  assert_eq!(summary.positions_created, 8);
  assert_eq!(summary.moves_created, 8);

  let meeting = s
    .find_position(&key("rnbqkb1r/pppp1ppp/4pn2/8/2PP4/8/PP2PPPP/RNBQKBNR w KQkq -"))
    .await
    .unwrap()
    .expect("shared position");
  let stats = s.get_stats(meeting.id).await.unwrap().unwrap();
  assert_eq!(stats.total_games, 2);
  assert_eq!((stats.white_wins, stats.black_wins), (1, 1));
  // Black moved last in both games: 1950 + 2000.
  assert_eq!(stats.total_player_elo, 3950);
  assert_eq!(stats.game_ref.as_deref(), Some("https://example.org/g2"));
  assert_eq!(stats.last_played_date, "2024-03-01");

  // Reached by two different moves from two different predecessors.
  let snapshot = s.graph_snapshot().await.unwrap();
  let predecessors: HashSet<_> = snapshot
    .edges
    .iter()
    .filter(|(_, to)| *to == meeting.id)
    .map(|(from, _)| *from)
    .collect();
  assert_eq!(predecessors.len(), 2);

  let mut incoming = Vec::new();
  for from in predecessors {
    for m in s.outgoing_moves(from).await.unwrap() {
      if m.to.id == meeting.id {
        incoming.push(m.notation);
      }
    }
  }
  incoming.sort();
  assert_eq!(incoming, vec!["Nf6", "e6"]);
}

#[tokio::test]
async fn credited_player_moved_into_the_position() {
  let s = store().await;
  import(&s, TRANSPOSITION, "h1").await;

  // After 1. d4 White (2100) is credited; White won against 1950.
  let d4 = s
    .find_position(&key("rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq -"))
    .await
    .unwrap()
    .unwrap();
  let stats = s.get_stats(d4.id).await.unwrap().unwrap();
  assert_eq!(stats.average_rating(), 2100);
  assert_eq!(stats.average_performance(), 2350);

  // The start position credits Black: 1950 lost, 2000 won.
  let start = s.find_position(&PositionKey::initial()).await.unwrap().unwrap();
  let stats = s.get_stats(start.id).await.unwrap().unwrap();
  assert_eq!(stats.total_player_elo, 3950);
  assert_eq!(stats.total_player_performance, (2100 - 400) + (1800 + 400));
}

#[tokio::test]
async fn unchanged_source_is_skipped() {
  let s = store().await;
  import(&s, TRANSPOSITION, "h1").await;
  let before = s.counts().await.unwrap();

  let again = import(&s, TRANSPOSITION, "h1").await;
  assert!(again.skipped_source);
  assert_eq!(again.games_read, 0);
  assert_eq!(s.counts().await.unwrap(), before);

  let start = s.find_position(&PositionKey::initial()).await.unwrap().unwrap();
  assert_eq!(s.get_stats(start.id).await.unwrap().unwrap().total_games, 2);

  // New content under the same path is imported again.
  let changed = import(&s, TRANSPOSITION, "h2").await;
  assert!(!changed.skipped_source);
  assert_eq!(changed.positions_created, 0);
  assert_eq!(s.get_stats(start.id).await.unwrap().unwrap().total_games, 4);
  assert_eq!(s.counts().await.unwrap().imported_files, 1);
}

#[tokio::test]
async fn bad_games_are_counted_not_fatal() {
  let pgn = r#"[Result "1-0"]
[WhiteElo "1200"]
[BlackElo "2000"]

1. e4 1-0

[Result "1-0"]
[WhiteElo "nope"]

1. e4 1-0

[Variant "Atomic"]
[Result "1-0"]

1. e4 1-0

[Result "0-1"]
[WhiteElo "2000"]
[BlackElo "2000"]

1. e4 e5 0-1
"#;
  let s = store().await;
  let summary = Importer::new(&s, ImportOptions { max_ply: 30, min_rating: 1500 })
    .import_source(&stamp("h"), PgnSource::new(pgn.as_bytes(), "test.pgn", 30))
    .await
    .unwrap();

  assert_eq!(summary.games_read, 4);
  assert_eq!(summary.games_imported, 1);
  assert_eq!(summary.games_filtered, 2);
  assert_eq!(summary.games_failed, 1);
  assert_eq!(summary.positions_created, 3);
  assert!(s.was_imported(&stamp("h")).await.unwrap());
}

#[tokio::test]
async fn games_from_a_reader_thread_import_like_an_iterator() {
  let direct = store().await;
  let expected = import(&direct, TRANSPOSITION, "h1").await;

  let s = store().await;
  let (tx, rx) = mpsc::channel(2);
  let reader = tokio::task::spawn_blocking(move || {
    for game in PgnSource::new(TRANSPOSITION.as_bytes(), "test.pgn", 30) {
      if tx.blocking_send(game).is_err() {
        break;
      }
    }
  });

  let summary = Importer::new(&s, ImportOptions::default())
    .import_channel(&stamp("h1"), rx)
    .await
    .unwrap();
  reader.await.unwrap();

  assert_eq!(summary, expected);
  assert!(s.was_imported(&stamp("h1")).await.unwrap());
  assert_eq!(s.counts().await.unwrap(), direct.counts().await.unwrap());
}

#[tokio::test]
async fn cancelled_import_is_not_recorded() {
  let s = store().await;
  let token = CancellationToken::new();
  token.cancel();

  let summary = Importer::new(&s, ImportOptions::default())
    .with_cancellation(token)
    .import_source(&stamp("h"), PgnSource::new(TRANSPOSITION.as_bytes(), "test.pgn", 30))
    .await
    .unwrap();

  assert!(summary.interrupted);
  assert_eq!(summary.games_imported, 0);
  assert!(!s.was_imported(&stamp("h")).await.unwrap());
}

#[tokio::test]
async fn max_ply_truncates_games() {
  let s = store().await;
  let summary = Importer::new(&s, ImportOptions { max_ply: 2, min_rating: 0 })
    .import_source(&stamp("h"), PgnSource::new(TRANSPOSITION.as_bytes(), "test.pgn", 30))
    .await
    .unwrap();
  // Start plus two plies per game, nothing shared after the start.
  assert_eq!(summary.positions_created, 5);
  assert_eq!(summary.moves_created, 4);
}

// ─── Prune ───────────────────────────────────────────────────────────────────

/// Two games sharing 1. e4 e5, then diverging for four plies each.
const FORK: &str = r#"[Result "1-0"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0

[Result "0-1"]

1. e4 e5 2. Bc4 Bc5 3. Qh5 Nf6 0-1
"#;

#[tokio::test]
async fn prune_removes_far_singletons() {
  let s = store().await;
  import(&s, FORK, "h").await;
  assert_eq!(s.counts().await.unwrap().positions, 11);

  let summary = Pruner::new(&s).prune(2, 1).await.unwrap();
  assert_eq!(summary.positions_examined, 11);
  assert_eq!(summary.anchored, 3);
  assert_eq!(summary.candidates, 4);
  assert_eq!(summary.deleted, 4);
  assert_eq!(summary.batches_committed, 4);
  assert_eq!(summary.retained + summary.candidates, summary.positions_examined);
  assert!(!summary.interrupted);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.positions, 7);
  assert_eq!(counts.moves, 6);

  // Every anchored position survived and no edge dangles.
  let snapshot = s.graph_snapshot().await.unwrap();
  let alive: HashSet<_> = snapshot.positions.iter().copied().collect();
  assert_eq!(snapshot.anchored.len(), 3);
  assert!(snapshot.anchored.iter().all(|id| alive.contains(id)));
  assert!(snapshot.edges.iter().all(|(a, b)| alive.contains(a) && alive.contains(b)));

  // The shared trunk still answers queries.
  let report = query_position(&s, E4_E5).await.unwrap().unwrap();
  let moves: HashSet<_> = report.moves.iter().map(|m| m.notation.as_str()).collect();
  assert_eq!(moves, HashSet::from(["Nf3", "Bc4"]));
}

#[tokio::test]
async fn prune_is_stable_once_applied() {
  let s = store().await;
  import(&s, FORK, "h").await;

  Pruner::new(&s).prune(2, 1000).await.unwrap();
  let again = Pruner::new(&s).prune(2, 1000).await.unwrap();
  assert_eq!(again.candidates, 0);
  assert_eq!(again.batches_committed, 0);
}

#[tokio::test]
async fn prune_stops_at_a_batch_boundary() {
  let s = store().await;
  import(&s, FORK, "h").await;

  let token = CancellationToken::new();
  token.cancel();
  let summary = Pruner::new(&s).with_cancellation(token).prune(0, 1).await.unwrap();
  assert!(summary.interrupted);
  assert_eq!(summary.deleted, 0);
  assert_eq!(s.counts().await.unwrap().positions, 11);
}

#[tokio::test]
async fn failed_prune_batch_keeps_earlier_batches() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("tree.db");
  let s = SqliteStore::open(&path).await.unwrap();
  import(&s, FORK, "h").await;

  let candidates = deletion_candidates(&s.graph_snapshot().await.unwrap(), 2);
  assert_eq!(candidates.len(), 4);

  // Make deleting the third candidate fail.
  let raw = rusqlite::Connection::open(&path).unwrap();
  raw
    .execute_batch(&format!(
      "CREATE TRIGGER block_delete BEFORE DELETE ON positions
       WHEN OLD.id = {}
       BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
      candidates[2]
    ))
    .unwrap();
  drop(raw);

  assert!(Pruner::new(&s).prune(2, 1).await.is_err());

  let alive: HashSet<_> = s.graph_snapshot().await.unwrap().positions.into_iter().collect();
  assert_eq!(alive.len(), 9);
  assert!(!alive.contains(&candidates[0]));
  assert!(!alive.contains(&candidates[1]));
  assert!(alive.contains(&candidates[2]));
  assert!(alive.contains(&candidates[3]));
  assert!(s.get_stats(candidates[2]).await.unwrap().is_some());
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
  let s = store().await;
  let err = Pruner::new(&s).prune(5, 0).await.unwrap_err();
  assert!(matches!(err, CoreError::MalformedInput(_)));
}

#[tokio::test]
async fn delete_subset_cascades() {
  let s = store().await;
  import(&s, FORK, "h").await;
  let e4 = s.find_position(&key(E4)).await.unwrap().unwrap();

  let deleted = s.delete_subset(&[e4.id, e4.id, 12345]).await.unwrap();
  assert_eq!(deleted, 1);
  assert!(s.get_stats(e4.id).await.unwrap().is_none());

  let start = s.find_position(&PositionKey::initial()).await.unwrap().unwrap();
  assert!(s.outgoing_moves(start.id).await.unwrap().is_empty());
  assert_eq!(s.counts().await.unwrap().moves, 8);

  s.compact().await.unwrap();
}

// ─── Query ───────────────────────────────────────────────────────────────────

const EP: &str = "rnbqkbnr/ppp2ppp/4p3/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6";
const NO_EP: &str = "rnbqkbnr/ppp2ppp/4p3/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq -";

/// The same position stored under both en-passant spellings.
async fn split_position(s: &SqliteStore) {
  let with_ep = s.insert_position(&key(EP)).await.unwrap();
  let without = s.insert_position(&key(NO_EP)).await.unwrap();

  let mut targets = Vec::new();
  for (i, games) in [3, 5, 1].into_iter().enumerate() {
    let p = s.insert_position(&key(&format!("8/8/8/8/8/8/8/{} b - -", i + 1))).await.unwrap();
    for _ in 0..games {
      s.upsert_stats(p.id, &delta("2024", None)).await.unwrap();
    }
    targets.push(p.id);
  }
  s.insert_move(with_ep.id, targets[0], "exd6").await.unwrap();
  s.insert_move(with_ep.id, targets[1], "Nf3").await.unwrap();
  s.insert_move(without.id, targets[1], "Nf3").await.unwrap();
  s.insert_move(without.id, targets[2], "d4").await.unwrap();
}

#[tokio::test]
async fn query_merges_en_passant_variants_from_either_key() {
  let s = store().await;
  split_position(&s).await;

  for descriptor in [EP, NO_EP, "rnbqkbnr/ppp2ppp/4p3/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3"] {
    let report = query_position(&s, descriptor).await.unwrap().unwrap();
    let moves: Vec<_> = report.moves.iter().map(|m| (m.notation.as_str(), m.total_games)).collect();
    assert_eq!(moves, vec![("Nf3", 5), ("exd6", 3), ("d4", 1)], "query: {descriptor}");
  }
}

#[tokio::test]
async fn query_of_unknown_position_is_none() {
  let s = store().await;
  assert!(query_position(&s, E4).await.unwrap().is_none());
  let err = query_position(&s, "not a position").await.unwrap_err();
  assert!(matches!(err, CoreError::MalformedInput(_)));
}

// ─── Key re-normalisation ────────────────────────────────────────────────────

#[tokio::test]
async fn normalize_keys_rekeys_and_merges() {
  let s = store().await;
  let start = s.insert_position(&PositionKey::initial()).await.unwrap();
  let spurious = s
    .insert_position(&key("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3"))
    .await
    .unwrap();
  let canonical = s.insert_position(&key(E4)).await.unwrap();
  let reply = s.insert_position(&key(E4_E5)).await.unwrap();
  let d4 = s
    .insert_position(&key("rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq d3"))
    .await
    .unwrap();
  s.insert_position(&key("garbage")).await.unwrap();

  s.insert_move(start.id, spurious.id, "e4").await.unwrap();
  s.insert_move(start.id, canonical.id, "e4").await.unwrap();
  s.insert_move(spurious.id, reply.id, "e5").await.unwrap();
  s.upsert_stats(spurious.id, &delta("2024", Some("x"))).await.unwrap();
  s.upsert_stats(canonical.id, &delta("2023", Some("y"))).await.unwrap();

  let token = CancellationToken::new();
  let dry = normalize_keys(&s, true, &token).await.unwrap();
  assert_eq!((dry.examined, dry.rekeyed, dry.merged, dry.malformed), (6, 1, 1, 1));
  assert_eq!(s.counts().await.unwrap().positions, 6);

  let real = normalize_keys(&s, false, &token).await.unwrap();
  assert_eq!(real, dry);
  let counts = s.counts().await.unwrap();
  assert_eq!((counts.positions, counts.moves), (5, 2));

  let merged = s.get_stats(canonical.id).await.unwrap().unwrap();
  assert_eq!(merged.total_games, 2);
  assert_eq!(merged.game_ref.as_deref(), Some("x"));

  let from_start = s.outgoing_moves(start.id).await.unwrap();
  assert_eq!(from_start.len(), 1);
  assert_eq!(from_start[0].to.id, canonical.id);
  assert_eq!(s.outgoing_moves(canonical.id).await.unwrap()[0].to.id, reply.id);

  let rekeyed = s
    .find_position(&key("rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq -"))
    .await
    .unwrap();
  assert_eq!(rekeyed.map(|p| p.id), Some(d4.id));

  let settled = normalize_keys(&s, false, &token).await.unwrap();
  assert_eq!((settled.rekeyed, settled.merged), (0, 0));
}

#[tokio::test]
async fn rekey_onto_existing_key_conflicts() {
  let s = store().await;
  let a = s.insert_position(&key(E4)).await.unwrap();
  s.insert_position(&key(E4_E5)).await.unwrap();

  let err = s.rekey_position(a.id, &key(E4_E5)).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Conflict(_)));

  let err = s.merge_positions(a.id, 999).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Integrity(_)));
}

// ─── Read-only access ────────────────────────────────────────────────────────

#[tokio::test]
async fn read_only_store_serves_queries() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("tree.db");

  let writer = SqliteStore::open(&path).await.unwrap();
  import(&writer, FORK, "h").await;

  let reader = SqliteStore::open_read_only(&path).await.unwrap();
  let report = query_position(&reader, E4).await.unwrap().unwrap();
  assert_eq!(report.moves.len(), 1);
  assert_eq!(report.moves[0].total_games, 2);
  assert!(reader.insert_position(&key(E4_E5)).await.is_err());
}

#[tokio::test]
async fn read_only_open_of_missing_file_fails() {
  let dir = tempdir().unwrap();
  assert!(SqliteStore::open_read_only(dir.path().join("missing.db")).await.is_err());
}

#[tokio::test]
async fn store_failure_aborts_the_source_unrecorded() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("tree.db");
  drop(SqliteStore::open(&path).await.unwrap());

  let reader = SqliteStore::open_read_only(&path).await.unwrap();
  let result = Importer::new(&reader, ImportOptions::default())
    .import_source(&stamp("h"), PgnSource::new(FORK.as_bytes(), "test.pgn", 30))
    .await;

  assert!(matches!(result, Err(CoreError::StoreIo(_))));
  assert!(!reader.was_imported(&stamp("h")).await.unwrap());
  assert_eq!(reader.counts().await.unwrap().positions, 0);
}
