//! Streaming PGN reader yielding importable game records.

use std::{fs::File, io::Read, path::Path};

use optree_core::{
  Error, Result,
  import::GameRecord,
  stats::GameResult,
};
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use shakmaty::{Color, Outcome};
use tracing::trace;

use crate::{date::format_pgn_date, replay::replay};

// ─── Visitor ─────────────────────────────────────────────────────────────────

/// Headers the importer cares about, as written in the file.
#[derive(Debug, Default)]
struct Headers {
  white_elo: Option<String>,
  black_elo: Option<String>,
  result:    Option<String>,
  date:      Option<String>,
  utc_date:  Option<String>,
  site:      Option<String>,
  variant:   Option<String>,
  fen:       Option<String>,
}

/// One game as read, before validation and replay.
#[derive(Debug, Default)]
struct RawGame {
  headers: Headers,
  moves:   Vec<SanPlus>,
  outcome: Option<Outcome>,
}

/// Collects headers and the first `max_ply` main-line moves.
struct GameVisitor {
  game:    RawGame,
  max_ply: usize,
}

impl GameVisitor {
  fn new(max_ply: usize) -> Self { Self { game: RawGame::default(), max_ply } }
}

impl Visitor for GameVisitor {
  type Result = RawGame;

  fn begin_game(&mut self) { self.game = RawGame::default(); }

  fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
    let value = value.decode_utf8_lossy().into_owned();
    let h = &mut self.game.headers;
    match key {
      b"WhiteElo" => h.white_elo = Some(value),
      b"BlackElo" => h.black_elo = Some(value),
      b"Result" => h.result = Some(value),
      b"Date" => h.date = Some(value),
      b"UTCDate" => h.utc_date = Some(value),
      b"Site" => h.site = Some(value),
      b"Variant" => h.variant = Some(value),
      b"FEN" => h.fen = Some(value),
      _ => {}
    }
  }

  fn end_headers(&mut self) -> Skip { Skip(unsupported_reason(&self.game.headers).is_some()) }

  fn san(&mut self, san_plus: SanPlus) {
    if self.game.moves.len() < self.max_ply {
      self.game.moves.push(san_plus);
    }
  }

  fn begin_variation(&mut self) -> Skip { Skip(true) }

  fn outcome(&mut self, outcome: Option<Outcome>) { self.game.outcome = outcome; }

  fn end_game(&mut self) -> Self::Result { std::mem::take(&mut self.game) }
}

// ─── Validation ──────────────────────────────────────────────────────────────

fn unsupported_reason(headers: &Headers) -> Option<String> {
  if let Some(variant) = &headers.variant {
    if !variant.eq_ignore_ascii_case("standard") {
      return Some(format!("variant {variant:?}"));
    }
  }
  headers.fen.as_ref().map(|_| "custom starting position".to_owned())
}

/// A rating header: missing, empty, `?` or `-` mean unrated.
fn parse_elo(side: &str, value: Option<&str>) -> Result<u32> {
  match value.map(str::trim) {
    None | Some("" | "?" | "-") => Ok(0),
    Some(v) => v
      .parse()
      .map_err(|_| Error::MalformedInput(format!("{side}Elo {v:?} is not a rating"))),
  }
}

fn parse_result(header: Option<&str>, outcome: Option<Outcome>) -> Result<GameResult> {
  if let Some(value) = header.map(str::trim).filter(|v| *v != "*" && !v.is_empty()) {
    return value
      .parse()
      .map_err(|_| Error::MalformedInput(format!("unknown result {value:?}")));
  }
  match outcome {
    Some(Outcome::Decisive { winner: Color::White }) => Ok(GameResult::WhiteWin),
    Some(Outcome::Decisive { winner: Color::Black }) => Ok(GameResult::BlackWin),
    Some(Outcome::Draw) => Ok(GameResult::Draw),
    None => Err(Error::MalformedInput("game has no decided result".into())),
  }
}

fn is_url(site: &str) -> bool { site.starts_with("https://") || site.starts_with("http://") }

impl RawGame {
  /// Validate and replay. `number` is the 1-based position of the game in
  /// its source.
  fn into_record(self, origin: &str, number: u64) -> Result<GameRecord> {
    let h = self.headers;
    if let Some(reason) = unsupported_reason(&h) {
      return Err(Error::Unsupported(reason));
    }

    let white_elo = parse_elo("White", h.white_elo.as_deref())?;
    let black_elo = parse_elo("Black", h.black_elo.as_deref())?;
    let result = parse_result(h.result.as_deref(), self.outcome)?;

    let date = [h.date.as_deref(), h.utc_date.as_deref()]
      .into_iter()
      .flatten()
      .map(format_pgn_date)
      .find(|d| !d.is_empty())
      .unwrap_or_default();

    let game_ref = match h.site {
      Some(site) if is_url(site.trim()) => site.trim().to_owned(),
      _ => format!("{origin}#{number}"),
    };

    let plies = replay(&self.moves)?;

    Ok(GameRecord { white_elo, black_elo, result, date, game_ref: Some(game_ref), plies })
  }
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// Iterator over the games of one PGN stream.
///
/// Yields `Unsupported` and `MalformedInput` errors per game and keeps going;
/// a read failure yields `SourceIo` once and ends the stream.
pub struct PgnSource<R> {
  reader:  BufferedReader<R>,
  origin:  String,
  max_ply: usize,
  read:    u64,
  failed:  bool,
}

impl<R: Read> PgnSource<R> {
  /// `origin` names the stream in fallback game references.
  pub fn new(reader: R, origin: impl Into<String>, max_ply: usize) -> Self {
    Self {
      reader: BufferedReader::new(reader),
      origin: origin.into(),
      max_ply,
      read: 0,
      failed: false,
    }
  }
}

impl PgnSource<File> {
  pub fn open(path: &Path, max_ply: usize) -> crate::Result<Self> {
    let file = File::open(path).map_err(|e| crate::Error::io(path, e))?;
    Ok(Self::new(file, path.display().to_string(), max_ply))
  }
}

impl<R: Read> Iterator for PgnSource<R> {
  type Item = Result<GameRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    let mut visitor = GameVisitor::new(self.max_ply);
    match self.reader.read_game(&mut visitor) {
      Ok(Some(game)) => {
        self.read += 1;
        trace!(origin = %self.origin, game = self.read, "game read");
        Some(game.into_record(&self.origin, self.read))
      }
      Ok(None) => None,
      Err(e) => {
        self.failed = true;
        Some(Err(Error::SourceIo(e)))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn games(pgn: &str) -> Vec<Result<GameRecord>> {
    PgnSource::new(pgn.as_bytes(), "test.pgn", 30).collect()
  }

  const TWO_GAMES: &str = r#"[Event "Casual"]
[Site "https://lichess.org/abcd1234"]
[Date "2024.03.15"]
[White "A"]
[Black "B"]
[Result "1-0"]
[WhiteElo "2100"]
[BlackElo "1950"]

1. e4 e5 2. Nf3 (2. f4 exf4) Nc6 3. Bb5 1-0

[Event "Casual"]
[Site "Club"]
[Date "2023.??.??"]
[Result "1/2-1/2"]
[WhiteElo "?"]

1. d4 d5 1/2-1/2
"#;

  #[test]
  fn reads_headers_and_main_line() {
    let games = games(TWO_GAMES);
    assert_eq!(games.len(), 2);

    let first = games[0].as_ref().unwrap();
    assert_eq!((first.white_elo, first.black_elo), (2100, 1950));
    assert_eq!(first.result, GameResult::WhiteWin);
    assert_eq!(first.date, "2024-03-15");
    assert_eq!(first.game_ref.as_deref(), Some("https://lichess.org/abcd1234"));
    let moves: Vec<_> = first.plies.iter().map(|p| p.notation.as_str()).collect();
    assert_eq!(moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5"]);

    let second = games[1].as_ref().unwrap();
    assert_eq!((second.white_elo, second.black_elo), (0, 0));
    assert_eq!(second.result, GameResult::Draw);
    assert_eq!(second.date, "2023");
    assert_eq!(second.game_ref.as_deref(), Some("test.pgn#2"));
  }

  #[test]
  fn replay_stops_at_max_ply() {
    let games: Vec<_> = PgnSource::new(TWO_GAMES.as_bytes(), "t", 2).collect();
    assert_eq!(games[0].as_ref().unwrap().plies.len(), 2);
  }

  #[test]
  fn variants_and_setups_are_unsupported() {
    let pgn = r#"[Variant "Chess960"]
[Result "1-0"]

1. e4 1-0

[Result "0-1"]
[SetUp "1"]
[FEN "8/8/8/8/8/8/8/K6k w - - 0 1"]

1. Kb1 0-1

[Variant "Standard"]
[Result "0-1"]

1. f3 e5 2. g4 Qh4# 0-1
"#;
    let games = games(pgn);
    assert!(matches!(games[0], Err(Error::Unsupported(_))));
    assert!(matches!(games[1], Err(Error::Unsupported(_))));
    let third = games[2].as_ref().unwrap();
    assert_eq!(third.result, GameResult::BlackWin);
    assert_eq!(third.plies[3].notation, "Qh4#");
  }

  #[test]
  fn bad_metadata_is_malformed() {
    let pgn = r#"[Result "1-0"]
[WhiteElo "strong"]

1. e4 1-0

[Result "*"]

1. e4 *

[Result "1-0"]

1. e4 e4 1-0
"#;
    let games = games(pgn);
    assert_eq!(games.len(), 3);
    assert!(games.iter().all(|g| matches!(g, Err(Error::MalformedInput(_)))));
  }

  #[test]
  fn result_falls_back_to_movetext() {
    let pgn = "1. e4 e5 0-1\n";
    let games = games(pgn);
    assert_eq!(games[0].as_ref().unwrap().result, GameResult::BlackWin);
  }

  #[test]
  fn date_falls_back_to_utc_date() {
    let pgn = r#"[Date "????.??.??"]
[UTCDate "2022.07.01"]
[Result "1-0"]

1. e4 1-0
"#;
    assert_eq!(games(pgn)[0].as_ref().unwrap().date, "2022-07-01");
  }
}
