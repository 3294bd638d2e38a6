//! `optree query`: print the continuations of one position.

use std::fmt::Write as _;

use anyhow::Context as _;
use clap::{Args, ValueEnum};
use optree_core::query::{PositionReport, query_position};
use optree_store_sqlite::SqliteStore;

use crate::commands::print_json;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
  Json,
  Text,
}

#[derive(Args)]
pub struct QueryArgs {
  /// Position descriptor (FEN); move counters are optional.
  #[arg(long)]
  fen: String,

  #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
  output: OutputFormat,
}

pub async fn run(store: &SqliteStore, args: QueryArgs) -> anyhow::Result<()> {
  let report = query_position(store, &args.fen)
    .await
    .with_context(|| format!("query failed for {:?}", args.fen))?;

  let Some(report) = report else {
    println!("Position not found: {}", args.fen);
    return Ok(());
  };

  match args.output {
    OutputFormat::Json => print_json(&report),
    OutputFormat::Text => {
      print!("{}", render_text(&report));
      Ok(())
    }
  }
}

fn percent(part: i64, total: i64) -> f64 {
  if total == 0 { 0.0 } else { 100.0 * part as f64 / total as f64 }
}

/// One line per move: games, white/draw/black percentages, average rating
/// and performance, last played date.
fn render_text(report: &PositionReport) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", report.key);
  let _ = writeln!(
    out,
    "{:<8} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
    "move", "games", "white", "draw", "black", "rating", "perf", "last played"
  );
  for m in &report.moves {
    let _ = writeln!(
      out,
      "{:<8} {:>7} {:>5.1}% {:>5.1}% {:>5.1}% {:>6} {:>6}  {}",
      m.notation,
      m.total_games,
      percent(m.white_wins, m.total_games),
      percent(m.draws, m.total_games),
      percent(m.black_wins, m.total_games),
      m.rating,
      m.performance,
      m.last_played_date,
    );
  }
  out
}

#[cfg(test)]
mod tests {
  use optree_core::{PositionKey, query::MoveReport};

  use super::*;

  #[test]
  fn text_rows_show_percentages() {
    let report = PositionReport {
      key:   PositionKey::initial(),
      moves: vec![MoveReport {
        notation:         "e4".into(),
        key:              PositionKey::initial(),
        total_games:      4,
        white_wins:       2,
        draws:            1,
        black_wins:       1,
        last_played_date: "2024-01-02".into(),
        game_ref:         None,
        rating:           2100,
        performance:      2150,
      }],
    };
    let text = render_text(&report);
    let row = text.lines().nth(2).unwrap();
    assert!(row.starts_with("e4"));
    assert!(row.contains("50.0%"));
    assert!(row.contains("25.0%"));
    assert!(row.ends_with("2024-01-02"));
  }
}
