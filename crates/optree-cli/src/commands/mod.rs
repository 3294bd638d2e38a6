//! One module per subcommand.

pub mod build;
pub mod normalize;
pub mod prune;
pub mod query;
pub mod serve;

use serde::Serialize;

/// Print a run summary to stdout as pretty JSON.
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
