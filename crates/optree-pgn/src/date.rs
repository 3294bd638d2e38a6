//! PGN date normalisation.
//!
//! PGN writes dates as `YYYY.MM.DD` with `??` for unknown parts. The store
//! keeps the known prefix in ISO-8601 form so dates compare as strings.

use chrono::NaiveDate;

/// Convert a PGN date to an ISO-8601 prefix.
///
/// `2024.03.15` → `2024-03-15`, `2024.03.??` → `2024-03`, `2024.??.??` →
/// `2024`. Anything else, including a fully unknown date or an impossible
/// calendar date, yields an empty string.
pub fn format_pgn_date(date: &str) -> String {
  let date = date.trim();
  let parts: Vec<&str> = date.split('.').collect();
  let [year, month, day] = parts[..] else {
    return String::new();
  };

  let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
  let unknown = |s: &str| s == "??";

  if !digits(year, 4) {
    return String::new();
  }
  match (digits(month, 2), digits(day, 2)) {
    (true, true) => NaiveDate::parse_from_str(date, "%Y.%m.%d")
      .map(|d| d.format("%Y-%m-%d").to_string())
      .unwrap_or_default(),
    (true, false) if unknown(day) => {
      let valid = match (year.parse::<i32>(), month.parse::<u32>()) {
        (Ok(y), Ok(m)) => NaiveDate::from_ymd_opt(y, m, 1).is_some(),
        _ => false,
      };
      if valid { format!("{year}-{month}") } else { String::new() }
    }
    (false, false) if unknown(month) && unknown(day) => year.to_owned(),
    _ => String::new(),
  }
}
