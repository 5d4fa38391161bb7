use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use plastmem_entities::LinkType;
use plastmem_shared::AppError;
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement, prelude::PgVector};
use uuid::Uuid;

const MAX_RELATIVE_YEARS: i64 = 10;
const DIRECT_MATCH_LIMIT: i64 = 20;
const DIRECT_MATCH_SIMILARITY_THRESHOLD: f64 = 0.1;
const LINK_WEIGHT_THRESHOLD: f64 = 0.1;
const CAUSAL_BOOST: f64 = 2.0;
const DECAY: f64 = 0.7;
const PROPAGATED_SCORE_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

fn day_start(dt: DateTime<Utc>) -> DateTime<Utc> {
  dt.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn month_start(dt: DateTime<Utc>) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).unwrap()
}

fn add_months(dt: DateTime<Utc>, delta: i32) -> DateTime<Utc> {
  let total = dt.year() * 12 + (dt.month() as i32 - 1) + delta;
  let year = total.div_euclid(12);
  let month = total.rem_euclid(12) + 1;
  Utc.with_ymd_and_hms(year, month as u32, 1, 0, 0, 0).unwrap()
}

fn weekday_from_word(word: &str) -> Option<Weekday> {
  Some(match word {
    "monday" => Weekday::Mon,
    "tuesday" => Weekday::Tue,
    "wednesday" => Weekday::Wed,
    "thursday" => Weekday::Thu,
    "friday" => Weekday::Fri,
    "saturday" => Weekday::Sat,
    "sunday" => Weekday::Sun,
    _ => return None,
  })
}

/// Extracts an optional `[start, end)` range from natural-language time
/// expressions in `query` (§4.2 step 2). Supports: `today`, `yesterday`,
/// `N day(s)/week(s)/month(s)/year(s) ago`, `last week`, `last month`
/// (calendar-month semantics), `last <weekday>`, and absolute `YYYY-MM`.
/// Relative `N` is capped at 10 years. Returns `None` when nothing matches.
#[must_use]
pub fn extract_time_range(query: &str, now: DateTime<Utc>) -> Option<TimeRange> {
  let lower = query.to_lowercase();

  if lower.contains("yesterday") {
    let start = day_start(now) - Duration::days(1);
    return Some(TimeRange { start, end: day_start(now) });
  }
  if lower.contains("today") {
    return Some(TimeRange { start: day_start(now), end: day_start(now) + Duration::days(1) });
  }
  if lower.contains("last month") {
    let this_month = month_start(now);
    return Some(TimeRange { start: add_months(this_month, -1), end: this_month });
  }
  if lower.contains("last week") {
    let week_start = day_start(now) - Duration::days(now.weekday().num_days_from_monday() as i64);
    return Some(TimeRange { start: week_start - Duration::days(7), end: week_start });
  }

  for word in lower.split_whitespace() {
    if let Some(weekday) = weekday_from_word(word.trim_matches(|c: char| !c.is_alphabetic()))
      && lower.contains("last")
    {
      let mut cursor = day_start(now) - Duration::days(1);
      for _ in 0..7 {
        if cursor.weekday() == weekday {
          return Some(TimeRange { start: cursor, end: cursor + Duration::days(1) });
        }
        cursor -= Duration::days(1);
      }
    }
  }

  if let Some(range) = extract_relative_n_ago(&lower, now) {
    return Some(range);
  }

  extract_absolute_year_month(&lower)
}

fn extract_relative_n_ago(lower: &str, now: DateTime<Utc>) -> Option<TimeRange> {
  let units: [(&str, i64); 4] = [
    ("year", 365),
    ("month", 30),
    ("week", 7),
    ("day", 1),
  ];

  for (unit, days_per_unit) in units {
    let plural = format!("{unit}s ago");
    let singular = format!("{unit} ago");
    for suffix in [plural.as_str(), singular.as_str()] {
      let Some(pos) = lower.find(suffix) else { continue };
      let prefix = lower[..pos].trim_end();
      let Some(number_str) = prefix.split_whitespace().next_back() else { continue };
      let Ok(n) = number_str.parse::<i64>() else { continue };
      let n = n.clamp(0, MAX_RELATIVE_YEARS * 365);
      let target = day_start(now) - Duration::days(n * days_per_unit);
      return Some(TimeRange { start: target, end: target + Duration::days(days_per_unit) });
    }
  }
  None
}

/// Matches a bare `YYYY-MM` or `YYYY/MM` token for month-level ranges.
fn extract_absolute_year_month(lower: &str) -> Option<TimeRange> {
  for token in lower.split(|c: char| c.is_whitespace()) {
    let normalised = token.replace('/', "-");
    let parts: Vec<&str> = normalised.split('-').collect();
    if parts.len() != 2 {
      continue;
    }
    let Ok(year) = parts[0].parse::<i32>() else { continue };
    let Ok(month) = parts[1].parse::<u32>() else { continue };
    if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
      continue;
    }
    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    return Some(TimeRange { start, end: add_months(start, 1) });
  }
  None
}

fn proximity(t: DateTime<Utc>, range: TimeRange) -> f64 {
  let mid = range.start + (range.end - range.start) / 2;
  let half_span = (range.end - range.start).num_seconds().max(1) as f64 / 2.0;
  let dist = (t - mid).num_seconds().abs() as f64;
  (1.0 - dist / half_span).max(0.0)
}

#[derive(FromQueryResult)]
struct DirectMatch {
  id: Uuid,
  best_time: DateTime<Utc>,
}

#[derive(FromQueryResult)]
struct LinkedCandidate {
  to_unit: Uuid,
  link_type: String,
  weight: f64,
  best_time: DateTime<Utc>,
}

/// Direct range match + one hop of link expansion (§4.5).
pub async fn search<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  range: TimeRange,
  embedding: &PgVector,
  budget: u64,
) -> Result<Vec<(Uuid, f64)>, AppError> {
  let sql = r"
    SELECT id, COALESCE(event_date, occurred_start, mentioned_at) AS best_time
    FROM memory_unit
    WHERE bank = $1
      AND fact_type IN ('world', 'experience', 'observation')
      AND -(embedding <#> $2) >= $3
      AND (
        (occurred_start IS NOT NULL AND occurred_end IS NOT NULL AND occurred_start <= $5 AND occurred_end >= $4)
        OR mentioned_at BETWEEN $4 AND $5
        OR occurred_start BETWEEN $4 AND $5
        OR occurred_end BETWEEN $4 AND $5
      )
    LIMIT $6;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [
      bank.into(),
      embedding.clone().into(),
      DIRECT_MATCH_SIMILARITY_THRESHOLD.into(),
      range.start.into(),
      range.end.into(),
      DIRECT_MATCH_LIMIT.into(),
    ],
  );
  let direct = DirectMatch::find_by_statement(stmt).all(db).await?;

  let mut scores: std::collections::HashMap<Uuid, f64> = std::collections::HashMap::new();
  for row in &direct {
    scores.insert(row.id, proximity(row.best_time, range));
  }

  if !direct.is_empty() {
    let ids: Vec<Uuid> = direct.iter().map(|r| r.id).collect();
    let sql = r"
      SELECT l.to_unit AS to_unit, l.link_type AS link_type, l.weight AS weight,
             COALESCE(mu.event_date, mu.occurred_start, mu.mentioned_at) AS best_time
      FROM memory_link l
      JOIN memory_unit mu ON mu.id = l.to_unit
      WHERE l.from_unit = ANY($1::uuid[])
        AND l.link_type IN ('temporal', 'causes', 'caused_by')
        AND l.weight >= $2;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [
        sea_orm::sea_query::Value::Array(
          sea_orm::sea_query::ArrayType::Uuid,
          Some(Box::new(ids.into_iter().map(Into::into).collect())),
        ),
        LINK_WEIGHT_THRESHOLD.into(),
      ],
    );
    let linked = LinkedCandidate::find_by_statement(stmt).all(db).await?;

    for row in linked {
      let boost = if row.link_type == "causes" || row.link_type == "caused_by" { CAUSAL_BOOST } else { 1.0 };
      let parent = scores.values().copied().fold(0.0_f64, f64::max).max(1.0);
      let propagated = parent * row.weight * boost * DECAY;
      let neighbour_proximity = proximity(row.best_time, range);
      let combined = neighbour_proximity.max(propagated);
      if combined < PROPAGATED_SCORE_FLOOR {
        continue;
      }
      let entry = scores.entry(row.to_unit).or_insert(0.0);
      if combined > *entry {
        *entry = combined;
      }
    }
  }

  let mut ranked: Vec<(Uuid, f64)> = scores.into_iter().collect();
  ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
  ranked.truncate(budget as usize);
  Ok(ranked)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 19, 10, 0, 0).unwrap()
  }

  #[test]
  fn last_month_uses_calendar_semantics() {
    let range = extract_time_range("what happened last month", fixed_now()).unwrap();
    assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn absolute_year_month_parses() {
    let range = extract_time_range("anything from 2025-06", fixed_now()).unwrap();
    assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn no_match_returns_none() {
    assert!(extract_time_range("tell me about Alice", fixed_now()).is_none());
  }

  #[test]
  fn n_days_ago_is_capped_and_parsed() {
    let range = extract_time_range("3 days ago", fixed_now()).unwrap();
    assert_eq!(range.start, day_start(fixed_now()) - Duration::days(3));
  }
}
