use chrono::{Duration, Utc};
use plastmem_entities::{FreshnessStatus, memory_unit};
use plastmem_shared::AppError;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbBackend, FromQueryResult, Statement};
use uuid::Uuid;

const RECENT_WINDOW_DAYS: i64 = 30;
const STRENGTHENING_RATIO: f64 = 1.5;
const WEAKENING_RATIO: f64 = 0.5;

/// Computes freshness status from the `created_at` timestamps of an
/// observation's source memories, against a 30-day recent/older split
/// (§4.8).
#[must_use]
pub fn classify(created_ats: &[chrono::DateTime<Utc>]) -> FreshnessStatus {
  if created_ats.is_empty() {
    return FreshnessStatus::Stale;
  }

  let cutoff = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
  let oldest = created_ats.iter().min().copied().unwrap();
  let recent_count = created_ats.iter().filter(|t| **t >= cutoff).count();
  let older_count = created_ats.len() - recent_count;

  if oldest >= cutoff {
    return FreshnessStatus::New;
  }
  if recent_count == 0 {
    return FreshnessStatus::Stale;
  }
  if older_count == 0 {
    return FreshnessStatus::New;
  }

  let span_days = (Utc::now() - oldest).num_days().max(1) as f64;
  let recent_density = recent_count as f64 / RECENT_WINDOW_DAYS as f64;
  let older_span = (span_days - RECENT_WINDOW_DAYS as f64).max(1.0);
  let older_density = older_count as f64 / older_span;

  if older_density <= 0.0 {
    return FreshnessStatus::Strengthening;
  }

  let ratio = recent_density / older_density;
  if ratio > STRENGTHENING_RATIO {
    FreshnessStatus::Strengthening
  } else if ratio < WEAKENING_RATIO {
    FreshnessStatus::Weakening
  } else {
    FreshnessStatus::Stable
  }
}

#[derive(FromQueryResult)]
struct ObservationSources {
  id: Uuid,
  source_memory_ids: Vec<Uuid>,
}

#[derive(FromQueryResult)]
struct CreatedAtRow {
  created_at: chrono::DateTime<Utc>,
}

/// Recomputes and persists `freshness_status` for every observation in
/// `bank`, batched per-observation source-memory lookup. Run after each
/// consolidation iteration that processed at least one fact (§4.3 step 3).
pub async fn refresh_bank<C: ConnectionTrait>(db: &C, bank: Uuid) -> Result<usize, AppError> {
  let sql = r"
    SELECT id, source_memory_ids
    FROM memory_unit
    WHERE bank = $1 AND fact_type = 'observation';
  ";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [bank.into()]);
  let observations = ObservationSources::find_by_statement(stmt).all(db).await?;

  let mut updated = 0;
  for obs in observations {
    let created_ats = if obs.source_memory_ids.is_empty() {
      Vec::new()
    } else {
      let sql = "SELECT created_at FROM memory_unit WHERE id = ANY($1::uuid[]);";
      let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        [sea_orm::sea_query::Value::Array(
          sea_orm::sea_query::ArrayType::Uuid,
          Some(Box::new(obs.source_memory_ids.iter().copied().map(Into::into).collect())),
        )],
      );
      CreatedAtRow::find_by_statement(stmt)
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.created_at)
        .collect()
    };

    let status = classify(&created_ats);
    let model = memory_unit::ActiveModel {
      id: Set(obs.id),
      freshness_status: Set(Some(status)),
      ..Default::default()
    };
    sea_orm::ActiveModelTrait::update(model, db).await?;
    updated += 1;
  }

  tracing::debug!(bank = %bank, updated, "freshness pass complete");
  Ok(updated)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_evidence_is_stale() {
    assert_eq!(classify(&[]), FreshnessStatus::Stale);
  }

  #[test]
  fn all_recent_is_new() {
    let now = Utc::now();
    assert_eq!(classify(&[now, now - Duration::days(5)]), FreshnessStatus::New);
  }

  #[test]
  fn no_recent_evidence_is_stale() {
    let old = Utc::now() - Duration::days(60);
    assert_eq!(classify(&[old, old - Duration::days(10)]), FreshnessStatus::Stale);
  }

  #[test]
  fn mixed_evidence_ratio_picks_strengthening_or_weakening() {
    let now = Utc::now();
    let recent = vec![now, now - Duration::days(2), now - Duration::days(10)];
    let older = vec![now - Duration::days(40)];
    let mut all = recent;
    all.extend(older);
    assert_eq!(classify(&all), FreshnessStatus::Strengthening);
  }
}
