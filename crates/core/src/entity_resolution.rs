use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use plastmem_entities::entity;
use plastmem_shared::AppError;
use sea_orm::{
  ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, QueryFilter, Statement,
  sea_query::{ArrayType, Value},
};
use uuid::Uuid;

fn uuid_array(ids: Vec<Uuid>) -> Value {
  Value::Array(ArrayType::Uuid, Some(Box::new(ids.into_iter().map(Into::into).collect())))
}

fn text_array(values: Vec<String>) -> Value {
  Value::Array(ArrayType::String, Some(Box::new(values.into_iter().map(Into::into).collect())))
}

const MATCH_THRESHOLD: f64 = 0.6;
const TEMPORAL_WINDOW_DAYS: f64 = 7.0;

const NAME_WEIGHT: f64 = 0.5;
const COOC_WEIGHT: f64 = 0.3;
const TEMPORAL_WEIGHT: f64 = 0.2;

#[derive(FromQueryResult)]
struct CooccurrenceRow {
  entity_id_1: Uuid,
  entity_id_2: Uuid,
  name_1: String,
  name_2: String,
}

/// Maps an entity id to the lower-cased canonical names it is known to
/// co-occur with in this bank.
type CoocMap = HashMap<Uuid, HashSet<String>>;

async fn fetch_cooccurrence_map<C: ConnectionTrait>(db: &C, bank: Uuid) -> Result<CoocMap, AppError> {
  let sql = r"
    SELECT ec.entity_id_1 AS entity_id_1, ec.entity_id_2 AS entity_id_2,
           e1.canonical_name AS name_1, e2.canonical_name AS name_2
    FROM entity_cooccurrence ec
    JOIN entity e1 ON e1.id = ec.entity_id_1
    JOIN entity e2 ON e2.id = ec.entity_id_2
    WHERE ec.bank = $1
  ";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [bank.into()]);
  let rows = CooccurrenceRow::find_by_statement(stmt).all(db).await?;

  let mut map: CoocMap = HashMap::new();
  for row in rows {
    map
      .entry(row.entity_id_1)
      .or_default()
      .insert(row.name_2.to_lowercase());
    map
      .entry(row.entity_id_2)
      .or_default()
      .insert(row.name_1.to_lowercase());
  }
  Ok(map)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
  let mut dp = vec![0usize; b.len() + 1];
  for &ca in a {
    let mut prev = 0;
    for (j, &cb) in b.iter().enumerate() {
      let temp = dp[j + 1];
      dp[j + 1] = if ca == cb { prev + 1 } else { dp[j + 1].max(dp[j]) };
      prev = temp;
    }
  }
  dp[b.len()]
}

fn name_similarity(a: &str, b: &str) -> f64 {
  let ac: Vec<char> = a.to_lowercase().chars().collect();
  let bc: Vec<char> = b.to_lowercase().chars().collect();
  if ac.is_empty() || bc.is_empty() {
    return 0.0;
  }
  lcs_len(&ac, &bc) as f64 / ac.len().max(bc.len()) as f64
}

fn temporal_score(event_date: Option<DateTime<Utc>>, last_seen: DateTime<Utc>) -> f64 {
  let Some(event_date) = event_date else { return 0.0 };
  let days_diff = (event_date - last_seen).num_seconds().abs() as f64 / 86400.0;
  (1.0 - days_diff / TEMPORAL_WINDOW_DAYS).max(0.0)
}

enum Resolution {
  Matched(Uuid),
  ToCreate(String),
}

/// Resolves a fact's `who[]` names to canonical Entity ids, creating new
/// entities where no existing one scores above the match threshold.
///
/// Issues exactly 3 queries (fetch entities, fetch cooccurrence map,
/// batch-insert) when every name is new, and 4 when at least one matches
/// (adding a batch-update).
pub async fn resolve_entities<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  names: &[String],
  event_date: Option<DateTime<Utc>>,
) -> Result<Vec<Uuid>, AppError> {
  let mut seen = HashSet::new();
  let mut unique_names: Vec<String> = Vec::new();
  for name in names {
    let trimmed = name.trim();
    if trimmed.is_empty() {
      continue;
    }
    if seen.insert(trimmed.to_lowercase()) {
      unique_names.push(trimmed.to_owned());
    }
  }
  if unique_names.is_empty() {
    return Ok(Vec::new());
  }

  // Query 1: every entity this bank currently knows about.
  let candidates = entity::Entity::find()
    .filter(entity::Column::Bank.eq(bank))
    .all(db)
    .await?;

  // Query 2: the bank's cooccurrence graph, keyed by entity id.
  let cooc_map = fetch_cooccurrence_map(db, bank).await?;

  let mut resolutions: Vec<Resolution> = Vec::with_capacity(unique_names.len());

  for (i, name) in unique_names.iter().enumerate() {
    let exact = candidates
      .iter()
      .find(|c| c.canonical_name.eq_ignore_ascii_case(name));

    if let Some(candidate) = exact {
      resolutions.push(Resolution::Matched(candidate.id));
      continue;
    }

    let nearby_names: HashSet<String> = unique_names
      .iter()
      .enumerate()
      .filter(|(j, _)| *j != i)
      .map(|(_, n)| n.to_lowercase())
      .collect();

    let mut best_score = 0.0_f64;
    let mut best_id: Option<Uuid> = None;

    for candidate in &candidates {
      let name_sim = name_similarity(name, &candidate.canonical_name);

      let cooc_score = if nearby_names.is_empty() {
        0.0
      } else {
        let known = cooc_map.get(&candidate.id).cloned().unwrap_or_default();
        let overlap = nearby_names.intersection(&known).count();
        overlap as f64 / nearby_names.len() as f64
      };

      let temporal = temporal_score(event_date, candidate.last_seen.to_utc());

      let score = NAME_WEIGHT * name_sim + COOC_WEIGHT * cooc_score + TEMPORAL_WEIGHT * temporal;
      if score > best_score {
        best_score = score;
        best_id = Some(candidate.id);
      }
    }

    match best_id {
      Some(id) if best_score >= MATCH_THRESHOLD => resolutions.push(Resolution::Matched(id)),
      _ => resolutions.push(Resolution::ToCreate(name.clone())),
    }
  }

  let to_create: Vec<(Uuid, String)> = resolutions
    .iter()
    .filter_map(|r| match r {
      Resolution::ToCreate(name) => Some((Uuid::now_v7(), name.clone())),
      Resolution::Matched(_) => None,
    })
    .collect();
  let matched_ids: Vec<Uuid> = resolutions
    .iter()
    .filter_map(|r| match r {
      Resolution::Matched(id) => Some(*id),
      Resolution::ToCreate(_) => None,
    })
    .collect();

  let mut created_ids: HashMap<String, Uuid> = HashMap::new();

  if !to_create.is_empty() {
    // Query 3: batch-insert new names, tolerating a racing insert of the
    // same (bank, lower(name)) pair via ON CONFLICT.
    let ids: Vec<Uuid> = to_create.iter().map(|(id, _)| *id).collect();
    let insert_names: Vec<String> = to_create.iter().map(|(_, n)| n.clone()).collect();

    let sql = r"
      INSERT INTO entity (id, bank, canonical_name, entity_type, mention_count, last_seen)
      SELECT unnest($1::uuid[]), $2, unnest($3::text[]), 'unknown', 1, now()
      ON CONFLICT (bank, LOWER(canonical_name)) DO UPDATE
        SET mention_count = entity.mention_count + 1, last_seen = now()
      RETURNING id, canonical_name;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [uuid_array(ids), bank.into(), text_array(insert_names)],
    );
    let rows = entity::Model::find_by_statement(stmt).all(db).await?;
    for row in rows {
      created_ids.insert(row.canonical_name.to_lowercase(), row.id);
    }
  }

  if !matched_ids.is_empty() {
    // Query 4: bump mention_count/last_seen for every matched entity.
    let sql = "UPDATE entity SET mention_count = mention_count + 1, last_seen = now() WHERE id = ANY($1::uuid[]);";
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [uuid_array(matched_ids.clone())]);
    db.execute(stmt).await?;
  }

  let resolved = resolutions
    .into_iter()
    .map(|r| match r {
      Resolution::Matched(id) => id,
      Resolution::ToCreate(name) => *created_ids
        .get(&name.to_lowercase())
        .expect("just-created entity must be present in the returning set"),
    })
    .collect();

  Ok(resolved)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lcs_ratio_is_one_for_identical_names() {
    assert!((name_similarity("Alice", "alice") - 1.0).abs() < 1e-9);
  }

  #[test]
  fn lcs_ratio_handles_partial_overlap() {
    let score = name_similarity("Alice", "Alicia");
    assert!(score > 0.5 && score < 1.0);
  }

  #[test]
  fn temporal_score_decays_to_zero_past_the_window() {
    let event = Utc::now();
    let last_seen = event - chrono::Duration::days(30);
    assert_eq!(temporal_score(Some(event), last_seen), 0.0);
  }

  #[test]
  fn temporal_score_is_zero_without_event_date() {
    assert_eq!(temporal_score(None, Utc::now()), 0.0);
  }
}
