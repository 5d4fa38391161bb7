use chrono::{DateTime, Utc};
use plastmem_ai::cosine_similarity;
use plastmem_entities::LinkType;
use plastmem_shared::AppError;
use sea_orm::{
  ConnectionTrait, DbBackend, FromQueryResult, Statement,
  prelude::PgVector,
  sea_query::{ArrayType, Value},
};
use uuid::Uuid;

const TEMPORAL_WINDOW_HOURS: f64 = 24.0;
const TEMPORAL_EXISTING_LIMIT: i64 = 200;
const TEMPORAL_EDGE_CAP: usize = 10;
const SEMANTIC_THRESHOLD: f64 = 0.7;
const SEMANTIC_LIMIT: i64 = 5;
const ENTITY_EXISTING_LIMIT: i64 = 50;
const INSERT_BATCH_SIZE: usize = 500;

/// A just-persisted unit, as seen by the link builder.
pub struct NewUnit {
  pub id: Uuid,
  pub best_time: Option<DateTime<Utc>>,
  pub embedding: PgVector,
  pub entity_ids: Vec<Uuid>,
}

struct Edge {
  from: Uuid,
  to: Uuid,
  link_type: LinkType,
  weight: f64,
  entity_id: Option<Uuid>,
}

/// Builds temporal/semantic/entity edges for a batch of freshly retained
/// units and maintains the entity-cooccurrence table. Runs post-commit;
/// errors are the caller's concern to log and swallow (§4.1 step 5).
pub async fn build_links<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  units: &[NewUnit],
) -> Result<(), AppError> {
  if units.is_empty() {
    return Ok(());
  }

  let mut edges = Vec::new();
  build_temporal_edges(db, bank, units, &mut edges).await?;
  build_semantic_edges(db, bank, units, &mut edges).await?;
  build_entity_edges(db, bank, units, &mut edges).await?;

  insert_links(db, &edges).await?;
  upsert_cooccurrence(db, bank, units).await?;

  Ok(())
}

#[derive(FromQueryResult)]
struct TimedUnit {
  id: Uuid,
  best_time: DateTime<Utc>,
}

async fn build_temporal_edges<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  units: &[NewUnit],
  edges: &mut Vec<Edge>,
) -> Result<(), AppError> {
  for unit in units {
    let Some(best_time) = unit.best_time else { continue };

    let window_start = best_time - chrono::Duration::hours(TEMPORAL_WINDOW_HOURS as i64);
    let window_end = best_time + chrono::Duration::hours(TEMPORAL_WINDOW_HOURS as i64);

    let sql = r"
      SELECT id, COALESCE(event_date, occurred_start, mentioned_at) AS best_time
      FROM memory_unit
      WHERE bank = $1
        AND id != $2
        AND COALESCE(event_date, occurred_start, mentioned_at) BETWEEN $3 AND $4
      LIMIT $5;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [
        bank.into(),
        unit.id.into(),
        window_start.into(),
        window_end.into(),
        TEMPORAL_EXISTING_LIMIT.into(),
      ],
    );
    let existing = TimedUnit::find_by_statement(stmt).all(db).await?;

    let mut candidates: Vec<(Uuid, f64)> = existing
      .into_iter()
      .map(|row| {
        let hours = (row.best_time - best_time).num_minutes() as f64 / 60.0;
        (row.id, (1.0 - hours.abs() / TEMPORAL_WINDOW_HOURS).max(0.3))
      })
      .collect();

    // Intra-batch pairs: later units in this same call also count as candidates.
    for other in units {
      if other.id == unit.id {
        continue;
      }
      if let Some(other_time) = other.best_time {
        let hours = (other_time - best_time).num_minutes() as f64 / 60.0;
        if hours.abs() <= TEMPORAL_WINDOW_HOURS {
          candidates.push((other.id, (1.0 - hours.abs() / TEMPORAL_WINDOW_HOURS).max(0.3)));
        }
      }
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(TEMPORAL_EDGE_CAP);

    for (other_id, weight) in candidates {
      edges.push(Edge { from: unit.id, to: other_id, link_type: LinkType::Temporal, weight, entity_id: None });
      edges.push(Edge { from: other_id, to: unit.id, link_type: LinkType::Temporal, weight, entity_id: None });
    }
  }

  Ok(())
}

#[derive(FromQueryResult)]
struct SimilarUnit {
  id: Uuid,
  similarity: f64,
}

async fn build_semantic_edges<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  units: &[NewUnit],
  edges: &mut Vec<Edge>,
) -> Result<(), AppError> {
  for unit in units {
    let sql = r"
      SELECT id, -(embedding <#> $1) AS similarity
      FROM memory_unit
      WHERE bank = $2 AND id != $3 AND -(embedding <#> $1) >= $4
      ORDER BY similarity DESC
      LIMIT $5;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [
        unit.embedding.clone().into(),
        bank.into(),
        unit.id.into(),
        SEMANTIC_THRESHOLD.into(),
        SEMANTIC_LIMIT.into(),
      ],
    );
    let similar = SimilarUnit::find_by_statement(stmt).all(db).await?;

    for row in similar {
      edges.push(Edge { from: unit.id, to: row.id, link_type: LinkType::Semantic, weight: row.similarity, entity_id: None });
      edges.push(Edge { from: row.id, to: unit.id, link_type: LinkType::Semantic, weight: row.similarity, entity_id: None });
    }

    // Intra-batch pairs, computed in-memory to avoid extra round-trips.
    for other in units {
      if other.id == unit.id {
        continue;
      }
      let sim = cosine_similarity(unit.embedding.as_slice(), other.embedding.as_slice()) as f64;
      if sim >= SEMANTIC_THRESHOLD {
        edges.push(Edge { from: unit.id, to: other.id, link_type: LinkType::Semantic, weight: sim, entity_id: None });
      }
    }
  }

  Ok(())
}

#[derive(FromQueryResult)]
struct RecentUnit {
  id: Uuid,
}

async fn build_entity_edges<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  units: &[NewUnit],
  edges: &mut Vec<Edge>,
) -> Result<(), AppError> {
  let mut by_entity: std::collections::HashMap<Uuid, Vec<Uuid>> = std::collections::HashMap::new();
  for unit in units {
    for entity_id in &unit.entity_ids {
      by_entity.entry(*entity_id).or_default().push(unit.id);
    }
  }

  for (entity_id, group) in by_entity {
    for (i, &a) in group.iter().enumerate() {
      for &b in &group[i + 1..] {
        edges.push(Edge { from: a, to: b, link_type: LinkType::Entity, weight: 1.0, entity_id: Some(entity_id) });
        edges.push(Edge { from: b, to: a, link_type: LinkType::Entity, weight: 1.0, entity_id: Some(entity_id) });
      }
    }

    let new_ids = uuid_array(group.clone());
    let sql = r"
      SELECT mu.id AS id
      FROM unit_entity ue
      JOIN memory_unit mu ON mu.id = ue.unit_id
      WHERE ue.entity_id = $1 AND mu.bank = $2 AND NOT (mu.id = ANY($3::uuid[]))
      ORDER BY mu.mentioned_at DESC
      LIMIT $4;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [entity_id.into(), bank.into(), new_ids, ENTITY_EXISTING_LIMIT.into()],
    );
    let existing = RecentUnit::find_by_statement(stmt).all(db).await?;

    for unit_id in &group {
      for row in &existing {
        edges.push(Edge { from: *unit_id, to: row.id, link_type: LinkType::Entity, weight: 1.0, entity_id: Some(entity_id) });
        edges.push(Edge { from: row.id, to: *unit_id, link_type: LinkType::Entity, weight: 1.0, entity_id: Some(entity_id) });
      }
    }
  }

  Ok(())
}

async fn upsert_cooccurrence<C: ConnectionTrait>(db: &C, bank: Uuid, units: &[NewUnit]) -> Result<(), AppError> {
  let mut pairs: Vec<(Uuid, Uuid)> = Vec::new();
  for unit in units {
    if unit.entity_ids.len() < 2 {
      continue;
    }
    let mut sorted = unit.entity_ids.clone();
    sorted.sort();
    sorted.dedup();
    for i in 0..sorted.len() {
      for j in i + 1..sorted.len() {
        pairs.push((sorted[i], sorted[j]));
      }
    }
  }
  if pairs.is_empty() {
    return Ok(());
  }

  let a: Vec<Uuid> = pairs.iter().map(|(a, _)| *a).collect();
  let b: Vec<Uuid> = pairs.iter().map(|(_, b)| *b).collect();

  let sql = r"
    INSERT INTO entity_cooccurrence (entity_id_1, entity_id_2, bank, cooccurrence_count, last_cooccurred)
    SELECT unnest($1::uuid[]), unnest($2::uuid[]), $3, 1, now()
    ON CONFLICT (entity_id_1, entity_id_2) DO UPDATE
      SET cooccurrence_count = entity_cooccurrence.cooccurrence_count + 1, last_cooccurred = now();
  ";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [uuid_array(a), uuid_array(b), bank.into()]);
  db.execute(stmt).await?;

  Ok(())
}

async fn insert_links<C: ConnectionTrait>(db: &C, edges: &[Edge]) -> Result<(), AppError> {
  for chunk in edges.chunks(INSERT_BATCH_SIZE) {
    let from: Vec<Uuid> = chunk.iter().map(|e| e.from).collect();
    let to: Vec<Uuid> = chunk.iter().map(|e| e.to).collect();
    let link_types: Vec<String> = chunk.iter().map(|e| link_type_str(e.link_type).to_owned()).collect();
    let weights: Vec<f64> = chunk.iter().map(|e| e.weight).collect();
    let entity_ids: Vec<Value> = chunk.iter().map(|e| e.entity_id.map_or(Value::Uuid(None), Into::into)).collect();

    let sql = r"
      INSERT INTO memory_link (bank, from_unit, to_unit, link_type, weight, entity_id)
      SELECT mu.bank, f, t, lt, w, eid
      FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::float8[], $5::uuid[]) AS u(f, t, lt, w, eid)
      JOIN memory_unit mu ON mu.id = u.f
      ON CONFLICT (from_unit, to_unit, link_type, COALESCE(entity_id, '00000000-0000-0000-0000-000000000000')) DO NOTHING;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [
        uuid_array(from),
        uuid_array(to),
        text_array(link_types),
        Value::Array(ArrayType::Double, Some(Box::new(weights.into_iter().map(Into::into).collect()))),
        Value::Array(ArrayType::Uuid, Some(Box::new(entity_ids))),
      ],
    );
    db.execute(stmt).await?;
  }

  Ok(())
}

fn link_type_str(link_type: LinkType) -> &'static str {
  match link_type {
    LinkType::Semantic => "semantic",
    LinkType::Temporal => "temporal",
    LinkType::Entity => "entity",
    LinkType::Causes => "causes",
    LinkType::CausedBy => "caused_by",
  }
}

fn uuid_array(ids: Vec<Uuid>) -> Value {
  Value::Array(ArrayType::Uuid, Some(Box::new(ids.into_iter().map(Into::into).collect())))
}

fn text_array(values: Vec<String>) -> Value {
  Value::Array(ArrayType::String, Some(Box::new(values.into_iter().map(Into::into).collect())))
}
