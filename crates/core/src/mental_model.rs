use chrono::Utc;
use plastmem_entities::mental_model;
use plastmem_shared::AppError;
use sea_orm::{
  ActiveValue::Set, ConnectionTrait, DbBackend, FromQueryResult, Statement, prelude::PgVector,
};
use uuid::Uuid;

/// Tag-filter mode shared by mental-model search and the Reflect tool
/// palette's observation/recall searches (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
  Any,
  All,
  AnyStrict,
  AllStrict,
}

impl TagMatch {
  #[must_use]
  pub fn parse(raw: &str) -> Self {
    match raw {
      "all" => Self::All,
      "any_strict" => Self::AnyStrict,
      "all_strict" => Self::AllStrict,
      _ => Self::Any,
    }
  }

  const fn is_strict(self) -> bool {
    matches!(self, Self::AnyStrict | Self::AllStrict)
  }

  const fn is_all(self) -> bool {
    matches!(self, Self::All | Self::AllStrict)
  }
}

/// Builds the `AND`-clause fragment for a tag filter against `column`.
/// `column` must come from a fixed allow-list at the call site, never from
/// unescaped user input, since it is spliced directly into the SQL text.
fn tag_clause(column: &str, tags: &[String], mode: TagMatch, placeholder: &str) -> String {
  if tags.is_empty() {
    return String::new();
  }
  let op = if mode.is_all() { "@>" } else { "&&" };
  let strict = if mode.is_strict() {
    format!(" AND array_length({column}, 1) > 0")
  } else {
    String::new()
  };
  format!(" AND {column} {op} {placeholder}::text[]{strict}")
}

/// `search_mental_models(query_embedding, threshold=0.1, limit<=20)` —
/// the Reflect tool of the same name (§4.9). Selects `mental_model.*` plus
/// a computed `similarity` column; `Model::from_query_result` only reads
/// the columns it declares, so the extra column is simply ignored by it.
pub async fn search<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  query_embedding: &PgVector,
  threshold: f64,
  limit: u64,
  tags: &[String],
  tags_match: TagMatch,
  exclude_ids: &[Uuid],
) -> Result<Vec<(mental_model::Model, f64)>, AppError> {
  let mut sql = String::from(
    r"
    SELECT mental_model.*, -(embedding <#> $1) AS similarity
    FROM mental_model
    WHERE bank = $2 AND -(embedding <#> $1) >= $3
  ",
  );
  let mut params: Vec<sea_orm::Value> = vec![query_embedding.clone().into(), bank.into(), threshold.into()];

  sql.push_str(&tag_clause("tags", tags, tags_match, &format!("${}", params.len() + 1)));
  if !tags.is_empty() {
    params.push(sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::String,
      Some(Box::new(tags.iter().cloned().map(Into::into).collect())),
    ));
  }

  if !exclude_ids.is_empty() {
    sql.push_str(&format!(" AND NOT (id = ANY(${}::uuid[]))", params.len() + 1));
    params.push(sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::Uuid,
      Some(Box::new(exclude_ids.iter().copied().map(Into::into).collect())),
    ));
  }

  sql.push_str(&format!(" ORDER BY similarity DESC LIMIT ${}", params.len() + 1));
  params.push(limit.into());

  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, params);
  let rows = db.query_all(stmt).await?;

  let mut results = Vec::with_capacity(rows.len());
  for row in rows {
    let model = mental_model::Model::from_query_result(&row, "")?;
    let similarity: f64 = row.try_get("", "similarity")?;
    results.push((model, similarity));
  }
  Ok(results)
}

/// Overwrites `content`/`embedding`/`source_observation_ids` after a
/// Consolidation-triggered refresh (§4.3 step 3).
pub async fn refresh<C: ConnectionTrait>(
  db: &C,
  id: Uuid,
  content: String,
  source_observation_ids: Vec<Uuid>,
  embedding: PgVector,
) -> Result<(), AppError> {
  let now = Utc::now();
  let model = mental_model::ActiveModel {
    id: Set(id),
    content: Set(content),
    source_observation_ids: Set(source_observation_ids),
    embedding: Set(embedding),
    last_refreshed_at: Set(Some(now.into())),
    updated_at: Set(now.into()),
    ..Default::default()
  };
  sea_orm::ActiveModelTrait::update(model, db).await?;
  Ok(())
}

#[derive(FromQueryResult)]
pub struct RefreshCandidate {
  pub id: Uuid,
  pub source_query: Option<String>,
  pub tags: Vec<String>,
}

/// Mental models whose `trigger.refresh_after_consolidation = true`,
/// oldest-refreshed first, capped at `limit` (§4.3 step 3, "at most 3").
pub async fn refresh_candidates<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  limit: u64,
) -> Result<Vec<RefreshCandidate>, AppError> {
  let sql = r"
    SELECT id, source_query, tags
    FROM mental_model
    WHERE bank = $1 AND (trigger->>'refresh_after_consolidation')::boolean IS TRUE
    ORDER BY last_refreshed_at ASC NULLS FIRST
    LIMIT $2;
  ";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [bank.into(), limit.into()]);
  Ok(RefreshCandidate::find_by_statement(stmt).all(db).await?)
}

#[derive(FromQueryResult)]
pub struct AutoGenCandidate {
  pub entity_id: Uuid,
  pub canonical_name: String,
}

/// Entities that touched an affected observation this cycle, have at least
/// `min_observations` linked observations in-bank, and have no existing
/// mental model either by `entity_id` or by name trigram similarity >= 0.8
/// (§4.3 step 3, "auto-generate").
pub async fn auto_generate_candidates<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  touched_entity_ids: &[Uuid],
  min_observations: i64,
  limit: u64,
) -> Result<Vec<AutoGenCandidate>, AppError> {
  if touched_entity_ids.is_empty() {
    return Ok(Vec::new());
  }

  let sql = r"
    SELECT e.id AS entity_id, e.canonical_name AS canonical_name
    FROM entity e
    WHERE e.bank = $1
      AND e.id = ANY($2::uuid[])
      AND (
        SELECT count(*)
        FROM unit_entity ue
        JOIN memory_unit mu ON mu.id = ue.unit_id
        WHERE ue.entity_id = e.id AND mu.fact_type = 'observation'
      ) >= $3
      AND NOT EXISTS (
        SELECT 1 FROM mental_model mm
        WHERE mm.bank = e.bank
          AND (mm.entity_id = e.id OR similarity(mm.name, e.canonical_name) >= 0.8)
      )
    LIMIT $4;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [
      bank.into(),
      sea_orm::sea_query::Value::Array(
        sea_orm::sea_query::ArrayType::Uuid,
        Some(Box::new(touched_entity_ids.iter().copied().map(Into::into).collect())),
      ),
      min_observations.into(),
      limit.into(),
    ],
  );
  Ok(AutoGenCandidate::find_by_statement(stmt).all(db).await?)
}

/// Inserts a freshly auto-generated mental model (§4.3 step 3).
pub async fn create<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  name: String,
  content: String,
  embedding: PgVector,
  source_query: Option<String>,
  entity_id: Option<Uuid>,
  source_observation_ids: Vec<Uuid>,
) -> Result<Uuid, AppError> {
  let id = Uuid::now_v7();
  let now = Utc::now();
  let model = mental_model::ActiveModel {
    id: Set(id),
    bank: Set(bank),
    name: Set(name),
    description: Set(None),
    content: Set(content),
    embedding: Set(embedding),
    source_query: Set(source_query),
    entity_id: Set(entity_id),
    source_observation_ids: Set(source_observation_ids),
    tags: Set(Vec::new()),
    max_tokens: Set(512),
    trigger: Set(serde_json::json!({ "refresh_after_consolidation": true })),
    last_refreshed_at: Set(Some(now.into())),
    created_at: Set(now.into()),
    updated_at: Set(now.into()),
  };
  sea_orm::ActiveModelTrait::insert(model, db).await?;
  Ok(id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn any_mode_uses_overlap_operator() {
    let clause = tag_clause("tags", &["a".to_owned()], TagMatch::Any, "$9");
    assert!(clause.contains("&&"));
    assert!(!clause.contains("array_length"));
  }

  #[test]
  fn all_strict_mode_uses_contains_and_nonempty_guard() {
    let clause = tag_clause("tags", &["a".to_owned()], TagMatch::AllStrict, "$9");
    assert!(clause.contains("@>"));
    assert!(clause.contains("array_length"));
  }

  #[test]
  fn empty_tags_produce_no_clause() {
    assert_eq!(tag_clause("tags", &[], TagMatch::All, "$9"), "");
  }
}
