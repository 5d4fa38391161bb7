use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use plastmem_ai::{embed, rerank};
use plastmem_entities::{FactKind, FactType};
use plastmem_shared::AppError;
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement, prelude::PgVector};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::graph_search;
use crate::rrf::reciprocal_rank_fuse;
use crate::temporal_search::{self, TimeRange};

const SEMANTIC_THRESHOLD: f64 = 0.1;
const SEMANTIC_PER_TYPE_LIMIT: u64 = 34;
const KEYWORD_MIN_LEN: usize = 2;
const GRAPH_SEED_COUNT: usize = 5;
const GRAPH_SEED_THRESHOLD: f64 = 0.5;
const GRAPH_BUDGET: u64 = 50;
const RERANK_CANDIDATES: usize = 300;
const CHARS_PER_TOKEN: f64 = 3.0;
const RECENCY_WINDOW_DAYS: f64 = 365.0;

const CE_WEIGHT: f64 = 0.5;
const RRF_WEIGHT: f64 = 0.3;
const RECENCY_WEIGHT: f64 = 0.1;
const TEMPORAL_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
  Low,
  Mid,
  High,
}

impl Budget {
  #[must_use]
  pub fn parse(raw: &str) -> Self {
    match raw {
      "high" => Self::High,
      "mid" => Self::Mid,
      _ => Self::Low,
    }
  }

  const fn max_tokens(self) -> u32 {
    match self {
      Self::Low => 2048,
      Self::Mid => 4096,
      Self::High => 8192,
    }
  }

  const fn max_results(self) -> u64 {
    match self {
      Self::Low => 20,
      Self::Mid => 50,
      Self::High => 100,
    }
  }

  #[must_use]
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Mid => "mid",
      Self::High => "high",
    }
  }
}

#[derive(Debug, Clone)]
pub struct Memory {
  pub id: Uuid,
  pub text: String,
  pub context: Option<String>,
  pub fact_type: FactType,
  pub fact_kind: Option<FactKind>,
  pub event_date: Option<DateTime<Utc>>,
  pub score: f64,
}

#[derive(Debug, Clone)]
pub struct RecallResult {
  pub memories: Vec<Memory>,
  pub total_found: usize,
  pub returned: usize,
  pub budget: Budget,
}

fn empty_result(budget: Budget) -> RecallResult {
  RecallResult { memories: Vec::new(), total_found: 0, returned: 0, budget }
}

#[derive(FromQueryResult)]
struct RankedUnit {
  id: Uuid,
  score: f64,
}

async fn semantic_search<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  embedding: &PgVector,
) -> Result<Vec<(Uuid, f64)>, AppError> {
  let sql = r"
    SELECT id, score FROM (
      SELECT id, -(embedding <#> $1) AS score,
             ROW_NUMBER() OVER (PARTITION BY fact_type ORDER BY -(embedding <#> $1) DESC) AS rn
      FROM memory_unit
      WHERE bank = $2 AND -(embedding <#> $1) >= $3
    ) ranked
    WHERE rn <= $4
    ORDER BY score DESC;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [embedding.clone().into(), bank.into(), SEMANTIC_THRESHOLD.into(), SEMANTIC_PER_TYPE_LIMIT.into()],
  );
  let rows = RankedUnit::find_by_statement(stmt).all(db).await?;
  Ok(rows.into_iter().map(|r| (r.id, r.score)).collect())
}

/// Strips long compound particles then splits on whitespace/punctuation,
/// dropping tokens shorter than two characters and duplicates.
fn extract_keywords(query: &str) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  let mut keywords = Vec::new();
  for raw in query.split(|c: char| !c.is_alphanumeric()) {
    let token = raw.to_lowercase();
    if token.chars().count() < KEYWORD_MIN_LEN {
      continue;
    }
    if seen.insert(token.clone()) {
      keywords.push(token);
    }
  }
  keywords
}

async fn keyword_search<C: ConnectionTrait>(db: &C, bank: Uuid, query: &str) -> Result<Vec<(Uuid, f64)>, AppError> {
  let keywords = extract_keywords(query);
  if keywords.is_empty() {
    return Ok(Vec::new());
  }

  let sql = r"
    SELECT id, score FROM (
      SELECT id, fact_type, MAX(sim) AS score,
             ROW_NUMBER() OVER (PARTITION BY fact_type ORDER BY MAX(sim) DESC) AS rn
      FROM (
        SELECT mu.id, mu.fact_type,
               GREATEST(similarity(mu.text, kw), similarity(COALESCE(mu.context, ''), kw)) AS sim
        FROM memory_unit mu, unnest($2::text[]) AS kw
        WHERE mu.bank = $1
      ) matches
      GROUP BY id, fact_type
      HAVING MAX(sim) > 0
    ) ranked
    WHERE rn <= $3
    ORDER BY score DESC;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [
      bank.into(),
      sea_orm::sea_query::Value::Array(
        sea_orm::sea_query::ArrayType::String,
        Some(Box::new(keywords.into_iter().map(Into::into).collect())),
      ),
      SEMANTIC_PER_TYPE_LIMIT.into(),
    ],
  );
  let rows = RankedUnit::find_by_statement(stmt).all(db).await?;
  Ok(rows.into_iter().map(|r| (r.id, r.score)).collect())
}

#[derive(FromQueryResult, Clone)]
struct UnitDetail {
  id: Uuid,
  text: String,
  context: Option<String>,
  fact_type: FactType,
  fact_kind: Option<FactKind>,
  event_date: Option<DateTime<Utc>>,
  occurred_start: Option<DateTime<Utc>>,
  mentioned_at: DateTime<Utc>,
}

async fn fetch_details<C: ConnectionTrait>(db: &C, ids: &[Uuid]) -> Result<HashMap<Uuid, UnitDetail>, AppError> {
  if ids.is_empty() {
    return Ok(HashMap::new());
  }
  let sql = r"
    SELECT id, text, context, fact_type, fact_kind, event_date, occurred_start, mentioned_at
    FROM memory_unit WHERE id = ANY($1::uuid[]);
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::Uuid,
      Some(Box::new(ids.iter().copied().map(Into::into).collect())),
    )],
  );
  let rows = UnitDetail::find_by_statement(stmt).all(db).await?;
  Ok(rows.into_iter().map(|r| (r.id, r)).collect())
}

fn recency(detail: &UnitDetail) -> f64 {
  let age_days = (Utc::now() - detail.mentioned_at).num_seconds() as f64 / 86400.0;
  (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0)
}

fn temporal_proximity(detail: &UnitDetail, range: Option<TimeRange>) -> f64 {
  let Some(range) = range else { return 0.0 };
  let Some(t) = detail.event_date.or(detail.occurred_start) else { return 0.0 };
  let mid = range.start + (range.end - range.start) / 2;
  let half_span = (range.end - range.start).num_seconds().max(1) as f64 / 2.0;
  let dist = (t - mid).num_seconds().abs() as f64;
  (1.0 - dist / half_span).max(0.0)
}

/// `recall(bank, query, budget) -> {memories, total_found, returned, budget}` (§4.2).
pub async fn recall<C: ConnectionTrait>(
  db: &C,
  permits: Arc<Semaphore>,
  bank: Uuid,
  query: &str,
  budget: Budget,
) -> Result<RecallResult, AppError> {
  if query.is_empty() {
    return Err(anyhow::anyhow!("query must not be empty").into());
  }

  let _permit = permits.acquire_owned().await.map_err(AppError::new)?;

  let embedding = match embed(query).await {
    Ok(e) => e,
    Err(_) => return Ok(empty_result(budget)),
  };

  let time_range = temporal_search::extract_time_range(query, Utc::now());

  let (semantic, keyword, temporal) = tokio::try_join!(
    semantic_search(db, bank, &embedding),
    keyword_search(db, bank, query),
    async {
      match time_range {
        Some(range) => temporal_search::search(db, bank, range, &embedding, budget.max_results()).await,
        None => Ok(Vec::new()),
      }
    }
  )?;

  let graph_seeds: Vec<(Uuid, f64)> =
    semantic.iter().filter(|(_, s)| *s >= GRAPH_SEED_THRESHOLD).take(GRAPH_SEED_COUNT).copied().collect();
  let graph = if graph_seeds.is_empty() {
    Vec::new()
  } else {
    graph_search::search(db, &graph_seeds, false, GRAPH_BUDGET).await?
  };

  let to_ids = |list: &[(Uuid, f64)]| -> Vec<Uuid> { list.iter().map(|(id, _)| *id).collect() };
  let lists = [to_ids(&semantic), to_ids(&keyword), to_ids(&temporal), to_ids(&graph)];
  let fused = reciprocal_rank_fuse(&lists);
  let total_found = fused.len();

  let max_rrf = fused.first().map_or(1.0, |(_, s)| *s).max(f64::EPSILON);
  let top_fused: Vec<(Uuid, f64)> = fused.into_iter().take(RERANK_CANDIDATES).collect();

  let ids: Vec<Uuid> = top_fused.iter().map(|(id, _)| *id).collect();
  let details = fetch_details(db, &ids).await?;

  let documents: Vec<String> = top_fused
    .iter()
    .filter_map(|(id, _)| details.get(id))
    .map(|detail| {
      let date_prefix = detail
        .occurred_start
        .map(|d| format!("[Date: {}] ", d.format("%Y-%m-%d")))
        .unwrap_or_default();
      format!("{date_prefix}{}: {}", detail.context.clone().unwrap_or_default(), detail.text)
    })
    .collect();

  let ce_scores: HashMap<Uuid, f64> = match rerank(query, &documents).await {
    Ok(ranked) => ranked
      .into_iter()
      .filter_map(|r| top_fused.get(r.index).map(|(id, _)| (*id, f64::from(r.relevance_score))))
      .collect(),
    Err(err) => {
      tracing::warn!(error = %err, "rerank failed, falling back to RRF order");
      HashMap::new()
    }
  };

  let mut scored: Vec<Memory> = top_fused
    .into_iter()
    .filter_map(|(id, rrf_score)| {
      let detail = details.get(&id)?;
      let ce = ce_scores.get(&id).copied();
      let final_score = match ce {
        Some(ce) => {
          CE_WEIGHT * ce
            + RRF_WEIGHT * (rrf_score / max_rrf)
            + RECENCY_WEIGHT * recency(detail)
            + TEMPORAL_WEIGHT * temporal_proximity(detail, time_range)
        }
        None => rrf_score / max_rrf,
      };
      Some(Memory {
        id,
        text: detail.text.clone(),
        context: detail.context.clone(),
        fact_type: detail.fact_type,
        fact_kind: detail.fact_kind,
        event_date: detail.event_date,
        score: final_score,
      })
    })
    .collect();

  scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

  let max_tokens = f64::from(budget.max_tokens());
  let mut trimmed = Vec::new();
  let mut used_tokens = 0.0_f64;
  for memory in scored {
    let tokens = (memory.text.len() + memory.context.as_deref().unwrap_or_default().len()) as f64 / CHARS_PER_TOKEN;
    if !trimmed.is_empty() && used_tokens + tokens > max_tokens {
      break;
    }
    used_tokens += tokens;
    trimmed.push(memory);
  }

  let returned = trimmed.len();
  Ok(RecallResult { memories: trimmed, total_found, returned, budget })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_keywords_dropping_short_and_duplicate_tokens() {
    let keywords = extract_keywords("Alice met Al at a cafe, Alice smiled");
    assert!(keywords.contains(&"alice".to_owned()));
    assert!(keywords.contains(&"cafe".to_owned()));
    assert!(!keywords.contains(&"at".to_owned()));
    assert_eq!(keywords.iter().filter(|k| *k == "alice").count(), 1);
  }

  #[test]
  fn budget_low_caps_tokens_and_results() {
    assert_eq!(Budget::Low.max_tokens(), 2048);
    assert_eq!(Budget::Low.max_results(), 20);
  }

  #[test]
  fn budget_parses_from_string() {
    assert_eq!(Budget::parse("high"), Budget::High);
    assert_eq!(Budget::parse("unknown"), Budget::Low);
  }
}
