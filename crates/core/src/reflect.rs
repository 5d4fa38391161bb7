use std::collections::HashSet;

use plastmem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, embed,
  generate_object,
};
use plastmem_entities::bank;
use plastmem_shared::{APP_ENV, AppError};
use schemars::JsonSchema;
use sea_orm::{ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, Statement, prelude::PgVector};
use serde::Deserialize;
use uuid::Uuid;

use crate::mental_model::TagMatch;

const DEFAULT_MAX_ITERATIONS: usize = 10;
const SEARCH_MENTAL_MODELS_THRESHOLD: f64 = 0.1;
const SEARCH_OBSERVATIONS_THRESHOLD: f64 = 0.1;
const RECALL_THRESHOLD: f64 = 0.1;
const EXPAND_MAX_IDS: usize = 10;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct AgentStep {
  /// One of "search_mental_models", "search_observations", "recall", "expand", "done".
  tool: String,
  query: Option<String>,
  max_results: Option<u32>,
  expand_ids: Option<Vec<Uuid>>,
  answer: Option<String>,
  memory_ids: Option<Vec<Uuid>>,
  mental_model_ids: Option<Vec<Uuid>>,
  observation_ids: Option<Vec<Uuid>>,
  directive_compliance: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReflectOutcome {
  pub answer: String,
  pub memory_ids: Vec<Uuid>,
  pub mental_model_ids: Vec<Uuid>,
  pub observation_ids: Vec<Uuid>,
  pub iterations: usize,
  pub tool_calls: Vec<String>,
}

impl ReflectOutcome {
  /// The union of cited world/experience and observation ids: the shape
  /// the Consolidation Worker's "source memories touched" bookkeeping
  /// expects.
  #[must_use]
  pub fn observation_ids(&self) -> Vec<Uuid> {
    let mut ids = self.observation_ids.clone();
    ids.extend(self.memory_ids.iter().copied());
    ids.sort();
    ids.dedup();
    ids
  }
}

fn disposition_guidance(disposition: &[i16]) -> String {
  const AXES: [&str; 3] = ["warmth", "candour", "initiative"];
  let mut lines = Vec::new();
  for (axis, value) in AXES.iter().zip(disposition.iter()) {
    if *value >= 4 {
      lines.push(format!("- Lean strongly toward high {axis}."));
    } else if *value <= 2 {
      lines.push(format!("- Lean strongly toward low {axis}."));
    }
  }
  lines.join("\n")
}

fn build_system_prompt(bank: &bank::Model) -> String {
  let mut prompt = String::new();

  if !bank.directives.is_empty() {
    prompt.push_str("REQUIRED DIRECTIVES (priority order):\n");
    for (i, directive) in bank.directives.iter().enumerate() {
      prompt.push_str(&format!("{}. {directive}\n", i + 1));
    }
    prompt.push('\n');
  }

  let guidance = disposition_guidance(&bank.disposition);
  if !guidance.is_empty() {
    prompt.push_str("Personality guidance:\n");
    prompt.push_str(&guidance);
    prompt.push_str("\n\n");
  }

  prompt.push_str(
    r#"You answer questions by gathering evidence from three memory tiers through tool calls,
then calling "done" with a grounded answer.

At each step, return exactly one JSON object describing the next tool call:
{"tool": "search_mental_models", "query": "...", "max_results": 20}
{"tool": "search_observations", "query": "...", "max_results": 50}
{"tool": "recall", "query": "...", "max_results": 100}
{"tool": "expand", "expand_ids": ["uuid", ...]}
{"tool": "done", "answer": "...", "memory_ids": [...], "mental_model_ids": [...], "observation_ids": [...]}

Only cite ids that were actually returned to you by a previous tool call. Gather at least
some evidence before calling "done" unless you are certain no evidence exists.
"#,
  );

  if !bank.directives.is_empty() {
    prompt.push_str("\nRemember the directives above take priority and set `directive_compliance` in `done`.\n");
  }

  prompt
}

#[derive(FromQueryResult)]
struct ScoredMentalModel {
  id: Uuid,
  name: String,
  content: String,
}

async fn tool_search_mental_models<C: ConnectionTrait>(
  db: &C,
  bank_id: Uuid,
  query_embedding: &PgVector,
  max_results: u64,
) -> Result<Vec<ScoredMentalModel>, AppError> {
  let results = crate::mental_model::search(
    db,
    bank_id,
    query_embedding,
    SEARCH_MENTAL_MODELS_THRESHOLD,
    max_results.min(20),
    &[],
    TagMatch::Any,
    &[],
  )
  .await?;
  Ok(
    results
      .into_iter()
      .map(|(model, _)| ScoredMentalModel { id: model.id, name: model.name, content: model.content })
      .collect(),
  )
}

#[derive(FromQueryResult)]
struct ScoredUnit {
  id: Uuid,
  text: String,
}

async fn cosine_search_units<C: ConnectionTrait>(
  db: &C,
  bank_id: Uuid,
  fact_types: &[&str],
  query_embedding: &PgVector,
  threshold: f64,
  limit: u64,
) -> Result<Vec<ScoredUnit>, AppError> {
  let sql = r"
    SELECT id, text FROM memory_unit
    WHERE bank = $1 AND fact_type = ANY($2::text[]) AND -(embedding <#> $3) >= $4
    ORDER BY -(embedding <#> $3) DESC
    LIMIT $5;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [
      bank_id.into(),
      sea_orm::sea_query::Value::Array(
        sea_orm::sea_query::ArrayType::String,
        Some(Box::new(fact_types.iter().map(|s| (*s).to_owned().into()).collect())),
      ),
      query_embedding.clone().into(),
      threshold.into(),
      limit.into(),
    ],
  );
  Ok(ScoredUnit::find_by_statement(stmt).all(db).await?)
}

#[derive(FromQueryResult)]
struct ExpandedUnit {
  id: Uuid,
  text: String,
  what: Option<String>,
  who: Vec<String>,
  when_desc: Option<String>,
  where_desc: Option<String>,
  why_desc: Option<String>,
}

async fn tool_expand<C: ConnectionTrait>(db: &C, ids: &[Uuid]) -> Result<String, AppError> {
  let take: Vec<Uuid> = ids.iter().take(EXPAND_MAX_IDS).copied().collect();
  if take.is_empty() {
    return Ok(String::new());
  }

  let sql = r"
    SELECT id, text, what, who, when_desc, where_desc, why_desc
    FROM memory_unit WHERE id = ANY($1::uuid[]);
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::Uuid,
      Some(Box::new(take.iter().copied().map(Into::into).collect())),
    )],
  );
  let units = ExpandedUnit::find_by_statement(stmt).all(db).await?;

  let sql = "SELECT id, memory_unit_id, chunk_index, text FROM chunk WHERE memory_unit_id = ANY($1::uuid[]) ORDER BY chunk_index;";
  #[derive(FromQueryResult)]
  struct ChunkRow {
    memory_unit_id: Uuid,
    chunk_index: i32,
    text: String,
  }
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::Uuid,
      Some(Box::new(take.iter().copied().map(Into::into).collect())),
    )],
  );
  let chunks = ChunkRow::find_by_statement(stmt).all(db).await?;

  let mut out = String::new();
  for unit in units {
    out.push_str(&format!(
      "id={} text={} what={:?} who={:?} when={:?} where={:?} why={:?}\n",
      unit.id, unit.text, unit.what, unit.who, unit.when_desc, unit.where_desc, unit.why_desc
    ));
    for chunk in chunks.iter().filter(|c| c.memory_unit_id == unit.id) {
      out.push_str(&format!("  chunk[{}]: {}\n", chunk.chunk_index, chunk.text));
    }
  }
  Ok(out)
}

/// `reflect(bank, query, tags?, tags_match, exclude_mental_model_ids?, max_iterations=10)` (§4.9).
pub async fn reflect<C: ConnectionTrait>(
  db: &C,
  bank_id: Uuid,
  query: &str,
  tags: &[String],
  tags_match: TagMatch,
  exclude_mental_model_ids: &[Uuid],
) -> Result<ReflectOutcome, AppError> {
  reflect_full(db, bank_id, query, tags, tags_match, exclude_mental_model_ids, DEFAULT_MAX_ITERATIONS).await
}

/// `reflect` with no tag filter and a caller-chosen iteration cap, used by
/// Consolidation's mental-model auto-generation (§4.3 step 3).
pub async fn reflect_capped<C: ConnectionTrait>(
  db: &C,
  bank_id: Uuid,
  query: &str,
  max_iterations: usize,
) -> Result<ReflectOutcome, AppError> {
  reflect_full(db, bank_id, query, &[], TagMatch::Any, &[], max_iterations).await
}

#[allow(clippy::too_many_arguments)]
async fn reflect_full<C: ConnectionTrait>(
  db: &C,
  bank_id: Uuid,
  query: &str,
  tags: &[String],
  tags_match: TagMatch,
  exclude_mental_model_ids: &[Uuid],
  max_iterations: usize,
) -> Result<ReflectOutcome, AppError> {
  let bank_model = bank::Entity::find_by_id(bank_id)
    .one(db)
    .await?
    .ok_or_else(|| anyhow::anyhow!("bank {bank_id} not found"))?;

  let system_prompt = build_system_prompt(&bank_model);

  let mut messages = vec![
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(system_prompt)),
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(query.to_owned())),
  ];

  let mut available_memory_ids: HashSet<Uuid> = HashSet::new();
  let mut available_mental_model_ids: HashSet<Uuid> = HashSet::new();
  let mut available_observation_ids: HashSet<Uuid> = HashSet::new();
  let mut tool_calls: Vec<String> = Vec::new();

  for iteration in 0..max_iterations {
    let step: AgentStep = generate_object(
      &APP_ENV.reflector_model,
      messages.clone(),
      "agent_step".to_owned(),
      Some("Next tool call or final answer for the reflect agent loop".to_owned()),
    )
    .await?;

    tool_calls.push(step.tool.clone());

    match step.tool.as_str() {
      "done" => {
        let answer = step.answer.clone().unwrap_or_default();
        let cited_memory: Vec<Uuid> = step
          .memory_ids
          .unwrap_or_default()
          .into_iter()
          .filter(|id| available_memory_ids.contains(id))
          .collect();
        let cited_mental_models: Vec<Uuid> = step
          .mental_model_ids
          .unwrap_or_default()
          .into_iter()
          .filter(|id| available_mental_model_ids.contains(id))
          .collect();
        let cited_observations: Vec<Uuid> = step
          .observation_ids
          .unwrap_or_default()
          .into_iter()
          .filter(|id| available_observation_ids.contains(id))
          .collect();

        let no_evidence_cited = cited_memory.is_empty() && cited_mental_models.is_empty() && cited_observations.is_empty();
        let no_evidence_gathered =
          available_memory_ids.is_empty() && available_mental_model_ids.is_empty() && available_observation_ids.is_empty();
        let is_last_iteration = iteration + 1 == max_iterations;

        if no_evidence_cited && no_evidence_gathered && !is_last_iteration {
          messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
            "No evidence has been gathered yet. Call a search tool before calling done.".to_owned(),
          )));
          continue;
        }

        return Ok(ReflectOutcome {
          answer,
          memory_ids: cited_memory,
          mental_model_ids: cited_mental_models,
          observation_ids: cited_observations,
          iterations: iteration + 1,
          tool_calls,
        });
      }
      "search_mental_models" => {
        let query_text = step.query.clone().unwrap_or_default();
        let embedding = embed(&query_text).await?;
        let limit = u64::from(step.max_results.unwrap_or(20));
        let results = tool_search_mental_models(db, bank_id, &embedding, limit).await.unwrap_or_default();
        let results: Vec<_> = results.into_iter().filter(|r| !exclude_mental_model_ids.contains(&r.id)).collect();
        available_mental_model_ids.extend(results.iter().map(|r| r.id));
        let summary = results
          .iter()
          .map(|r| format!("id={} name={} content={}", r.id, r.name, r.content))
          .collect::<Vec<_>>()
          .join("\n");
        messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(format!(
          "search_mental_models results:\n{summary}"
        ))));
      }
      "search_observations" => {
        let query_text = step.query.clone().unwrap_or_default();
        let embedding = embed(&query_text).await?;
        let limit = u64::from(step.max_results.unwrap_or(50)).min(50);
        let results =
          cosine_search_units(db, bank_id, &["observation"], &embedding, SEARCH_OBSERVATIONS_THRESHOLD, limit)
            .await
            .unwrap_or_default();
        available_observation_ids.extend(results.iter().map(|r| r.id));
        let summary = results.iter().map(|r| format!("id={} text={}", r.id, r.text)).collect::<Vec<_>>().join("\n");
        messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(format!(
          "search_observations results:\n{summary}"
        ))));
      }
      "recall" => {
        let query_text = step.query.clone().unwrap_or_default();
        let embedding = embed(&query_text).await?;
        let limit = u64::from(step.max_results.unwrap_or(100)).min(100);
        let results =
          cosine_search_units(db, bank_id, &["world", "experience"], &embedding, RECALL_THRESHOLD, limit)
            .await
            .unwrap_or_default();
        available_memory_ids.extend(results.iter().map(|r| r.id));
        let summary = results.iter().map(|r| format!("id={} text={}", r.id, r.text)).collect::<Vec<_>>().join("\n");
        messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(format!(
          "recall results:\n{summary}"
        ))));
      }
      "expand" => {
        let ids = step.expand_ids.clone().unwrap_or_default();
        let detail = tool_expand(db, &ids).await.unwrap_or_default();
        messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(format!(
          "expand results:\n{detail}"
        ))));
      }
      other => {
        messages.push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(format!(
          "unknown tool \"{other}\", choose one of: search_mental_models, search_observations, recall, expand, done"
        ))));
      }
    }
  }

  Ok(ReflectOutcome {
    answer: "No answer was reached within the iteration budget.".to_owned(),
    memory_ids: available_memory_ids.into_iter().collect(),
    mental_model_ids: available_mental_model_ids.into_iter().collect(),
    observation_ids: available_observation_ids.into_iter().collect(),
    iterations: max_iterations,
    tool_calls,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disposition_only_flags_extreme_ends() {
    let guidance = disposition_guidance(&[3, 5, 1]);
    assert!(!guidance.contains("warmth"));
    assert!(guidance.contains("candour"));
    assert!(guidance.contains("initiative"));
  }

  #[test]
  fn empty_disposition_produces_no_guidance() {
    assert_eq!(disposition_guidance(&[3, 3, 3]), "");
  }
}
