use chrono::Utc;
use plastmem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, embed,
  generate_object,
};
use plastmem_entities::{bank, memory_unit};
use plastmem_shared::{APP_ENV, AppError};
use schemars::JsonSchema;
use sea_orm::{
  ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, QueryFilter,
  QueryOrder, Statement, TransactionTrait,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::freshness;
use crate::mental_model;

const BATCH_SIZE: u64 = 10;
const RELATED_OBSERVATION_THRESHOLD: f64 = 0.3;
const RELATED_OBSERVATION_LIMIT: i64 = 10;
const SOURCE_MEMORIES_PER_OBSERVATION: i64 = 5;
const MAX_MENTAL_MODEL_REFRESH_PER_ITERATION: u64 = 3;
const MAX_MENTAL_MODEL_AUTOGEN_PER_ITERATION: u64 = 2;
const MIN_OBSERVATIONS_FOR_AUTOGEN: i64 = 5;
const AUTOGEN_MIN_ANSWER_LEN: usize = 50;
const AUTOGEN_MAX_REFLECT_ITERATIONS: usize = 5;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct Adjudication {
  /// One of "create", "update", "none".
  action: String,
  learning_id: Option<Uuid>,
  text: Option<String>,
  reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct AdjudicationResponse {
  actions: Vec<Adjudication>,
}

const SYSTEM_PROMPT: &str = r"You adjudicate whether a newly retained fact contributes durable knowledge to an \
existing set of observations about a conversational agent's memory.

Rules:
- Extract only durable knowledge (stable facts, traits, preferences), never ephemeral state.
- Never merge facts about different people into one observation.
- For each durable insight, emit either:
  - {\"action\": \"create\", \"text\": \"the new observation text\"}
  - {\"action\": \"update\", \"learning_id\": \"<uuid of the observation to update>\", \"text\": \"the revised observation text\", \"reason\": \"why it changed\"}
- If the fact carries no durable knowledge, return {\"actions\": []}.
Return only the JSON object {\"actions\": [...]}.";

#[derive(Debug, Clone, Default)]
pub struct ConsolidationStats {
  pub processed: usize,
  pub created: usize,
  pub updated: usize,
  pub skipped: usize,
  pub mental_models_refreshed: usize,
  pub mental_models_created: usize,
}

async fn fetch_unconsolidated_batch<C: ConnectionTrait>(db: &C, bank: Uuid) -> Result<Vec<memory_unit::Model>, AppError> {
  Ok(
    memory_unit::Entity::find()
      .filter(memory_unit::Column::Bank.eq(bank))
      .filter(memory_unit::Column::ConsolidatedAt.is_null())
      .filter(
        memory_unit::Column::FactType
          .eq(plastmem_entities::FactType::World)
          .or(memory_unit::Column::FactType.eq(plastmem_entities::FactType::Experience)),
      )
      .order_by_asc(memory_unit::Column::CreatedAt)
      .limit(BATCH_SIZE)
      .all(db)
      .await?,
  )
}

async fn find_related_observations<C: ConnectionTrait>(
  db: &C,
  bank: Uuid,
  fact: &memory_unit::Model,
) -> Result<Vec<memory_unit::Model>, AppError> {
  let sql = r"
    SELECT * FROM memory_unit
    WHERE bank = $1 AND fact_type = 'observation' AND id != $2 AND -(embedding <#> $3) >= $4
    ORDER BY -(embedding <#> $3) DESC
    LIMIT $5;
  ";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [
      bank.into(),
      fact.id.into(),
      fact.embedding.clone().into(),
      RELATED_OBSERVATION_THRESHOLD.into(),
      RELATED_OBSERVATION_LIMIT.into(),
    ],
  );
  Ok(memory_unit::Model::find_by_statement(stmt).all(db).await?)
}

#[derive(FromQueryResult)]
struct SourceMemory {
  text: String,
  event_date: Option<chrono::DateTime<Utc>>,
}

async fn load_source_summaries<C: ConnectionTrait>(db: &C, ids: &[Uuid]) -> Result<Vec<SourceMemory>, AppError> {
  if ids.is_empty() {
    return Ok(Vec::new());
  }
  let take: Vec<Uuid> = ids.iter().take(SOURCE_MEMORIES_PER_OBSERVATION as usize).copied().collect();
  let sql = "SELECT text, event_date FROM memory_unit WHERE id = ANY($1::uuid[]);";
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    sql,
    [sea_orm::sea_query::Value::Array(
      sea_orm::sea_query::ArrayType::Uuid,
      Some(Box::new(take.into_iter().map(Into::into).collect())),
    )],
  );
  Ok(SourceMemory::find_by_statement(stmt).all(db).await?)
}

async fn adjudicate(
  fact: &memory_unit::Model,
  related: &[memory_unit::Model],
  related_sources: &HashMapSources,
  mission: Option<&str>,
) -> Result<AdjudicationResponse, AppError> {
  let mut user_message = format!("New fact: {}\n\n", fact.text);
  if let Some(mission) = mission {
    user_message.push_str(&format!("Agent mission: {mission}\n\n"));
  }
  user_message.push_str("Existing observations:\n");
  for obs in related {
    user_message.push_str(&format!("- id={} text={}\n", obs.id, obs.text));
    if let Some(sources) = related_sources.get(&obs.id) {
      for source in sources {
        let date = source.event_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        user_message.push_str(&format!("    source ({date}): {}\n", source.text));
      }
    }
  }

  let messages = vec![
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT)),
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user_message)),
  ];

  generate_object::<AdjudicationResponse>(
    &APP_ENV.consolidator_model,
    messages,
    "adjudication".to_owned(),
    Some("Durable-knowledge adjudication over one retained fact".to_owned()),
  )
  .await
}

type HashMapSources = std::collections::HashMap<Uuid, Vec<SourceMemory>>;

async fn copy_unit_entity_links<C: ConnectionTrait>(db: &C, from_unit: Uuid, to_unit: Uuid) -> Result<(), AppError> {
  let sql = r"
    INSERT INTO unit_entity (unit_id, entity_id)
    SELECT $2, entity_id FROM unit_entity WHERE unit_id = $1
    ON CONFLICT (unit_id, entity_id) DO NOTHING;
  ";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [from_unit.into(), to_unit.into()]);
  db.execute(stmt).await?;
  Ok(())
}

async fn execute_create<C: ConnectionTrait>(
  db: &C,
  fact: &memory_unit::Model,
  text: String,
) -> Result<Uuid, AppError> {
  let id = Uuid::now_v7();
  let now = Utc::now();
  let model = memory_unit::ActiveModel {
    id: Set(id),
    bank: Set(fact.bank),
    text: Set(text),
    context: Set(fact.context.clone()),
    fact_type: Set(plastmem_entities::FactType::Observation),
    fact_kind: Set(fact.fact_kind),
    what: Set(fact.what.clone()),
    who: Set(fact.who.clone()),
    when_desc: Set(fact.when_desc.clone()),
    where_desc: Set(fact.where_desc.clone()),
    why_desc: Set(fact.why_desc.clone()),
    event_date: Set(fact.event_date),
    occurred_start: Set(fact.occurred_start),
    occurred_end: Set(fact.occurred_end),
    mentioned_at: Set(now.into()),
    created_at: Set(now.into()),
    embedding: Set(fact.embedding.clone()),
    tags: Set(Vec::new()),
    consolidated_at: Set(None),
    proof_count: Set(1),
    source_memory_ids: Set(vec![fact.id]),
    history: Set(serde_json::Value::Array(Vec::new())),
    freshness_status: Set(None),
  };
  memory_unit::Entity::insert(model).exec(db).await?;
  copy_unit_entity_links(db, fact.id, id).await?;
  Ok(id)
}

async fn execute_update<C: ConnectionTrait>(
  db: &C,
  observation: &memory_unit::Model,
  fact: &memory_unit::Model,
  new_text: String,
  reason: String,
) -> Result<(), AppError> {
  let mut source_memory_ids = observation.source_memory_ids.clone();
  if !source_memory_ids.contains(&fact.id) {
    source_memory_ids.push(fact.id);
  }

  let mut history = observation.history.as_array().cloned().unwrap_or_default();
  history.push(serde_json::json!({
    "previous_text": observation.text,
    "changed_at": Utc::now().to_rfc3339(),
    "reason": reason,
    "source_memory_id": fact.id,
  }));

  let new_embedding = embed(&new_text).await?;

  let occurred_start = match (observation.occurred_start, fact.occurred_start.or(fact.event_date)) {
    (Some(a), Some(b)) => Some(a.min(b)),
    (a, b) => a.or(b),
  };
  let occurred_end = match (observation.occurred_end, fact.occurred_end.or(fact.event_date)) {
    (Some(a), Some(b)) => Some(a.max(b)),
    (a, b) => a.or(b),
  };
  let mentioned_at = observation.mentioned_at.max(fact.mentioned_at);

  let model = memory_unit::ActiveModel {
    id: Set(observation.id),
    text: Set(new_text),
    embedding: Set(new_embedding),
    source_memory_ids: Set(source_memory_ids.clone()),
    proof_count: Set(source_memory_ids.len() as i32),
    history: Set(serde_json::Value::Array(history)),
    occurred_start: Set(occurred_start),
    occurred_end: Set(occurred_end),
    mentioned_at: Set(mentioned_at),
    ..Default::default()
  };
  sea_orm::ActiveModelTrait::update(model, db).await?;
  copy_unit_entity_links(db, fact.id, observation.id).await?;
  Ok(())
}

async fn mark_consolidated<C: ConnectionTrait>(db: &C, fact_id: Uuid) -> Result<(), AppError> {
  let model = memory_unit::ActiveModel {
    id: Set(fact_id),
    consolidated_at: Set(Some(Utc::now().into())),
    ..Default::default()
  };
  sea_orm::ActiveModelTrait::update(model, db).await?;
  Ok(())
}

async fn process_fact<C: ConnectionTrait + TransactionTrait>(
  db: &C,
  fact: memory_unit::Model,
  mission: Option<&str>,
  stats: &mut ConsolidationStats,
  touched_entities: &mut Vec<Uuid>,
) -> Result<(), AppError> {
  let related = find_related_observations(db, fact.bank, &fact).await?;

  let mut related_sources: HashMapSources = std::collections::HashMap::new();
  for obs in &related {
    related_sources.insert(obs.id, load_source_summaries(db, &obs.source_memory_ids).await?);
  }

  let adjudication = adjudicate(&fact, &related, &related_sources, mission).await?;

  let txn = db.begin().await?;
  for action in adjudication.actions {
    match action.action.as_str() {
      "create" => {
        if let Some(text) = action.text {
          execute_create(&txn, &fact, text).await?;
          stats.created += 1;
        }
      }
      "update" => {
        if let (Some(learning_id), Some(text)) = (action.learning_id, action.text) {
          if let Some(observation) = related.iter().find(|o| o.id == learning_id) {
            execute_update(&txn, observation, &fact, text, action.reason.unwrap_or_default()).await?;
            stats.updated += 1;
          }
        }
      }
      _ => stats.skipped += 1,
    }
  }
  mark_consolidated(&txn, fact.id).await?;
  txn.commit().await?;

  let sql = "SELECT entity_id FROM unit_entity WHERE unit_id = $1;";
  let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [fact.id.into()]);
  #[derive(FromQueryResult)]
  struct EntityIdRow {
    entity_id: Uuid,
  }
  let rows = EntityIdRow::find_by_statement(stmt).all(db).await?;
  touched_entities.extend(rows.into_iter().map(|r| r.entity_id));

  stats.processed += 1;
  Ok(())
}

/// One consolidation iteration for a single bank (§4.3). Facts whose
/// processing throws are left with `consolidated_at = NULL` for retry.
pub async fn run_iteration<C: ConnectionTrait + TransactionTrait>(db: &C, bank: Uuid) -> Result<ConsolidationStats, AppError> {
  let facts = fetch_unconsolidated_batch(db, bank).await?;
  if facts.is_empty() {
    return Ok(ConsolidationStats::default());
  }

  let mission = bank::Entity::find_by_id(bank).one(db).await?.and_then(|b| b.mission);

  let mut stats = ConsolidationStats::default();
  let mut touched_entities: Vec<Uuid> = Vec::new();

  for fact in facts {
    if let Err(err) = process_fact(db, fact, mission.as_deref(), &mut stats, &mut touched_entities).await {
      tracing::warn!(error = %err, bank = %bank, "consolidation fact processing failed, will retry next cycle");
    }
  }

  if stats.processed > 0 {
    freshness::refresh_bank(db, bank).await?;

    let refresh_targets = mental_model::refresh_candidates(db, bank, MAX_MENTAL_MODEL_REFRESH_PER_ITERATION).await?;
    for target in refresh_targets {
      if let Some(query) = target.source_query {
        match crate::reflect::reflect(db, bank, &query, &target.tags, crate::mental_model::TagMatch::AllStrict, &[target.id]).await {
          Ok(outcome) => {
            let observation_ids = outcome.observation_ids();
            mental_model::refresh(db, target.id, outcome.answer, observation_ids, embed(&query).await?).await?;
            stats.mental_models_refreshed += 1;
          }
          Err(err) => tracing::warn!(error = %err, mental_model = %target.id, "mental model refresh failed"),
        }
      }
    }

    touched_entities.sort();
    touched_entities.dedup();
    let autogen = mental_model::auto_generate_candidates(
      db,
      bank,
      &touched_entities,
      MIN_OBSERVATIONS_FOR_AUTOGEN,
      MAX_MENTAL_MODEL_AUTOGEN_PER_ITERATION,
    )
    .await?;

    for candidate in autogen {
      let mission_clause = mission
        .as_deref()
        .map(|m| format!(" Include the perspective of the mission \"{m}\".").to_owned())
        .unwrap_or_default();
      let query = format!(
        "Summarise everything remembered about {} across all memory so far.{mission_clause}",
        candidate.canonical_name
      );

      match crate::reflect::reflect_capped(db, bank, &query, AUTOGEN_MAX_REFLECT_ITERATIONS).await {
        Ok(outcome) if outcome.answer.len() >= AUTOGEN_MIN_ANSWER_LEN => {
          let embedding = embed(&query).await?;
          let observation_ids = outcome.observation_ids();
          mental_model::create(
            db,
            bank,
            candidate.canonical_name.clone(),
            outcome.answer,
            embedding,
            Some(query),
            Some(candidate.entity_id),
            observation_ids,
          )
          .await?;
          stats.mental_models_created += 1;
        }
        Ok(_) => tracing::debug!(entity = %candidate.entity_id, "auto-generated answer too short, discarded"),
        Err(err) => tracing::warn!(error = %err, entity = %candidate.entity_id, "mental model auto-generation failed"),
      }
    }
  }

  Ok(stats)
}

#[derive(Debug, Clone, Default)]
pub struct TriggerConsolidationResult {
  pub banks_processed: usize,
  pub total_processed: usize,
  pub results: std::collections::HashMap<Uuid, ConsolidationStats>,
}

#[derive(FromQueryResult)]
struct BankId {
  id: Uuid,
}

/// `trigger_consolidation()` (§6): runs one iteration over every bank.
pub async fn trigger_consolidation<C: ConnectionTrait + TransactionTrait>(db: &C) -> Result<TriggerConsolidationResult, AppError> {
  let banks = BankId::find_by_statement(Statement::from_sql_and_values(
    DbBackend::Postgres,
    "SELECT id FROM bank;",
    [],
  ))
  .all(db)
  .await?;

  let mut result = TriggerConsolidationResult::default();
  for bank in banks {
    match run_iteration(db, bank.id).await {
      Ok(stats) => {
        result.total_processed += stats.processed;
        result.results.insert(bank.id, stats);
      }
      Err(err) => {
        tracing::error!(error = %err, bank = %bank.id, "consolidation failed for bank, continuing");
      }
    }
    result.banks_processed += 1;
  }

  Ok(result)
}
