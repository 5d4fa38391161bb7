use axum::Json;
use axum::extract::State;
use plastmem_entities::{FactKind, FactType};
use plastmem_shared::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

const fn fact_type_str(fact_type: FactType) -> &'static str {
  match fact_type {
    FactType::World => "world",
    FactType::Experience => "experience",
    FactType::Observation => "observation",
  }
}

const fn fact_kind_str(fact_kind: FactKind) -> &'static str {
  match fact_kind {
    FactKind::Event => "event",
    FactKind::Conversation => "conversation",
  }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecallRequest {
  pub bank_id: Uuid,
  /// Natural-language query (<=1000 chars).
  pub query: String,
  /// Token budget tier: "low", "mid", or "high". Defaults to "mid".
  #[serde(default)]
  pub budget: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecallMemory {
  pub id: Uuid,
  pub text: String,
  pub context: Option<String>,
  pub fact_type: String,
  pub fact_kind: Option<String>,
  pub event_date: Option<String>,
  pub score: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecallResponse {
  pub memories: Vec<RecallMemory>,
  pub total_found: usize,
  pub returned: usize,
  pub budget: String,
}

/// Retrieve memories relevant to a query, fused across semantic, keyword, temporal, and graph search.
#[utoipa::path(
  post,
  path = "/api/v0/recall",
  request_body = RecallRequest,
  responses(
    (status = 200, description = "Relevant memories", body = RecallResponse),
    (status = 400, description = "Invalid request"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state), fields(bank_id = %payload.bank_id))]
pub async fn recall(
  State(state): State<AppState>,
  Json(payload): Json<RecallRequest>,
) -> Result<Json<RecallResponse>, AppError> {
  let budget = plastmem_core::Budget::parse(payload.budget.as_deref().unwrap_or("mid"));

  let result = plastmem_core::recall(
    state.engine.db(),
    state.engine.query_permits(),
    payload.bank_id,
    &payload.query,
    budget,
  )
  .await?;

  let memories = result
    .memories
    .into_iter()
    .map(|memory| RecallMemory {
      id: memory.id,
      text: memory.text,
      context: memory.context,
      fact_type: fact_type_str(memory.fact_type).to_owned(),
      fact_kind: memory.fact_kind.map(|kind| fact_kind_str(kind).to_owned()),
      event_date: memory.event_date.map(|date| date.to_rfc3339()),
      score: memory.score,
    })
    .collect::<Vec<_>>();

  Ok(Json(RecallResponse {
    returned: memories.len(),
    total_found: result.total_found,
    memories,
    budget: budget.as_str().to_owned(),
  }))
}
