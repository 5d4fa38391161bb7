use axum::Json;
use axum::extract::State;
use plastmem_core::TagMatch;
use plastmem_shared::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReflectRequest {
  pub bank_id: Uuid,
  pub query: String,
  #[serde(default)]
  pub tags: Vec<String>,
  /// One of "any", "all", "any_strict", "all_strict". Defaults to "any".
  #[serde(default)]
  pub tags_match: Option<String>,
  #[serde(default)]
  pub exclude_mental_model_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReflectResponse {
  pub answer: String,
  pub memory_ids: Vec<Uuid>,
  pub mental_model_ids: Vec<Uuid>,
  pub observation_ids: Vec<Uuid>,
  pub iterations: usize,
  pub tool_calls: Vec<String>,
  pub elapsed_ms: u128,
}

/// Answer a question by agentically gathering evidence across mental models, observations, and memories.
#[utoipa::path(
  post,
  path = "/api/v0/reflect",
  request_body = ReflectRequest,
  responses(
    (status = 200, description = "Grounded answer with evidence citations", body = ReflectResponse),
    (status = 400, description = "Invalid request"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state), fields(bank_id = %payload.bank_id))]
pub async fn reflect(
  State(state): State<AppState>,
  Json(payload): Json<ReflectRequest>,
) -> Result<Json<ReflectResponse>, AppError> {
  let tags_match = TagMatch::parse(payload.tags_match.as_deref().unwrap_or("any"));
  let started = std::time::Instant::now();

  let outcome = plastmem_core::reflect(
    state.engine.db(),
    payload.bank_id,
    &payload.query,
    &payload.tags,
    tags_match,
    &payload.exclude_mental_model_ids,
  )
  .await?;

  Ok(Json(ReflectResponse {
    answer: outcome.answer,
    memory_ids: outcome.memory_ids,
    mental_model_ids: outcome.mental_model_ids,
    observation_ids: outcome.observation_ids,
    iterations: outcome.iterations,
    tool_calls: outcome.tool_calls,
    elapsed_ms: started.elapsed().as_millis(),
  }))
}
