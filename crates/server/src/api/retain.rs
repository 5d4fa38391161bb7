use axum::Json;
use axum::extract::State;
use plastmem_shared::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetainRequest {
  pub bank_id: Uuid,
  /// Conversation content to extract facts from (<=10000 chars).
  pub content: String,
  /// Optional free-text context (<=2000 chars).
  pub context: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetainResponse {
  pub stored: usize,
  pub duplicates: usize,
  pub fact_ids: Vec<Uuid>,
}

/// Extract and store durable facts from conversation content.
#[utoipa::path(
  post,
  path = "/api/v0/retain",
  request_body = RetainRequest,
  responses(
    (status = 200, description = "Facts extracted and stored", body = RetainResponse),
    (status = 400, description = "Invalid request"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state), fields(bank_id = %payload.bank_id))]
pub async fn retain(
  State(state): State<AppState>,
  Json(payload): Json<RetainRequest>,
) -> Result<Json<RetainResponse>, AppError> {
  let result = plastmem_core::retain(
    state.engine.db(),
    state.engine.retain_permits(),
    payload.bank_id,
    &payload.content,
    payload.context.as_deref(),
  )
  .await?;

  Ok(Json(RetainResponse { stored: result.stored, duplicates: result.duplicates, fact_ids: result.fact_ids }))
}
