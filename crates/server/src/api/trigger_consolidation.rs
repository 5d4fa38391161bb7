use axum::Json;
use axum::extract::State;
use plastmem_shared::AppError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct BankConsolidationStats {
  pub bank_id: Uuid,
  pub processed: usize,
  pub created: usize,
  pub updated: usize,
  pub skipped: usize,
  pub mental_models_refreshed: usize,
  pub mental_models_created: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerConsolidationResponse {
  pub banks_processed: usize,
  pub total_processed: usize,
  pub results: Vec<BankConsolidationStats>,
  pub elapsed_ms: u128,
}

/// Run one consolidation sweep across every bank, promoting retained facts into observations
/// and refreshing or auto-generating mental models.
#[utoipa::path(
  post,
  path = "/api/v0/trigger_consolidation",
  responses(
    (status = 200, description = "Consolidation sweep complete", body = TriggerConsolidationResponse),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state))]
pub async fn trigger_consolidation(State(state): State<AppState>) -> Result<Json<TriggerConsolidationResponse>, AppError> {
  let started = std::time::Instant::now();
  let result = plastmem_core::trigger_consolidation(state.engine.db()).await?;

  let results = result
    .results
    .into_iter()
    .map(|(bank_id, stats)| BankConsolidationStats {
      bank_id,
      processed: stats.processed,
      created: stats.created,
      updated: stats.updated,
      skipped: stats.skipped,
      mental_models_refreshed: stats.mental_models_refreshed,
      mental_models_created: stats.mental_models_created,
    })
    .collect();

  Ok(Json(TriggerConsolidationResponse {
    banks_processed: result.banks_processed,
    total_processed: result.total_processed,
    results,
    elapsed_ms: started.elapsed().as_millis(),
  }))
}
