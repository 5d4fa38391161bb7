use axum::{
  Json, Router,
  routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod recall;
mod reflect;
mod retain;
mod trigger_consolidation;

pub use recall::{RecallMemory, RecallRequest, RecallResponse};
pub use reflect::{ReflectRequest, ReflectResponse};
pub use retain::{RetainRequest, RetainResponse};
pub use trigger_consolidation::{BankConsolidationStats, TriggerConsolidationResponse};

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Plastmem API",
    version = "0.1.0",
    description = "Episodic + semantic memory engine for a conversational agent"
  ),
  paths(
    retain::retain,
    recall::recall,
    reflect::reflect,
    trigger_consolidation::trigger_consolidation
  ),
  components(schemas(
    RetainRequest,
    RetainResponse,
    RecallRequest,
    RecallMemory,
    RecallResponse,
    ReflectRequest,
    ReflectResponse,
    BankConsolidationStats,
    TriggerConsolidationResponse,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route("/api/v0/retain", post(retain::retain))
    .route("/api/v0/recall", post(recall::recall))
    .route("/api/v0/reflect", post(reflect::reflect))
    .route("/api/v0/trigger_consolidation", post(trigger_consolidation::trigger_consolidation))
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
