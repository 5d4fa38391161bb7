use axum::{Router, response::Html, routing::get};
use plastmem_core::Engine;
use plastmem_shared::AppError;
use tokio::net::TcpListener;

use crate::utils::{AppState, shutdown_signal};

#[axum::debug_handler]
async fn handler() -> Html<&'static str> {
  Html("<h1>Plastmem</h1>")
}

pub async fn server(engine: Engine) -> Result<(), AppError> {
  let app_state = AppState::new(engine);
  let app = Router::new().route("/", get(handler)).merge(crate::api::app()).with_state(app_state);

  let listener = TcpListener::bind("0.0.0.0:3000").await?;
  tracing::info!("server started at http://0.0.0.0:3000");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}
