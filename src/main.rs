use plastmem_core::Engine;
use plastmem_migration::{Migrator, MigratorTrait};
use plastmem_shared::{APP_ENV, AppError};
use plastmem_worker::Scheduler;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let engine = Engine::connect(&APP_ENV.database_url).await?;
  Migrator::up(engine.db(), None).await?;

  let scheduler = Scheduler::spawn(engine.clone());

  let result = plastmem_server::server(engine.clone()).await;

  scheduler.stop().await;
  engine.close().await?;

  result
}
