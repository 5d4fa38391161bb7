use std::sync::Arc;

use plastmem_shared::AppError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::Semaphore;

/// Concurrent `retain` calls sharing one engine.
const RETAIN_PERMITS: usize = 5;
/// Concurrent `recall` + `reflect` calls sharing one engine.
const QUERY_PERMITS: usize = 32;

/// Process-wide handle over the store connection pool and the concurrency
/// limits that bound outbound LLM/embedding traffic. The background
/// consolidation scheduler is attached separately via
/// [`plastmem_worker`](../plastmem_worker) once the engine is constructed.
#[derive(Clone)]
pub struct Engine {
  db: DatabaseConnection,
  retain_permits: Arc<Semaphore>,
  query_permits: Arc<Semaphore>,
}

impl Engine {
  /// Connects the store pool (min 2, max 10 connections) and initialises the
  /// engine-level semaphores. Call once per process.
  pub async fn connect(database_url: &str) -> Result<Self, AppError> {
    let mut opts = ConnectOptions::new(database_url.to_owned());
    opts.min_connections(2).max_connections(10);

    let db = Database::connect(opts).await?;

    Ok(Self {
      db,
      retain_permits: Arc::new(Semaphore::new(RETAIN_PERMITS)),
      query_permits: Arc::new(Semaphore::new(QUERY_PERMITS)),
    })
  }

  #[must_use]
  pub const fn db(&self) -> &DatabaseConnection {
    &self.db
  }

  #[must_use]
  pub fn retain_permits(&self) -> Arc<Semaphore> {
    self.retain_permits.clone()
  }

  #[must_use]
  pub fn query_permits(&self) -> Arc<Semaphore> {
    self.query_permits.clone()
  }

  /// Closes the store pool. The background scheduler must be stopped by the
  /// caller first (the engine itself does not own it).
  pub async fn close(self) -> Result<(), AppError> {
    self.db.close().await?;
    Ok(())
  }
}
