use std::time::Duration;

use plastmem_core::Engine;
use plastmem_shared::APP_ENV;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Supervised periodic driver for the Consolidation Worker (§4.3). Runs one
/// `trigger_consolidation` sweep per tick; a stop request lets the
/// in-flight sweep finish before the task exits.
pub struct Scheduler {
  handle: JoinHandle<()>,
  stop_tx: watch::Sender<bool>,
}

impl Scheduler {
  /// Spawns the background sweep loop at `APP_ENV.consolidation_interval_seconds`.
  #[must_use]
  pub fn spawn(engine: Engine) -> Self {
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(run(engine, stop_rx));
    Self { handle, stop_tx }
  }

  /// Signals the loop to stop after its current sweep and waits for exit.
  pub async fn stop(self) {
    let _ = self.stop_tx.send(true);
    let _ = self.handle.await;
  }
}

async fn run(engine: Engine, mut stop_rx: watch::Receiver<bool>) {
  let mut ticker = tokio::time::interval(Duration::from_secs(APP_ENV.consolidation_interval_seconds));
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  // The first tick fires immediately; skip it so the process doesn't sweep
  // before the store pool has settled.
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        match plastmem_core::trigger_consolidation(engine.db()).await {
          Ok(result) => tracing::info!(
            banks_processed = result.banks_processed,
            total_processed = result.total_processed,
            "consolidation sweep complete",
          ),
          Err(err) => tracing::error!(error = %err, "consolidation sweep failed"),
        }
      }
      changed = stop_rx.changed() => {
        if changed.is_err() || *stop_rx.borrow() {
          break;
        }
      }
    }
  }
}
