//! Background task driving the periodic sweep and the metrics tick.

use super::protection_engine::Engine;
use crate::error_handling::types::EngineError;
use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle on the running janitor task.
///
/// The timers stop when [`Janitor::shutdown`] is awaited or when the handle is dropped.
pub struct Janitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Spawns the janitor on the current tokio runtime. The first sweep and the first sample
    /// happen one period after the call. Both periods must be non-zero.
    pub fn spawn(
        engine: Arc<Engine>,
        sweep_period: Duration,
        metrics_period: Duration,
    ) -> Result<Self, EngineError> {
        if sweep_period.is_zero() {
            return Err(EngineError::ZeroPeriod("sweep"));
        }
        if metrics_period.is_zero() {
            return Err(EngineError::ZeroPeriod("metrics"));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut sweep = interval_at(start + sweep_period, sweep_period);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut metrics = interval_at(start + metrics_period, metrics_period);
            metrics.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "Janitor started (sweep every {:?}, metrics every {:?})",
                sweep_period, metrics_period
            );

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = sweep.tick() => {
                        let report = engine.sweep();
                        trace!("Sweep pass done: {:?}", report);
                    }
                    _ = metrics.tick() => {
                        let snapshot = engine.sample_metrics();
                        engine.on_metrics_tick(snapshot);
                    }
                }
            }

            debug!("Janitor stopped");
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// Stops both timers and waits for the task to finish.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            self.handle.abort();
        }
    }
}
