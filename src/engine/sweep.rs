use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    engine::orchestrator::{DispatchOutcome, Dispatcher},
    error::DispatchError,
};

/// Tally of one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub picked: usize,
    pub sent: usize,
    pub rescheduled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Periodically re-sends pending records whose retry time has come.
pub struct RetrySweep {
    dispatcher: Dispatcher,
}

impl RetrySweep {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn run_once(&self) -> Result<SweepReport, DispatchError> {
        let dispatcher = &self.dispatcher;
        let now = dispatcher.now();

        let due = dispatcher
            .store()
            .due_for_retry(now, dispatcher.config().sweep_batch_size)
            .await
            .map_err(DispatchError::persistence)?;

        let mut report = SweepReport {
            picked: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(report);
        }

        debug!(count = due.len(), "Retrying due delivery attempts");

        let pool = dispatcher.pool();
        let results = join_all(due.into_iter().map(|record| {
            let label = record.correlation_key.clone();
            async move { (label, pool.run(dispatcher.retry_attempt(record)).await) }
        }))
        .await;

        for (label, result) in results {
            match result {
                Ok(DispatchOutcome::Sent { .. }) => report.sent += 1,
                Ok(DispatchOutcome::RetryScheduled { .. } | DispatchOutcome::Deferred { .. }) => {
                    report.rescheduled += 1
                }
                Ok(DispatchOutcome::Failed { .. }) => report.failed += 1,
                Ok(_) => report.skipped += 1,
                Err(error) => {
                    report.errors += 1;
                    pool.report(label, error);
                }
            }
        }

        info!(
            picked = report.picked,
            sent = report.sent,
            rescheduled = report.rescheduled,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "Retry sweep finished"
        );

        Ok(report)
    }

    /// Sweeps every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retry sweep stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        self.dispatcher.pool().report("retry-sweep".to_string(), error);
                    }
                }
            }
        }
    }
}
