use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::error::{DispatchError, DispatchResult};

/// A background dispatch that ended in an error.
#[derive(Debug)]
pub struct DispatchFailure {
    /// What was being processed, usually a correlation key.
    pub label: String,
    pub error: DispatchError,
    pub at: DateTime<Utc>,
}

/// Bounded pool for dispatch work.
///
/// At most `concurrency` tasks hold a permit at a time. Errors never reach the
/// submitter: they are logged and published on the failure channel.
#[derive(Clone)]
pub struct DispatchPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    failures: mpsc::UnboundedSender<DispatchFailure>,
}

impl DispatchPool {
    pub fn new(concurrency: usize) -> (Self, mpsc::UnboundedReceiver<DispatchFailure>) {
        let (failures, receiver) = mpsc::unbounded_channel();

        let pool = Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
            failures,
        };

        (pool, receiver)
    }

    /// Spawns `task` and returns immediately.
    pub fn submit<F>(&self, label: String, task: F)
    where
        F: Future<Output = DispatchResult<()>> + Send + 'static,
    {
        let pool = self.clone();

        self.tracker.spawn(async move {
            let _permit = pool.permits.acquire().await.ok();

            if let Err(error) = task.await {
                pool.report(label, error);
            }
        });
    }

    /// Runs `task` inline once a permit is free.
    pub async fn run<F>(&self, task: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self.permits.acquire().await.ok();
        task.await
    }

    pub fn report(&self, label: String, error: DispatchError) {
        match &error {
            DispatchError::Configuration(msg) => {
                warn!(label = %label, error = %msg, "Dispatch stopped on configuration error");
            }
            DispatchError::Persistence(msg) => {
                error!(label = %label, error = %msg, "Delivery record could not be persisted");
            }
        }

        let failure = DispatchFailure {
            label,
            error,
            at: Utc::now(),
        };

        if self.failures.send(failure).is_err() {
            debug!("Failure channel closed, failure only logged");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every task submitted so far, then keeps accepting new ones.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Waits for in-flight tasks; later submissions are still tracked but not awaited.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
