//! Run queue: serializes triggered runs onto one background worker.
//!
//! Triggers are accepted immediately and executed in arrival order. Only
//! one run is ever in flight, so two triggers never fetch the same unseen
//! emails concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::processor::InboxProcessor;

/// A request to execute one run.
#[derive(Debug, Clone, Copy)]
pub struct RunTrigger {
    pub requested_at: DateTime<Utc>,
}

/// Why a trigger was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Run queue is full")]
    Full,

    #[error("Run worker has stopped")]
    Closed,
}

/// Cloneable handle for submitting run triggers.
#[derive(Debug, Clone)]
pub struct RunQueue {
    tx: mpsc::Sender<RunTrigger>,
}

impl RunQueue {
    /// Enqueue a run without waiting for capacity.
    pub fn try_enqueue(&self) -> Result<RunTrigger, EnqueueError> {
        let trigger = RunTrigger {
            requested_at: Utc::now(),
        };
        self.tx.try_send(trigger).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })?;
        debug!(requested_at = %trigger.requested_at, "Run enqueued");
        Ok(trigger)
    }
}

/// Spawn the worker that drains the queue one run at a time.
///
/// Cancelling the token stops the worker and aborts the in-flight run at its
/// next stage boundary.
pub fn spawn_run_worker(
    processor: Arc<InboxProcessor>,
    capacity: usize,
    cancel: CancellationToken,
) -> (RunQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<RunTrigger>(capacity.max(1));

    let handle = tokio::spawn(async move {
        info!(capacity, "Run worker started");

        loop {
            let trigger = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                trigger = rx.recv() => match trigger {
                    Some(t) => t,
                    None => break,
                },
            };

            let waited = Utc::now() - trigger.requested_at;
            debug!(waited_ms = waited.num_milliseconds(), "Starting queued run");

            match processor.process(&cancel).await {
                Ok(report) => info!(
                    run_id = %report.run_id,
                    delivered = report.delivered(),
                    failed = report.failed(),
                    "Queued run finished"
                ),
                Err(e) => error!(error = %e, "Queued run failed"),
            }
        }

        info!("Run worker shutting down");
    });

    (RunQueue { tx }, handle)
}
