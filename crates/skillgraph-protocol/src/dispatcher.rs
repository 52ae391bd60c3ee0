//! Out-of-band delivery of outbound protocol calls.
//!
//! Jobs go through a bounded queue to a single worker, in submission order.
//! Each job's outcome is appended to the transaction log and handed back on a
//! oneshot channel. Nothing is retried.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use skillgraph_core::{Action, Role, TransactionLog, TransactionStatus};
use skillgraph_store::Store;

use crate::error::{ProtocolError, Result};
use crate::transport::Transport;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// One outbound call.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub url: String,
    pub payload: Value,
    pub transaction_id: String,
    pub message_id: String,
    pub action: Action,
}

/// What happened to a dispatched call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The remote answered with a 2xx.
    Delivered { status: u16, body: Value },
    /// Connection failure or non-2xx answer.
    Failed { error: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Handle for a submitted job's outcome.
///
/// Dropping the ticket does not cancel the job.
#[derive(Debug)]
pub struct DispatchTicket {
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchTicket {
    /// Wait for the outcome.
    pub async fn outcome(self) -> Result<DispatchOutcome> {
        self.rx.await.map_err(|_| ProtocolError::DispatcherClosed)
    }
}

struct Queued {
    job: DispatchJob,
    reply: oneshot::Sender<DispatchOutcome>,
}

/// Sender side of the dispatch queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Queued>,
}

impl Dispatcher {
    /// Start the worker.
    ///
    /// The worker exits once every `Dispatcher` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, transport, store));
        (Self { tx }, handle)
    }

    /// Queue a job. Waits for room when the queue is full.
    pub async fn submit(&self, job: DispatchJob) -> Result<DispatchTicket> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Queued { job, reply })
            .await
            .map_err(|_| ProtocolError::DispatcherClosed)?;
        Ok(DispatchTicket { rx })
    }

    /// Queue a job without waiting. Fails with [`ProtocolError::QueueFull`]
    /// when no slot is free.
    pub fn try_submit(&self, job: DispatchJob) -> Result<DispatchTicket> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(Queued { job, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ProtocolError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ProtocolError::DispatcherClosed,
            })?;
        Ok(DispatchTicket { rx })
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Queued>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
) {
    while let Some(Queued { job, reply }) = rx.recv().await {
        let outcome = deliver(transport.as_ref(), &job).await;
        record(store.as_ref(), &job, &outcome).await;
        // Receiver may be gone; the log row is the durable record.
        let _ = reply.send(outcome);
    }
    tracing::debug!("dispatch worker stopped");
}

async fn deliver(transport: &dyn Transport, job: &DispatchJob) -> DispatchOutcome {
    match transport.post(&job.url, &job.payload).await {
        Ok(response) if response.is_success() => {
            tracing::debug!(
                transaction_id = %job.transaction_id,
                action = %job.action,
                status = response.status,
                "dispatched"
            );
            DispatchOutcome::Delivered {
                status: response.status,
                body: response.body,
            }
        }
        Ok(response) => {
            tracing::warn!(
                transaction_id = %job.transaction_id,
                action = %job.action,
                status = response.status,
                "remote refused dispatch"
            );
            DispatchOutcome::Failed {
                error: format!("HTTP {}", response.status),
            }
        }
        Err(e) => {
            tracing::warn!(
                transaction_id = %job.transaction_id,
                action = %job.action,
                error = %e,
                "dispatch failed"
            );
            DispatchOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

async fn record(store: &dyn Store, job: &DispatchJob, outcome: &DispatchOutcome) {
    let (status, response, error) = match outcome {
        DispatchOutcome::Delivered { body, .. } => (TransactionStatus::Ack, Some(body.clone()), None),
        DispatchOutcome::Failed { error } => (TransactionStatus::Failed, None, Some(error.clone())),
    };

    let log = TransactionLog {
        transaction_id: job.transaction_id.clone(),
        message_id: job.message_id.clone(),
        action: job.action,
        role: Role::Bap,
        request: job.payload.clone(),
        response,
        status,
        error,
        timestamp: Utc::now(),
    };

    if let Err(e) = store.append_transaction_log(&log).await {
        tracing::error!(transaction_id = %job.transaction_id, error = %e, "failed to log dispatch outcome");
    }
}
