//! Best-effort usage audit queue.
//!
//! Audit writes are observability, not money movement: they must never fail a
//! charge or roll one back. Records are handed to a background worker over a
//! channel; the worker retries transient store failures with bounded
//! exponential backoff and drops the record (with a warning) when retries are
//! exhausted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chatledger_core::ApiUsageRecord;
use chatledger_store::LedgerStore;

/// Queue of pending audit writes with a background worker.
pub struct AuditQueue {
    sender: mpsc::UnboundedSender<ApiUsageRecord>,
    worker: JoinHandle<()>,
}

impl AuditQueue {
    /// Spawn the worker against the given store.
    #[must_use]
    pub fn spawn(store: Arc<dyn LedgerStore>, max_attempts: u32, backoff_ms: u64) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ApiUsageRecord>();

        let worker = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                write_with_retry(store.as_ref(), &record, max_attempts, backoff_ms).await;
            }
        });

        Self { sender, worker }
    }

    /// Enqueue a usage record. Never blocks and never fails the caller; if
    /// the worker is gone the record is dropped with a warning.
    pub fn submit(&self, record: ApiUsageRecord) {
        if let Err(err) = self.sender.send(record) {
            tracing::warn!(
                user_id = %err.0.user_id,
                transaction_id = %err.0.transaction_id,
                "audit worker gone, dropping usage record"
            );
        }
    }

    /// Drain pending records and stop the worker.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(err) = self.worker.await {
            tracing::warn!(error = %err, "audit worker terminated abnormally");
        }
    }
}

async fn write_with_retry(
    store: &dyn LedgerStore,
    record: &ApiUsageRecord,
    max_attempts: u32,
    backoff_ms: u64,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.record_api_usage(record).await {
            Ok(()) => return,
            Err(err) if attempt < max_attempts => {
                let delay = backoff_ms << (attempt - 1);
                tracing::warn!(
                    user_id = %record.user_id,
                    transaction_id = %record.transaction_id,
                    attempt = %attempt,
                    retry_in_ms = %delay,
                    error = %err,
                    "audit write failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    transaction_id = %record.transaction_id,
                    attempts = %attempt,
                    error = %err,
                    "audit write failed, dropping record"
                );
                return;
            }
        }
    }
}
