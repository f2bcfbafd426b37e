//! Read worker: reacts to `write-completed` by downloading the object back.
//!
//! The worker has no loop of its own. [`ReadWorker::attach`] registers one
//! handler per event and hands back a [`ReadWorkerHandle`]; all reads happen
//! inside the broker's delivery of `write-completed`, so by the time the
//! writer publishes `write-finished` every read has already been recorded.

use crate::broker::{panic_message, EventBroker, HandlerResult, WRITE_COMPLETED, WRITE_FINISHED};
use crate::error::ProbeError;
use crate::fixtures::FixtureDirs;
use crate::ledger::{OutcomeLedger, OutcomeRecord, ResponseMeta};
use crate::storage::{GetResponse, ObjectStore, StorageError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a single read attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ReadFailure {
    #[error("get failed: {0}")]
    Storage(#[from] StorageError),

    #[error("get returned status {}", .response.status.unwrap_or_default())]
    BadStatus { response: ResponseMeta },

    #[error(
        "content mismatch: expected {expected_len} bytes (crc32 {expected_crc:08x}), \
         got {actual_len} bytes (crc32 {actual_crc:08x})"
    )]
    ContentMismatch {
        response: ResponseMeta,
        expected_len: usize,
        expected_crc: u32,
        actual_len: usize,
        actual_crc: u32,
    },

    #[error("failed to read local payload for comparison: {source}")]
    Fixture {
        response: ResponseMeta,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist download: {source}")]
    Persist {
        response: ResponseMeta,
        #[source]
        source: std::io::Error,
    },

    #[error("read panicked: {0}")]
    Panicked(String),
}

impl ReadFailure {
    /// Response metadata captured before the failure, if the store answered.
    pub fn response(&self) -> Option<&ResponseMeta> {
        match self {
            ReadFailure::Storage(_) | ReadFailure::Panicked(_) => None,
            ReadFailure::BadStatus { response }
            | ReadFailure::ContentMismatch { response, .. }
            | ReadFailure::Fixture { response, .. }
            | ReadFailure::Persist { response, .. } => Some(response),
        }
    }
}

pub struct ReadWorker {
    store: Arc<dyn ObjectStore>,
    ledger: Arc<OutcomeLedger>,
    fixtures: Arc<FixtureDirs>,
    bucket: String,
    verify_content: bool,
}

impl ReadWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: Arc<OutcomeLedger>,
        fixtures: Arc<FixtureDirs>,
        bucket: String,
    ) -> Self {
        ReadWorker {
            store,
            ledger,
            fixtures,
            bucket,
            verify_content: true,
        }
    }

    /// Compare downloaded bytes against the local payload (on by default).
    pub fn verify_content(mut self, enabled: bool) -> Self {
        self.verify_content = enabled;
        self
    }

    /// Subscribe to `write-completed` and `write-finished`.
    ///
    /// Both subscriptions are in place when this returns, so the caller can
    /// signal readiness right after.
    pub fn attach(self, broker: &EventBroker) -> ReadWorkerHandle {
        let worker = Arc::new(self);
        let (finished_tx, finished_rx) = watch::channel(false);

        let on_completed = worker.clone();
        broker.subscribe(WRITE_COMPLETED, move |id| {
            let worker = on_completed.clone();
            async move {
                // A panic inside the read must still leave a record behind
                let outcome = AssertUnwindSafe(worker.handle_write_completed(id))
                    .catch_unwind()
                    .await;
                if let Err(panic) = outcome {
                    let failure =
                        ReadFailure::Panicked(panic_message(panic.as_ref()).to_string());
                    warn!(id, error = %failure, "read failed");
                    worker
                        .ledger
                        .record_read_failure(OutcomeRecord::failure(id, None, &failure));
                }
                HandlerResult::Ok(())
            }
        });

        broker.subscribe(WRITE_FINISHED, move |_| {
            finished_tx.send_replace(true);
            async { HandlerResult::Ok(()) }
        });

        debug!(bucket = %worker.bucket, "read worker attached");
        ReadWorkerHandle {
            finished: finished_rx,
        }
    }

    /// Read `id` back and record the outcome exactly once.
    pub async fn handle_write_completed(&self, id: u64) {
        match self.read_back(id).await {
            Ok(response) => {
                self.ledger.record_read_success();
                debug!(id, size = response.meta.size_bytes, "read completed");
            }
            Err(failure) => {
                warn!(id, error = %failure, "read failed");
                self.ledger.record_read_failure(OutcomeRecord::failure(
                    id,
                    failure.response().cloned(),
                    &failure,
                ));
            }
        }
    }

    async fn read_back(&self, id: u64) -> Result<GetResponse, ReadFailure> {
        let response = self.store.get(&self.bucket, &id.to_string()).await?;
        if !response.is_success() {
            return Err(ReadFailure::BadStatus {
                response: ResponseMeta::from(&response),
            });
        }

        if self.verify_content {
            let expected =
                self.fixtures
                    .read_input(id)
                    .await
                    .map_err(|source| ReadFailure::Fixture {
                        response: ResponseMeta::from(&response),
                        source,
                    })?;
            if expected.as_slice() != response.body.as_ref() {
                return Err(ReadFailure::ContentMismatch {
                    response: ResponseMeta::from(&response),
                    expected_len: expected.len(),
                    expected_crc: crc32fast::hash(&expected),
                    actual_len: response.body.len(),
                    actual_crc: crc32fast::hash(&response.body),
                });
            }
        }

        self.fixtures
            .persist_download(id, &response.body)
            .await
            .map_err(|source| ReadFailure::Persist {
                response: ResponseMeta::from(&response),
                source,
            })?;
        Ok(response)
    }
}

/// Completion side of an attached [`ReadWorker`].
#[derive(Debug)]
pub struct ReadWorkerHandle {
    finished: watch::Receiver<bool>,
}

impl ReadWorkerHandle {
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Block until `write-finished` has been delivered.
    ///
    /// Fails if the broker is dropped first, which means the terminal event
    /// can never arrive.
    pub async fn wait_finished(mut self) -> Result<(), ProbeError> {
        match self.finished.wait_for(|done| *done).await {
            Ok(_) => {
                info!("read worker finished");
                Ok(())
            }
            Err(_) => Err(ProbeError::WorkerAborted {
                worker: "read",
                reason: "broker dropped before write-finished".to_string(),
            }),
        }
    }
}
