//! Write worker: uploads each identifier in order and announces completions.

use crate::broker::{EventBroker, WRITE_COMPLETED, WRITE_FINISHED};
use crate::config::RunRange;
use crate::fixtures::FixtureDirs;
use crate::ledger::{OutcomeLedger, OutcomeRecord};
use crate::storage::{ObjectStore, PutResponse, StorageError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a single write attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum WriteFailure {
    #[error("failed to materialize payload: {0}")]
    Fixture(#[source] std::io::Error),
    #[error("put failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct WriteWorker {
    store: Arc<dyn ObjectStore>,
    ledger: Arc<OutcomeLedger>,
    fixtures: Arc<FixtureDirs>,
    bucket: String,
    range: RunRange,
}

impl WriteWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: Arc<OutcomeLedger>,
        fixtures: Arc<FixtureDirs>,
        bucket: String,
        range: RunRange,
    ) -> Self {
        WriteWorker {
            store,
            ledger,
            fixtures,
            bucket,
            range,
        }
    }

    /// Write every identifier in the range, strictly one after another.
    ///
    /// After each successful put, `write-completed(id)` is published and
    /// this call waits for every subscriber before moving on. A failed
    /// attempt is recorded once and skipped. `write-finished` is always
    /// published at the end, including for an empty range.
    pub async fn run(&self, broker: &EventBroker) -> WriteSummary {
        info!(
            bucket = %self.bucket,
            start = self.range.start(),
            count = self.range.count(),
            "write worker starting"
        );

        let mut summary = WriteSummary::default();
        for id in self.range.ids() {
            summary.attempted += 1;
            match self.write_one(id).await {
                Ok(response) => {
                    summary.succeeded += 1;
                    self.ledger.record_write_success();
                    debug!(id, etag = ?response.meta.etag, "write completed");

                    let delivery = broker.notify(WRITE_COMPLETED, id).await;
                    if delivery.failed > 0 {
                        warn!(id, failed = delivery.failed, "write-completed handlers failed");
                    }
                }
                Err(failure) => {
                    summary.failed += 1;
                    warn!(id, error = %failure, "write failed");
                    self.ledger
                        .record_write_failure(OutcomeRecord::failure(id, None, &failure));
                }
            }
        }

        broker.notify_signal(WRITE_FINISHED).await;
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "write worker finished"
        );
        summary
    }

    async fn write_one(&self, id: u64) -> Result<PutResponse, WriteFailure> {
        let source = self
            .fixtures
            .materialize(id)
            .await
            .map_err(WriteFailure::Fixture)?;
        let response = self
            .store
            .put(&self.bucket, &id.to_string(), &source)
            .await?;
        Ok(response)
    }
}
