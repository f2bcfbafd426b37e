//! Run orchestration: wires broker, ledger and both workers together.
//!
//! ```text
//!   Probe::run
//!     ├─ spawn reader: attach subscriptions ── ready ──┐
//!     ├─ spawn writer: wait for ready ◄────────────────┘
//!     │                 put/notify loop, then write-finished
//!     ├─ join writer
//!     ├─ join reader (returns once write-finished was delivered)
//!     └─ build report from the ledger
//! ```
//!
//! The writer never starts before the reader's subscriptions exist, and the
//! report is only built after both tasks have been joined.

use crate::broker::{EventBroker, WRITE_FINISHED};
use crate::config::{ProbeConfig, RunRange, S3Credentials, StoreKind};
use crate::error::{ConfigError, ProbeError};
use crate::fixtures::FixtureDirs;
use crate::ledger::OutcomeLedger;
use crate::reader::ReadWorker;
use crate::report::ProbeReport;
use crate::sim::SimulatedRng;
use crate::storage::{
    InMemoryObjectStore, LocalFsObjectStore, ObjectStore, SimulatedObjectStore,
};
use crate::writer::{WriteSummary, WriteWorker};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// One configured probe run.
pub struct Probe {
    store: Arc<dyn ObjectStore>,
    broker: Arc<EventBroker>,
    bucket: String,
    range: RunRange,
    fixtures: Arc<FixtureDirs>,
    verify_content: bool,
}

impl Probe {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        range: RunRange,
        fixtures: FixtureDirs,
    ) -> Self {
        Probe {
            store,
            broker: Arc::new(EventBroker::new()),
            bucket: bucket.into(),
            range,
            fixtures: Arc::new(fixtures),
            verify_content: true,
        }
    }

    pub fn from_config(config: &ProbeConfig, store: Arc<dyn ObjectStore>) -> Result<Self, ProbeError> {
        config.validate()?;
        let fixtures = FixtureDirs::new(
            config.input_dir.clone(),
            config.output_dir.clone(),
            config.payload_size,
        );
        Ok(Probe::new(store, config.bucket.clone(), config.range()?, fixtures)
            .verify_content(config.verify_content))
    }

    pub fn verify_content(mut self, enabled: bool) -> Self {
        self.verify_content = enabled;
        self
    }

    /// Broker for this run. Extra listeners registered before
    /// [`run`](Probe::run) are delivered ahead of the read worker, so a
    /// `write-completed` listener runs before that identifier is read back.
    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    pub async fn run(self) -> Result<ProbeReport, ProbeError> {
        self.fixtures.ensure().await.map_err(ProbeError::Fixtures)?;
        info!(
            bucket = %self.bucket,
            start = self.range.start(),
            count = self.range.count(),
            "probe starting"
        );

        let ledger = Arc::new(OutcomeLedger::new());
        let reader = ReadWorker::new(
            self.store.clone(),
            ledger.clone(),
            self.fixtures.clone(),
            self.bucket.clone(),
        )
        .verify_content(self.verify_content);
        let writer = WriteWorker::new(
            self.store.clone(),
            ledger.clone(),
            self.fixtures.clone(),
            self.bucket.clone(),
            self.range,
        );

        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let reader_task = tokio::spawn({
            let broker = self.broker.clone();
            async move {
                let handle = reader.attach(&broker);
                if ready_tx.send(()).is_err() {
                    warn!("write worker gone before readiness was signalled");
                }
                handle.wait_finished().await
            }
        });

        let writer_task = tokio::spawn({
            let broker = self.broker.clone();
            async move {
                ready_rx.await.map_err(|_| ProbeError::ReaderNotReady)?;
                Ok::<WriteSummary, ProbeError>(writer.run(&broker).await)
            }
        });

        let written = flatten_join("write", writer_task.await);
        if let Err(e) = &written {
            // The terminal event never went out; send it so the reader can stop.
            error!(error = %e, "write worker ended abnormally");
            self.broker.notify_signal(WRITE_FINISHED).await;
        }
        let read = flatten_join("read", reader_task.await);

        let summary = written?;
        read?;

        let report = ProbeReport::from_snapshot(&self.bucket, self.range, ledger.snapshot());
        info!(
            attempted = summary.attempted,
            write_failures = report.write_failure_count,
            read_failures = report.read_failure_count,
            "probe finished"
        );
        Ok(report)
    }
}

fn flatten_join<T>(
    worker: &'static str,
    joined: Result<Result<T, ProbeError>, JoinError>,
) -> Result<T, ProbeError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(ProbeError::WorkerAborted {
            worker,
            reason: e.to_string(),
        }),
    }
}

/// Build the object store selected by `config.store`.
///
/// S3 credentials come from the environment only; missing credentials are
/// a configuration error.
pub fn open_store(config: &ProbeConfig) -> Result<Arc<dyn ObjectStore>, ProbeError> {
    let store = &config.store;
    let opened: Arc<dyn ObjectStore> = match store.kind {
        StoreKind::Memory => Arc::new(InMemoryObjectStore::new()),
        StoreKind::LocalFs => {
            let path = store
                .local_path
                .clone()
                .ok_or(ConfigError::MissingLocalPath("localfs"))?;
            Arc::new(LocalFsObjectStore::new(path))
        }
        StoreKind::Simulated => Arc::new(
            SimulatedObjectStore::new(
                InMemoryObjectStore::new(),
                SimulatedRng::new(store.seed),
                store.simulated.clone(),
            )
            .with_plan(store.faults.clone()),
        ),
        StoreKind::S3 => open_s3(config, S3Credentials::from_env()?)?,
    };
    info!(kind = ?store.kind, "object store ready");
    Ok(opened)
}

#[cfg(feature = "s3")]
fn open_s3(
    config: &ProbeConfig,
    credentials: S3Credentials,
) -> Result<Arc<dyn ObjectStore>, ProbeError> {
    let store = crate::storage::S3ObjectStore::new(
        config.store.s3.clone(),
        credentials,
        &config.bucket,
    )?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "s3"))]
fn open_s3(
    _config: &ProbeConfig,
    _credentials: S3Credentials,
) -> Result<Arc<dyn ObjectStore>, ProbeError> {
    Err(ConfigError::S3NotEnabled.into())
}
