//! Error types for configuration and for fatal run failures.
//!
//! Per-object failures are not errors at this level: they are recorded in
//! the [`OutcomeLedger`](crate::ledger::OutcomeLedger) and the run goes on.

use crate::storage::StorageError;

/// Problems detected before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required credential {0}")]
    MissingCredential(&'static str),
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("identifier range start={start} count={count} overflows the identifier space")]
    InvalidRange { start: u64, count: u64 },
    #[error("bucket name must not be empty")]
    EmptyBucket,
    #[error("payload size must be greater than zero")]
    ZeroPayloadSize,
    #[error("store type {0} requires store.local_path")]
    MissingLocalPath(&'static str),
    #[error("store type s3 requires building with --features s3")]
    S3NotEnabled,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors that abort a probe run.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to initialise object store: {0}")]
    Store(#[from] StorageError),
    #[error("failed to prepare fixture directories: {0}")]
    Fixtures(#[source] std::io::Error),
    #[error("read worker stopped before signalling readiness")]
    ReaderNotReady,
    #[error("{worker} worker terminated abnormally: {reason}")]
    WorkerAborted { worker: &'static str, reason: String },
    #[error("failed to write report to {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
