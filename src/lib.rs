pub mod broker;
pub mod config;
pub mod dst;
pub mod error;
pub mod fixtures;
pub mod ledger;
pub mod observability;
pub mod orchestrator;
pub mod reader;
pub mod report;
pub mod sim;
pub mod storage;
pub mod writer;

pub use broker::{
    DeliveryReport, EventBroker, HandlerResult, NO_PAYLOAD, WRITE_COMPLETED, WRITE_FINISHED,
};
pub use config::{ProbeConfig, RunRange, StoreKind};
pub use error::{ConfigError, ProbeError};
pub use ledger::{OutcomeLedger, OutcomeRecord};
pub use orchestrator::{open_store, Probe};
pub use report::ProbeReport;
pub use storage::{ObjectStore, StorageError};
