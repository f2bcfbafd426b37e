//! Outcome ledger shared by the write and read workers.
//!
//! Two independent append-only logs, one per outcome kind, each behind its
//! own lock. Successes are only tallied; failures keep the identifier plus
//! whatever response metadata and error detail was captured.

use crate::storage::{GetResponse, ObjectMeta, PutResponse};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

/// Response metadata captured for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: Option<u16>,
    pub key: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
    pub version: Option<String>,
}

impl From<&ObjectMeta> for ResponseMeta {
    fn from(meta: &ObjectMeta) -> Self {
        ResponseMeta {
            status: None,
            key: meta.key.clone(),
            size_bytes: meta.size_bytes,
            etag: meta.etag.clone(),
            version: meta.version.clone(),
        }
    }
}

impl From<&PutResponse> for ResponseMeta {
    fn from(resp: &PutResponse) -> Self {
        ResponseMeta::from(&resp.meta)
    }
}

impl From<&GetResponse> for ResponseMeta {
    fn from(resp: &GetResponse) -> Self {
        ResponseMeta {
            status: Some(resp.status),
            ..ResponseMeta::from(&resp.meta)
        }
    }
}

/// One failed write or read attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: u64,
    pub response: Option<ResponseMeta>,
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn failure(id: u64, response: Option<ResponseMeta>, error: impl Display) -> Self {
        OutcomeRecord {
            id,
            response,
            error: Some(error.to_string()),
        }
    }
}

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub writes_succeeded: u64,
    pub reads_succeeded: u64,
    pub write_failures: Vec<OutcomeRecord>,
    pub read_failures: Vec<OutcomeRecord>,
}

#[derive(Debug, Default)]
pub struct OutcomeLedger {
    write_failures: Mutex<Vec<OutcomeRecord>>,
    read_failures: Mutex<Vec<OutcomeRecord>>,
    writes_succeeded: AtomicU64,
    reads_succeeded: AtomicU64,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write_success(&self) {
        self.writes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self, record: OutcomeRecord) {
        self.write_failures.lock().push(record);
    }

    pub fn record_read_success(&self) {
        self.reads_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self, record: OutcomeRecord) {
        self.read_failures.lock().push(record);
    }

    pub fn write_failure_count(&self) -> usize {
        self.write_failures.lock().len()
    }

    pub fn read_failure_count(&self) -> usize {
        self.read_failures.lock().len()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            writes_succeeded: self.writes_succeeded.load(Ordering::Relaxed),
            reads_succeeded: self.reads_succeeded.load(Ordering::Relaxed),
            write_failures: self.write_failures.lock().clone(),
            read_failures: self.read_failures.lock().clone(),
        }
    }
}
