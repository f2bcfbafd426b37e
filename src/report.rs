//! End-of-run report.
//!
//! Built from a [`LedgerSnapshot`] after both workers have been joined. It
//! holds no timestamps or run-local state, so producing it twice from the
//! same ledger yields identical output.

use crate::config::RunRange;
use crate::error::ProbeError;
use crate::ledger::{LedgerSnapshot, OutcomeRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub bucket: String,
    pub start: u64,
    pub count: u64,
    pub writes_succeeded: u64,
    pub reads_succeeded: u64,
    pub write_failure_count: usize,
    pub read_failure_count: usize,
    pub write_failures: Vec<OutcomeRecord>,
    pub read_failures: Vec<OutcomeRecord>,
}

impl ProbeReport {
    pub fn from_snapshot(bucket: &str, range: RunRange, snapshot: LedgerSnapshot) -> Self {
        ProbeReport {
            bucket: bucket.to_string(),
            start: range.start(),
            count: range.count(),
            writes_succeeded: snapshot.writes_succeeded,
            reads_succeeded: snapshot.reads_succeeded,
            write_failure_count: snapshot.write_failures.len(),
            read_failure_count: snapshot.read_failures.len(),
            write_failures: snapshot.write_failures,
            read_failures: snapshot.read_failures,
        }
    }

    /// No failures of either kind
    pub fn is_clean(&self) -> bool {
        self.write_failure_count == 0 && self.read_failure_count == 0
    }

    pub fn write_failure_ids(&self) -> Vec<u64> {
        self.write_failures.iter().map(|r| r.id).collect()
    }

    pub fn read_failure_ids(&self) -> Vec<u64> {
        self.read_failures.iter().map(|r| r.id).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "bucket={} range=[{}, {}) writes={}/{} reads={}/{} write_failures={} read_failures={}",
            self.bucket,
            self.start,
            self.start.saturating_add(self.count),
            self.writes_succeeded,
            self.count,
            self.reads_succeeded,
            self.writes_succeeded,
            self.write_failure_count,
            self.read_failure_count,
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON form to `path`, replacing any previous report.
    pub async fn write_to(&self, path: &Path) -> Result<(), ProbeError> {
        let report_err = |source: std::io::Error| ProbeError::Report {
            path: path.display().to_string(),
            source,
        };
        let json = self.to_json().map_err(|e| report_err(e.into()))?;
        tokio::fs::write(path, json).await.map_err(report_err)
    }
}
