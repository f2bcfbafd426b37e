//! Deterministic Simulation Testing for probe runs
//!
//! Runs a full probe against a seeded [`SimulatedObjectStore`] and checks the
//! run against what the store's call log says really happened:
//!
//! ```text
//! for seed in 0..N {
//!     let harness = ProbeDSTHarness::new(ProbeDSTConfig::chaos(seed), root);
//!     harness.run().await;   // full Probe::run
//!     harness.check_invariants().await;
//! }
//! ```
//!
//! Invariants checked:
//! - every identifier is accounted for exactly once on the write side
//! - every successful write is read back exactly once
//! - no identifier is in both failure lists, or twice in one
//! - a write-failed identifier is never read
//! - each `get(i)` directly follows `put(i)` in the call log
//! - a download is persisted exactly for successful reads

use crate::config::{ProbeConfig, RunRange};
use crate::fixtures::synthetic_payload;
use crate::orchestrator::Probe;
use crate::report::ProbeReport;
use crate::sim::SimulatedRng;
use crate::storage::{
    InMemoryObjectStore, SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats,
    StoreOp,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Configuration for probe DST
#[derive(Debug, Clone)]
pub struct ProbeDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Object store fault configuration
    pub store_config: SimulatedStoreConfig,
    pub start: u64,
    pub count: u64,
    pub payload_size: usize,
    pub verify_content: bool,
}

impl Default for ProbeDSTConfig {
    fn default() -> Self {
        ProbeDSTConfig {
            seed: 0,
            store_config: SimulatedStoreConfig {
                latency_range_us: (0, 200),
                ..SimulatedStoreConfig::default()
            },
            start: 0,
            count: 100,
            payload_size: 128,
            verify_content: true,
        }
    }
}

impl ProbeDSTConfig {
    pub fn new(seed: u64) -> Self {
        ProbeDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm mode - no fault injection
    pub fn calm(seed: u64) -> Self {
        ProbeDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::no_faults(),
            ..Default::default()
        }
    }

    /// Moderate mode - default fault rates, short latencies
    pub fn moderate(seed: u64) -> Self {
        Self::new(seed)
    }

    /// Chaos mode - high fault injection
    pub fn chaos(seed: u64) -> Self {
        ProbeDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::high_chaos(),
            ..Default::default()
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }
}

/// Result of a DST run
#[derive(Debug, Clone)]
pub struct ProbeDSTResult {
    /// Seed used
    pub seed: u64,
    /// Report produced by the run, if it completed
    pub report: Option<ProbeReport>,
    /// Store fault statistics
    pub store_stats: SimulatedStoreStats,
    /// Invariant violations found
    pub invariant_violations: Vec<String>,
}

impl ProbeDSTResult {
    pub fn new(seed: u64) -> Self {
        ProbeDSTResult {
            seed,
            report: None,
            store_stats: SimulatedStoreStats::default(),
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        let (writes, reads, write_failures, read_failures) = match &self.report {
            Some(r) => (
                r.writes_succeeded,
                r.reads_succeeded,
                r.write_failure_count,
                r.read_failure_count,
            ),
            None => (0, 0, 0, 0),
        };
        format!(
            "Seed {}: {} writes ok ({} failed), {} reads ok ({} failed), {} faults injected, {} violations",
            self.seed,
            writes,
            write_failures,
            reads,
            read_failures,
            self.store_stats.put_failures
                + self.store_stats.get_failures
                + self.store_stats.bad_statuses
                + self.store_stats.get_corruptions
                + self.store_stats.timeouts,
            self.invariant_violations.len()
        )
    }
}

/// Type alias for our simulated store
type DSTStore = SimulatedObjectStore<InMemoryObjectStore, SimulatedRng>;

/// DST harness for one probe run
pub struct ProbeDSTHarness {
    config: ProbeDSTConfig,
    probe_config: ProbeConfig,
    store: DSTStore,
    result: ProbeDSTResult,
}

impl ProbeDSTHarness {
    /// Fixtures and downloads for this run live under `root`.
    pub fn new(config: ProbeDSTConfig, root: &Path) -> Self {
        let mut probe_config = ProbeConfig::test(root, config.start, config.count);
        probe_config.payload_size = config.payload_size;
        probe_config.verify_content = config.verify_content;

        let store = SimulatedObjectStore::new(
            InMemoryObjectStore::new(),
            SimulatedRng::new(config.seed),
            config.store_config.clone(),
        );

        ProbeDSTHarness {
            result: ProbeDSTResult::new(config.seed),
            config,
            probe_config,
            store,
        }
    }

    pub async fn run(&mut self) {
        let outcome = match Probe::from_config(&self.probe_config, Arc::new(self.store.clone())) {
            Ok(probe) => probe.run().await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(report) => self.result.report = Some(report),
            Err(e) => self
                .result
                .invariant_violations
                .push(format!("probe run failed: {}", e)),
        }
        self.result.store_stats = self.store.stats();
    }

    pub async fn check_invariants(&mut self) {
        let Some(report) = self.result.report.clone() else {
            return;
        };
        let mut violations = Vec::new();
        let range = match RunRange::new(self.config.start, self.config.count) {
            Ok(range) => range,
            Err(e) => {
                self.result.invariant_violations.push(e.to_string());
                return;
            }
        };

        if report.writes_succeeded + report.write_failure_count as u64 != range.count() {
            violations.push(format!(
                "write accounting: {} ok + {} failed != {}",
                report.writes_succeeded,
                report.write_failure_count,
                range.count()
            ));
        }
        if report.reads_succeeded + report.read_failure_count as u64 != report.writes_succeeded {
            violations.push(format!(
                "read accounting: {} ok + {} failed != {} writes",
                report.reads_succeeded, report.read_failure_count, report.writes_succeeded
            ));
        }

        let write_failed = unique_ids("write", &report.write_failure_ids(), &mut violations);
        let read_failed = unique_ids("read", &report.read_failure_ids(), &mut violations);
        for id in write_failed.intersection(&read_failed) {
            violations.push(format!("id {} is in both failure lists", id));
        }
        for id in write_failed.iter().chain(read_failed.iter()) {
            if !range.contains(*id) {
                violations.push(format!("failure recorded for out-of-range id {}", id));
            }
        }

        let calls = self.store.calls();
        let mut gets = 0u64;
        for (i, call) in calls.iter().enumerate() {
            if call.op != StoreOp::Get {
                continue;
            }
            gets += 1;
            let follows_put =
                i > 0 && calls[i - 1].op == StoreOp::Put && calls[i - 1].key == call.key;
            if !follows_put {
                violations.push(format!(
                    "get {} not directly after its put (seq {})",
                    call.key, call.seq
                ));
            }
            if let Ok(id) = call.key.parse::<u64>() {
                if write_failed.contains(&id) {
                    violations.push(format!("write-failed id {} was read", id));
                }
            }
        }
        if gets != report.writes_succeeded {
            violations.push(format!(
                "{} gets for {} successful writes",
                gets, report.writes_succeeded
            ));
        }

        for id in range.ids() {
            let path = self.probe_config.output_dir.join(format!("{}.bin", id));
            let read_ok = !write_failed.contains(&id) && !read_failed.contains(&id);
            match tokio::fs::read(&path).await {
                Ok(data) if read_ok => {
                    if self.config.verify_content
                        && data != synthetic_payload(id, self.config.payload_size)
                    {
                        violations.push(format!("download for {} differs from payload", id));
                    }
                }
                Ok(_) => violations.push(format!("download persisted for failed id {}", id)),
                Err(_) if read_ok => violations.push(format!("no download for read id {}", id)),
                Err(_) => {}
            }
        }

        self.result.invariant_violations.extend(violations);
    }

    pub fn output_dir(&self) -> &Path {
        &self.probe_config.output_dir
    }

    pub fn store(&self) -> &DSTStore {
        &self.store
    }

    pub fn result(&self) -> &ProbeDSTResult {
        &self.result
    }

    pub fn into_result(self) -> ProbeDSTResult {
        self.result
    }
}

fn unique_ids(kind: &str, ids: &[u64], violations: &mut Vec<String>) -> BTreeSet<u64> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(*id) {
            violations.push(format!("id {} recorded twice as {} failure", id, kind));
        }
    }
    seen
}

/// Run a batch of DST probes with consecutive seeds, each in its own
/// subdirectory of `root`.
pub async fn run_probe_batch(
    base_seed: u64,
    count: usize,
    root: &Path,
    config_fn: impl Fn(u64) -> ProbeDSTConfig,
) -> Vec<ProbeDSTResult> {
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let seed = base_seed + i as u64;
        let dir = root.join(format!("seed-{}", seed));

        let mut harness = ProbeDSTHarness::new(config_fn(seed), &dir);
        harness.run().await;
        harness.check_invariants().await;

        results.push(harness.into_result());
    }

    results
}

/// Summary of batch results
pub fn summarize_batch(results: &[ProbeDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();

    let reports = results.iter().filter_map(|r| r.report.as_ref());
    let (write_failures, read_failures) = reports.fold((0, 0), |(w, r), report| {
        (w + report.write_failure_count, r + report.read_failure_count)
    });

    let mut summary = format!(
        "Batch: {}/{} passed, {} write failures, {} read failures",
        passed, total, write_failures, read_failures
    );

    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }

    summary
}
