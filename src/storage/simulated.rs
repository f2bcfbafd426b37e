//! Simulated Object Store with Fault Injection
//!
//! Wraps another store and injects faults from a seeded RNG, so a failing
//! probe run can be replayed exactly from its seed. A [`FaultPlan`] adds
//! deterministic per-key faults on top of the probabilistic ones.
//!
//! Every call is appended to a call log, which is how tests observe the
//! `put(i), get(i), put(i+1), ...` interleaving.

use super::{GetResponse, ObjectStore, PutResponse, StorageError, StoreFuture};
use crate::sim::Rng;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Status injected for probabilistic bad-status faults.
pub const SIMULATED_BAD_STATUS: u16 = 503;

/// Configuration for simulated fault injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
    /// Probability of GET answering with a non-success status
    pub bad_status_prob: f64,
    /// Probability of GET returning corrupted data
    pub get_corrupt_prob: f64,
    /// Probability of operation timeout
    pub timeout_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01,
            get_fail_prob: 0.01,
            bad_status_prob: 0.005,
            get_corrupt_prob: 0.001,
            timeout_prob: 0.005,
            latency_range_us: (100, 10_000), // 0.1ms - 10ms
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.05,
            get_fail_prob: 0.05,
            bad_status_prob: 0.05,
            get_corrupt_prob: 0.02,
            timeout_prob: 0.02,
            latency_range_us: (0, 500),
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
            bad_status_prob: 0.0,
            get_corrupt_prob: 0.0,
            timeout_prob: 0.0,
            latency_range_us: (0, 0),
        }
    }
}

/// Deterministic faults keyed by object key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPlan {
    /// Keys whose PUT always fails
    pub put_failures: BTreeSet<String>,
    /// Keys whose GET answers with the given status
    pub get_statuses: BTreeMap<String, u16>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_put(mut self, key: impl Into<String>) -> Self {
        self.put_failures.insert(key.into());
        self
    }

    pub fn get_status(mut self, key: impl Into<String>, status: u16) -> Self {
        self.get_statuses.insert(key.into(), status);
        self
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub bad_statuses: u64,
    pub get_corruptions: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Put,
    Get,
}

/// One entry of the call log, recorded when the call starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub seq: u64,
    pub op: StoreOp,
    pub key: String,
}

struct SimulatedStoreInner<R: Rng> {
    rng: R,
    stats: SimulatedStoreStats,
    calls: Vec<StoreCall>,
}

impl<R: Rng> SimulatedStoreInner<R> {
    fn record(&mut self, op: StoreOp, key: &str) {
        let seq = self.calls.len() as u64;
        self.calls.push(StoreCall {
            seq,
            op,
            key: key.to_string(),
        });
    }

    fn latency_us(&mut self, (min, max): (u64, u64)) -> u64 {
        if max > min {
            self.rng.gen_range(min, max)
        } else {
            min
        }
    }
}

/// Simulated object store that wraps another store and injects faults
pub struct SimulatedObjectStore<S: ObjectStore, R: Rng> {
    inner_store: Arc<S>,
    config: SimulatedStoreConfig,
    plan: FaultPlan,
    state: Arc<Mutex<SimulatedStoreInner<R>>>,
}

impl<S: ObjectStore, R: Rng> SimulatedObjectStore<S, R> {
    /// Create a new simulated store with the given RNG
    pub fn new(inner_store: S, rng: R, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner_store: Arc::new(inner_store),
            config,
            plan: FaultPlan::default(),
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng,
                stats: SimulatedStoreStats::default(),
                calls: Vec::new(),
            })),
        }
    }

    /// Attach deterministic per-key faults
    pub fn with_plan(mut self, plan: FaultPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// Every call made so far, in arrival order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    async fn simulate_latency(&self) {
        let latency_us = self.state.lock().latency_us(self.config.latency_range_us);
        if latency_us > 0 {
            tokio::time::sleep(std::time::Duration::from_micros(latency_us)).await;
        }
    }
}

impl<S: ObjectStore, R: Rng> Clone for SimulatedObjectStore<S, R> {
    fn clone(&self) -> Self {
        SimulatedObjectStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            plan: self.plan.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: ObjectStore, R: Rng> ObjectStore for SimulatedObjectStore<S, R> {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        source: &'a Path,
    ) -> StoreFuture<'a, PutResponse> {
        Box::pin(async move {
            let fault = {
                let mut s = self.state.lock();
                s.record(StoreOp::Put, key);
                s.stats.put_attempts += 1;

                if s.rng.gen_bool(self.config.timeout_prob) {
                    s.stats.timeouts += 1;
                    Some(StorageError::Timeout(format!("simulated timeout on put {}", key)))
                } else if self.plan.put_failures.contains(key) {
                    s.stats.put_failures += 1;
                    Some(StorageError::Backend(format!("injected put failure for {}", key)))
                } else if s.rng.gen_bool(self.config.put_fail_prob) {
                    s.stats.put_failures += 1;
                    Some(StorageError::Backend("simulated put failure".to_string()))
                } else {
                    None
                }
            };
            if let Some(err) = fault {
                return Err(err);
            }

            self.simulate_latency().await;
            self.inner_store.put(bucket, key, source).await
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, GetResponse> {
        Box::pin(async move {
            let fault = {
                let mut s = self.state.lock();
                s.record(StoreOp::Get, key);
                s.stats.get_attempts += 1;

                if s.rng.gen_bool(self.config.timeout_prob) {
                    s.stats.timeouts += 1;
                    Some(StorageError::Timeout(format!("simulated timeout on get {}", key)))
                } else if s.rng.gen_bool(self.config.get_fail_prob) {
                    s.stats.get_failures += 1;
                    Some(StorageError::Backend("simulated get failure".to_string()))
                } else {
                    None
                }
            };
            if let Some(err) = fault {
                return Err(err);
            }

            self.simulate_latency().await;
            let mut response = self.inner_store.get(bucket, key).await?;

            let mut s = self.state.lock();
            let injected_status = match self.plan.get_statuses.get(key) {
                Some(status) => Some(*status),
                None if s.rng.gen_bool(self.config.bad_status_prob) => Some(SIMULATED_BAD_STATUS),
                None => None,
            };
            if let Some(status) = injected_status {
                s.stats.bad_statuses += 1;
                response.status = status;
                return Ok(response);
            }

            if !response.body.is_empty() && s.rng.gen_bool(self.config.get_corrupt_prob) {
                s.stats.get_corruptions += 1;
                let mut corrupted = response.body.to_vec();
                let idx = s.rng.gen_range(0, corrupted.len() as u64) as usize;
                corrupted[idx] ^= 0xFF;
                response.body = corrupted.into();
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedRng;
    use crate::storage::InMemoryObjectStore;

    async fn source_file(dir: &tempfile::TempDir, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("src.bin");
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    fn store(
        seed: u64,
        config: SimulatedStoreConfig,
    ) -> SimulatedObjectStore<InMemoryObjectStore, SimulatedRng> {
        SimulatedObjectStore::new(InMemoryObjectStore::new(), SimulatedRng::new(seed), config)
    }

    #[tokio::test]
    async fn test_simulated_store_no_faults() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"value1").await;
        let store = store(42, SimulatedStoreConfig::no_faults());

        store.put("b", "key1", &src).await.unwrap();
        let got = store.get("b", "key1").await.unwrap();
        assert!(got.is_success());
        assert_eq!(&got.body[..], b"value1");

        let stats = store.stats();
        assert_eq!(stats.put_attempts, 1);
        assert_eq!(stats.put_failures, 0);
        assert_eq!(stats.get_attempts, 1);
        assert_eq!(stats.get_failures, 0);
    }

    #[tokio::test]
    async fn test_simulated_store_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"data").await;
        let config = SimulatedStoreConfig {
            put_fail_prob: 0.5,
            ..SimulatedStoreConfig::no_faults()
        };

        let store1 = store(12345, config.clone());
        let store2 = store(12345, config);

        let mut results1 = Vec::new();
        let mut results2 = Vec::new();
        for i in 0..20 {
            let key = i.to_string();
            results1.push(store1.put("b", &key, &src).await.is_ok());
            results2.push(store2.put("b", &key, &src).await.is_ok());
        }

        assert_eq!(results1, results2, "same seed must inject the same faults");
    }

    #[tokio::test]
    async fn test_fault_plan_put_failure() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"data").await;
        let store = store(1, SimulatedStoreConfig::no_faults())
            .with_plan(FaultPlan::new().fail_put("2"));

        assert!(store.put("b", "1", &src).await.is_ok());
        assert!(matches!(
            store.put("b", "2", &src).await,
            Err(StorageError::Backend(_))
        ));
        assert!(store.inner().contents("b", "2").is_none());
        assert_eq!(store.stats().put_failures, 1);
    }

    #[tokio::test]
    async fn test_fault_plan_status_override() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"data").await;
        let store = store(1, SimulatedStoreConfig::no_faults())
            .with_plan(FaultPlan::new().get_status("1", 404));

        store.put("b", "1", &src).await.unwrap();
        let got = store.get("b", "1").await.unwrap();
        assert_eq!(got.status, 404);
        assert!(!got.is_success());
        assert_eq!(store.stats().bad_statuses, 1);
    }

    #[tokio::test]
    async fn test_simulated_store_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"original data here").await;
        let store = store(
            42,
            SimulatedStoreConfig {
                get_corrupt_prob: 1.0,
                ..SimulatedStoreConfig::no_faults()
            },
        );

        store.put("b", "key", &src).await.unwrap();
        let got = store.get("b", "key").await.unwrap();

        assert!(got.is_success());
        assert_ne!(&got.body[..], b"original data here");
        assert_eq!(store.stats().get_corruptions, 1);
    }

    #[tokio::test]
    async fn test_call_log_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(&dir, b"x").await;
        let store = store(0, SimulatedStoreConfig::no_faults());

        store.put("b", "0", &src).await.unwrap();
        store.get("b", "0").await.unwrap();
        store.put("b", "1", &src).await.unwrap();

        let calls: Vec<(StoreOp, String)> =
            store.calls().into_iter().map(|c| (c.op, c.key)).collect();
        assert_eq!(
            calls,
            vec![
                (StoreOp::Put, "0".to_string()),
                (StoreOp::Get, "0".to_string()),
                (StoreOp::Put, "1".to_string()),
            ]
        );
    }
}
