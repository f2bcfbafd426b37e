//! End-to-end probe scenarios
//!
//! Full `Probe::run` against in-memory and fault-injecting stores, checking
//! the report, the downloaded files and the order of store calls.

use parking_lot::Mutex;
use raw_probe::broker::{HandlerResult, WRITE_COMPLETED, WRITE_FINISHED};
use raw_probe::fixtures::synthetic_payload;
use raw_probe::sim::SimulatedRng;
use raw_probe::storage::{
    FaultPlan, InMemoryObjectStore, LocalFsObjectStore, SimulatedObjectStore,
    SimulatedStoreConfig, StoreCall, StoreOp,
};
use raw_probe::{ObjectStore, Probe, ProbeConfig, ProbeReport, NO_PAYLOAD};
use std::path::Path;
use std::sync::Arc;

type TestStore = SimulatedObjectStore<InMemoryObjectStore, SimulatedRng>;

fn faulty_store(plan: FaultPlan) -> TestStore {
    SimulatedObjectStore::new(
        InMemoryObjectStore::new(),
        SimulatedRng::new(0),
        SimulatedStoreConfig::no_faults(),
    )
    .with_plan(plan)
}

async fn run(store: Arc<dyn ObjectStore>, config: &ProbeConfig) -> ProbeReport {
    Probe::from_config(config, store)
        .unwrap()
        .run()
        .await
        .unwrap()
}

fn outputs(config: &ProbeConfig) -> Vec<u64> {
    let mut ids: Vec<u64> = std::fs::read_dir(&config.output_dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name().into_string().unwrap();
            name.strip_suffix(".bin")?.parse().ok()
        })
        .collect();
    ids.sort_unstable();
    ids
}

fn assert_downloads_match(config: &ProbeConfig, ids: &[u64]) {
    for id in ids {
        let path = config.output_dir.join(format!("{}.bin", id));
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, synthetic_payload(*id, config.payload_size), "id {}", id);
    }
}

fn call(seq: u64, op: StoreOp, key: &str) -> StoreCall {
    StoreCall {
        seq,
        op,
        key: key.to_string(),
    }
}

fn config_in(root: &Path, start: u64, count: u64) -> ProbeConfig {
    ProbeConfig::test(root, start, count)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_calls_succeed() {
    raw_probe::observability::init_test_tracing();
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 5);

    let report = run(Arc::new(InMemoryObjectStore::new()), &config).await;

    assert_eq!(report.write_failure_count, 0);
    assert_eq!(report.read_failure_count, 0);
    assert_eq!(report.writes_succeeded, 5);
    assert_eq!(report.reads_succeeded, 5);
    assert_eq!(outputs(&config), vec![0, 1, 2, 3, 4]);
    assert_downloads_match(&config, &[0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_put_failure_skips_read() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 5);
    let store = faulty_store(FaultPlan::new().fail_put("2"));

    let report = run(Arc::new(store.clone()), &config).await;

    assert_eq!(report.write_failure_ids(), vec![2]);
    assert!(report.read_failure_ids().is_empty());
    assert_eq!(outputs(&config), vec![0, 1, 3, 4]);
    assert!(!store
        .calls()
        .iter()
        .any(|c| c.op == StoreOp::Get && c.key == "2"));
    assert!(report.write_failures[0].response.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_get_status_is_read_failure() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 3);
    let store = faulty_store(FaultPlan::new().get_status("1", 503));

    let report = run(Arc::new(store), &config).await;

    assert_eq!(report.read_failure_ids(), vec![1]);
    assert!(report.write_failure_ids().is_empty());
    let captured = report.read_failures[0].response.as_ref().unwrap();
    assert_eq!(captured.status, Some(503));
    assert_eq!(captured.key, "1");
    assert_eq!(outputs(&config), vec![0, 2]);
}

#[tokio::test]
async fn test_empty_range_terminates() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 0);
    let store = faulty_store(FaultPlan::new());

    let report = run(Arc::new(store.clone()), &config).await;

    assert!(report.is_clean());
    assert_eq!(report.writes_succeeded, 0);
    assert!(store.calls().is_empty());
    assert!(outputs(&config).is_empty());
}

#[tokio::test]
async fn test_nonzero_start() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 40, 3);

    let report = run(Arc::new(InMemoryObjectStore::new()), &config).await;

    assert!(report.is_clean());
    assert_eq!(outputs(&config), vec![40, 41, 42]);
}

#[tokio::test]
async fn test_local_fs_store() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 4);
    let store = LocalFsObjectStore::new(root.path().join("objects"));

    let report = run(Arc::new(store), &config).await;

    assert!(report.is_clean());
    assert!(root.path().join("objects/probe-test/3").is_file());
    assert_downloads_match(&config, &[0, 1, 2, 3]);
}

// =============================================================================
// Ordering and delivery
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_follows_put_for_each_id() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 4);
    let store = faulty_store(FaultPlan::new());

    run(Arc::new(store.clone()), &config).await;

    let expected: Vec<StoreCall> = (0..4u64)
        .flat_map(|id| {
            let key = id.to_string();
            [
                call(id * 2, StoreOp::Put, &key),
                call(id * 2 + 1, StoreOp::Get, &key),
            ]
        })
        .collect();
    assert_eq!(store.calls(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ordering_holds_with_store_latency() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 10);
    let store = SimulatedObjectStore::new(
        InMemoryObjectStore::new(),
        SimulatedRng::new(77),
        SimulatedStoreConfig {
            latency_range_us: (50, 2_000),
            ..SimulatedStoreConfig::no_faults()
        },
    );

    let report = run(Arc::new(store.clone()), &config).await;

    assert!(report.is_clean());
    let ops: Vec<(StoreOp, String)> = store
        .calls()
        .into_iter()
        .map(|c| (c.op, c.key))
        .collect();
    assert_eq!(ops.len(), 20);
    for (i, pair) in ops.chunks(2).enumerate() {
        assert_eq!(pair[0], (StoreOp::Put, i.to_string()));
        assert_eq!(pair[1], (StoreOp::Get, i.to_string()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_additional_listener_receives_every_event() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 3);
    let store = faulty_store(FaultPlan::new().fail_put("1"));
    let probe = Probe::from_config(&config, Arc::new(store)).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in [WRITE_COMPLETED, WRITE_FINISHED] {
        let seen = seen.clone();
        probe.broker().subscribe(name, move |payload| {
            let seen = seen.clone();
            async move {
                seen.lock().push((name, payload));
                HandlerResult::Ok(())
            }
        });
    }

    let report = probe.run().await.unwrap();

    assert_eq!(report.write_failure_ids(), vec![1]);
    assert_eq!(
        *seen.lock(),
        vec![
            (WRITE_COMPLETED, 0),
            (WRITE_COMPLETED, 2),
            (WRITE_FINISHED, NO_PAYLOAD),
        ]
    );
}

// =============================================================================
// Failure accounting
// =============================================================================

#[tokio::test]
async fn test_failures_recorded_once_per_attempt() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 6);
    let store = faulty_store(
        FaultPlan::new()
            .fail_put("0")
            .fail_put("4")
            .get_status("2", 500)
            .get_status("5", 404),
    );

    let report = run(Arc::new(store), &config).await;

    assert_eq!(report.write_failure_ids(), vec![0, 4]);
    assert_eq!(report.read_failure_ids(), vec![2, 5]);
    assert_eq!(report.writes_succeeded, 4);
    assert_eq!(report.reads_succeeded, 2);
    assert_eq!(outputs(&config), vec![1, 3]);
}

#[tokio::test]
async fn test_corrupted_download_is_read_failure() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 5);
    let store = SimulatedObjectStore::new(
        InMemoryObjectStore::new(),
        SimulatedRng::new(5),
        SimulatedStoreConfig {
            get_corrupt_prob: 1.0,
            ..SimulatedStoreConfig::no_faults()
        },
    );

    let report = run(Arc::new(store), &config).await;

    assert_eq!(report.read_failure_ids(), vec![0, 1, 2, 3, 4]);
    assert!(report.read_failures[0]
        .error
        .as_deref()
        .unwrap()
        .contains("content mismatch"));
    assert!(outputs(&config).is_empty());
}

#[tokio::test]
async fn test_unverified_run_persists_whatever_was_read() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_in(root.path(), 0, 2);
    config.verify_content = false;
    let store = SimulatedObjectStore::new(
        InMemoryObjectStore::new(),
        SimulatedRng::new(5),
        SimulatedStoreConfig {
            get_corrupt_prob: 1.0,
            ..SimulatedStoreConfig::no_faults()
        },
    );

    let report = run(Arc::new(store), &config).await;

    assert!(report.is_clean());
    assert_eq!(outputs(&config), vec![0, 1]);
}

#[tokio::test]
async fn test_uncreatable_output_dir_stops_run() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_in(root.path(), 0, 2);
    // A regular file where the output directory should be
    let blocker = root.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    config.output_dir = blocker.join("out");

    let result = Probe::from_config(&config, Arc::new(InMemoryObjectStore::new()))
        .unwrap()
        .run()
        .await;

    // Fixture directories cannot be created, so the run stops before any write
    assert!(matches!(result, Err(raw_probe::ProbeError::Fixtures(_))));
}

// =============================================================================
// Report
// =============================================================================

#[tokio::test]
async fn test_report_file_sections() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 3);
    let store = faulty_store(FaultPlan::new().fail_put("0").get_status("2", 503));

    let report = run(Arc::new(store), &config).await;
    report.write_to(&config.report_path).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.report_path).unwrap()).unwrap();
    assert_eq!(json["write_failure_count"], 1);
    assert_eq!(json["read_failure_count"], 1);
    assert_eq!(json["write_failures"][0]["id"], 0);
    assert_eq!(json["read_failures"][0]["id"], 2);
    assert_eq!(json["read_failures"][0]["response"]["status"], 503);
}

#[tokio::test]
async fn test_report_written_twice_is_identical() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), 0, 3);
    let store = faulty_store(FaultPlan::new().get_status("1", 503));

    let report = run(Arc::new(store), &config).await;
    report.write_to(&config.report_path).await.unwrap();
    let first = std::fs::read(&config.report_path).unwrap();
    report.write_to(&config.report_path).await.unwrap();
    let second = std::fs::read(&config.report_path).unwrap();

    assert_eq!(first, second);
}
