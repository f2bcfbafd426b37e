//! Probe configuration
//!
//! Layered, lowest precedence first: defaults, an optional TOML file,
//! `PROBE_*` environment variables, then command-line flags (applied by the
//! binary).
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | PROBE_BUCKET | raw-probe | Target bucket |
//! | PROBE_START | 0 | First object identifier |
//! | PROBE_COUNT | 100 | Number of objects |
//! | PROBE_PAYLOAD_SIZE | 65536 | Bytes per synthetic object |
//! | PROBE_INPUT_DIR | probe-data/input | Fixture directory |
//! | PROBE_OUTPUT_DIR | probe-data/output | Download directory |
//! | PROBE_REPORT_PATH | probe-report.json | JSON report path |
//! | PROBE_VERIFY_CONTENT | true | Compare downloads with fixtures |
//! | PROBE_STORE_TYPE | memory | memory, localfs, simulated or s3 |
//! | PROBE_DATA_PATH | - | LocalFs base directory |
//! | PROBE_SEED | 0 | Seed for the simulated store |
//! | PROBE_S3_PREFIX | (empty) | Key prefix inside the bucket |
//! | PROBE_S3_ENDPOINT | - | MinIO / LocalStack endpoint URL |
//! | AWS_REGION | us-east-1 | S3 region |
//! | AWS_ACCESS_KEY_ID | - | S3 credentials (required for s3) |
//! | AWS_SECRET_ACCESS_KEY | - | S3 credentials (required for s3) |

use crate::broker::NO_PAYLOAD;
use crate::error::ConfigError;
use crate::storage::{FaultPlan, SimulatedStoreConfig};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_BUCKET: &str = "raw-probe";
const DEFAULT_COUNT: u64 = 100;
const DEFAULT_PAYLOAD_SIZE: usize = 64 * 1024;
const DEFAULT_REGION: &str = "us-east-1";

/// Half-open identifier interval `[start, start + count)`.
///
/// Never reaches [`NO_PAYLOAD`], so identifiers and the sentinel cannot
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunRange {
    start: u64,
    count: u64,
}

impl RunRange {
    pub fn new(start: u64, count: u64) -> Result<Self, ConfigError> {
        match start.checked_add(count) {
            Some(end) if end <= NO_PAYLOAD => Ok(RunRange { start, count }),
            _ => Err(ConfigError::InvalidRange { start, count }),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids().contains(&id)
    }

    /// Identifiers in increasing order
    pub fn ids(&self) -> Range<u64> {
        self.start..self.end()
    }
}

/// Type of object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-memory store (for tests and dry runs)
    Memory,
    /// Local filesystem
    LocalFs,
    /// In-memory store behind the fault-injecting wrapper
    Simulated,
    /// Amazon S3 or compatible
    S3,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "localfs" => Ok(StoreKind::LocalFs),
            "simulated" => Ok(StoreKind::Simulated),
            "s3" => Ok(StoreKind::S3),
            _ => Err(ConfigError::InvalidValue {
                name: "store type",
                value: s.to_string(),
            }),
        }
    }
}

/// S3 connection settings (credentials are never read from files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    /// Key prefix within the bucket
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            prefix: String::new(),
        }
    }
}

/// Access credentials, supplied only through the environment.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    secret_access_key: String,
}

impl S3Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        S3Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Both values must be present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential(name))
        };
        Ok(S3Credentials {
            access_key_id: required("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
        })
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Object store selection and backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub kind: StoreKind,
    /// Base directory (for LocalFs store)
    pub local_path: Option<PathBuf>,
    pub s3: S3Config,
    /// Fault probabilities (for Simulated store)
    pub simulated: SimulatedStoreConfig,
    /// Deterministic per-key faults (for Simulated store)
    pub faults: FaultPlan,
    /// RNG seed (for Simulated store)
    pub seed: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            kind: StoreKind::Memory,
            local_path: None,
            s3: S3Config::default(),
            simulated: SimulatedStoreConfig::default(),
            faults: FaultPlan::default(),
            seed: 0,
        }
    }
}

/// Main configuration for a probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub bucket: String,
    pub start: u64,
    pub count: u64,
    /// Size of each synthetic object in bytes
    pub payload_size: usize,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub report_path: PathBuf,
    /// Compare every download with its fixture
    pub verify_content: bool,
    pub store: StoreConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            bucket: DEFAULT_BUCKET.to_string(),
            start: 0,
            count: DEFAULT_COUNT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            input_dir: PathBuf::from("probe-data/input"),
            output_dir: PathBuf::from("probe-data/output"),
            report_path: PathBuf::from("probe-report.json"),
            verify_content: true,
            store: StoreConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Create config for tests: in-memory store, small payloads, all paths
    /// under `root`.
    pub fn test(root: &Path, start: u64, count: u64) -> Self {
        ProbeConfig {
            bucket: "probe-test".to_string(),
            start,
            count,
            payload_size: 256,
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            report_path: root.join("report.json"),
            verify_content: true,
            store: StoreConfig::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Overlay `PROBE_*` (and `AWS_REGION`) environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("PROBE_BUCKET") {
            self.bucket = v;
        }
        if let Some(v) = lookup("PROBE_START") {
            self.start = parse_var("PROBE_START", &v)?;
        }
        if let Some(v) = lookup("PROBE_COUNT") {
            self.count = parse_var("PROBE_COUNT", &v)?;
        }
        if let Some(v) = lookup("PROBE_PAYLOAD_SIZE") {
            self.payload_size = parse_var("PROBE_PAYLOAD_SIZE", &v)?;
        }
        if let Some(v) = lookup("PROBE_INPUT_DIR") {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROBE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROBE_REPORT_PATH") {
            self.report_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROBE_VERIFY_CONTENT") {
            self.verify_content = parse_var("PROBE_VERIFY_CONTENT", &v)?;
        }
        if let Some(v) = lookup("PROBE_STORE_TYPE") {
            self.store.kind = v.parse()?;
        }
        if let Some(v) = lookup("PROBE_DATA_PATH") {
            self.store.local_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PROBE_SEED") {
            self.store.seed = parse_var("PROBE_SEED", &v)?;
        }
        if let Some(v) = lookup("PROBE_S3_PREFIX") {
            self.store.s3.prefix = v;
        }
        if let Some(v) = lookup("PROBE_S3_ENDPOINT") {
            self.store.s3.endpoint = Some(v);
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.store.s3.region = v;
        }
        Ok(())
    }

    /// The identifier range, validated
    pub fn range(&self) -> Result<RunRange, ConfigError> {
        RunRange::new(self.start, self.count)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if self.payload_size == 0 {
            return Err(ConfigError::ZeroPayloadSize);
        }
        self.range()?;
        match self.store.kind {
            StoreKind::LocalFs if self.store.local_path.is_none() => {
                Err(ConfigError::MissingLocalPath("localfs"))
            }
            StoreKind::S3 if !cfg!(feature = "s3") => Err(ConfigError::S3NotEnabled),
            _ => Ok(()),
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}
