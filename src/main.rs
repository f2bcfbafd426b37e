//! Read-after-write consistency probe
//!
//! Writes `count` synthetic objects starting at `start`, reads each one back
//! right after its upload, and reports every write and read failure.
//!
//! Configuration is layered: defaults, `--config <file.toml>`, `PROBE_*`
//! environment variables (see `raw_probe::config`), then the flags below.
//! Logging is controlled by `RUST_LOG` and `PROBE_LOG_JSON`.

use clap::Parser;
use raw_probe::observability::{init_tracing, LogConfig};
use raw_probe::{open_store, Probe, ProbeConfig, StoreKind};
use std::path::PathBuf;
use tracing::{error, info};

/// Object storage read-after-write probe
#[derive(Parser, Debug)]
#[command(name = "raw-probe")]
#[command(about = "Write objects, read each back immediately, report failures", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target bucket
    #[arg(long)]
    bucket: Option<String>,

    /// First object identifier
    #[arg(long)]
    start: Option<u64>,

    /// Number of objects to write
    #[arg(long)]
    count: Option<u64>,

    /// Store backend: memory, localfs, simulated or s3
    #[arg(long)]
    store: Option<StoreKind>,

    /// Base directory for the localfs store
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Bytes per synthetic object
    #[arg(long)]
    payload_size: Option<usize>,

    /// Where to write the JSON report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Skip comparing downloads with the uploaded payloads
    #[arg(long)]
    no_verify: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ProbeConfig, raw_probe::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ProbeConfig::from_file(path)?,
            None => ProbeConfig::default(),
        };
        config.apply_env()?;

        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(kind) = self.store {
            config.store.kind = kind;
        }
        if let Some(path) = &self.data_path {
            config.store.local_path = Some(path.clone());
        }
        if let Some(size) = self.payload_size {
            config.payload_size = size;
        }
        if let Some(report) = &self.report {
            config.report_path = report.clone();
        }
        if self.no_verify {
            config.verify_content = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(&LogConfig::from_env())?;
    let cli = Cli::parse();

    let config = cli.load_config().map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;
    let store = open_store(&config).map_err(|e| {
        error!(error = %e, "failed to open object store");
        e
    })?;

    let report = Probe::from_config(&config, store)?.run().await?;
    report.write_to(&config.report_path).await?;
    info!(path = %config.report_path.display(), "{}", report.summary());

    println!("Write failures: {}", report.write_failure_count);
    println!("Read failures:  {}", report.read_failure_count);

    Ok(())
}
