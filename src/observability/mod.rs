//! Structured logging setup shared by the binary and the test harnesses.

mod config;

pub use config::LogConfig;

use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over [`LogConfig::default_filter`]. Fails if a global
/// subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), InitError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter)?,
    };

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .with_target(false)
            .try_init()?;
    }
    Ok(())
}

/// Best-effort subscriber for tests; a second call is a no-op.
pub fn init_test_tracing() {
    let _ = init_tracing(&LogConfig::test());
}
