//! Logging configuration
//!
//! Loaded from environment variables only, so it is in place before the
//! probe configuration is parsed.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | RUST_LOG | info | `tracing_subscriber::EnvFilter` directives |
//! | PROBE_LOG_JSON | false | Emit one JSON object per log line |
//! | PROBE_LOG_ANSI | true | Colour output (plain format only) |

/// Logging configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
    /// JSON lines instead of the human-readable format
    pub json: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            default_filter: "info".to_string(),
            json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = LogConfig::default();
        LogConfig {
            default_filter: defaults.default_filter,
            json: lookup("PROBE_LOG_JSON")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.json),
            ansi: lookup("PROBE_LOG_ANSI")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.ansi),
        }
    }

    /// Quiet config for tests: warnings only, no colour
    pub fn test() -> Self {
        LogConfig {
            default_filter: "warn".to_string(),
            json: false,
            ansi: false,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}
