//! Worker configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `BATCH_SIZE`: maximum messages per batch (default: `100`)
/// - `BATCH_WINDOW_MS`: how long a batch may wait to fill up (default: `500`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `METRICS_ADDR`: Prometheus listener address (default: `"0.0.0.0:9000"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
#[derive(Debug, Clone)]
pub struct Config {
    pub batch_size: usize,
    pub batch_window: Duration,
    pub database_url: Option<String>,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            batch_size: lookup("BATCH_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.batch_size),
            batch_window: lookup("BATCH_WINDOW_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_window),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            metrics_addr: lookup("METRICS_ADDR")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_addr),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_window: Duration::from_millis(500),
            database_url: None,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
