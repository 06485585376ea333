//! Runtime configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding the Prometheus listener address.
pub const ENV_METRICS_ADDR: &str = "CELLIO_METRICS_ADDR";
/// Environment variable holding the shutdown timeout in (fractional) seconds.
pub const ENV_SHUTDOWN_TIMEOUT: &str = "CELLIO_SHUTDOWN_TIMEOUT";
/// Environment variable holding the per-actor event buffer size.
pub const ENV_EVENT_CAPACITY: &str = "CELLIO_EVENT_CAPACITY";
/// Environment variable holding the `tracing` filter directive.
pub const ENV_LOG: &str = "CELLIO_LOG";

/// Settings for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Serve Prometheus metrics on this address when set.
    pub metrics_addr: Option<SocketAddr>,
    /// How long [`Actor::terminate`](crate::Actor::terminate) waits for the actor thread to exit.
    pub shutdown_timeout: Duration,
    /// Number of readiness events each actor drains per reactor turn.
    pub event_capacity: usize,
    /// Filter directive handed to [`logging::init`](crate::logging::init).
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_addr: None,
            shutdown_timeout: Duration::from_secs(10),
            event_capacity: 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Builds a configuration from `CELLIO_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_METRICS_ADDR) {
            let addr = raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("{ENV_METRICS_ADDR}={raw}: {e}")))?;
            config.metrics_addr = Some(addr);
        }

        if let Some(raw) = lookup(ENV_SHUTDOWN_TIMEOUT) {
            let secs = raw
                .trim()
                .parse::<f64>()
                .map_err(|e| Error::Config(format!("{ENV_SHUTDOWN_TIMEOUT}={raw}: {e}")))?;
            config.shutdown_timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("{ENV_SHUTDOWN_TIMEOUT}={raw}: {e}")))?;
        }

        if let Some(raw) = lookup(ENV_EVENT_CAPACITY) {
            let capacity = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("{ENV_EVENT_CAPACITY}={raw}: {e}")))?;
            if capacity == 0 {
                return Err(Error::Config(format!("{ENV_EVENT_CAPACITY} must be positive")));
            }
            config.event_capacity = capacity;
        }

        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }

        Ok(config)
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables the Prometheus exporter on `addr`.
    pub fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }
}
