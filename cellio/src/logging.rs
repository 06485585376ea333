//! `tracing` subscriber setup for binaries built on cellio.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ENV_LOG;

/// Installs a global fmt subscriber.
///
/// `CELLIO_LOG` takes precedence over `default_filter`. Calling this more than once is harmless;
/// later calls leave the first subscriber in place.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry().with(fmt::layer()).with(filter).try_init();
}
