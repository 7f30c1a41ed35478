//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with default configuration
///
/// `RUST_LOG` takes precedence; otherwise `info` is used.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a fallback filter used when `RUST_LOG` is unset
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing_with_default(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
