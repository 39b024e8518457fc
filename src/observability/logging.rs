//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level at runtime
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level
//! - The library only emits events; binaries decide whether to install a subscriber

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used by [`init`].
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("resilient_client={level}")))
}

/// Install the global tracing subscriber. Repeated calls are no-ops.
pub fn init(level: &str) {
    let installed = tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_ok() {
        tracing::debug!(level = %level, "Logging initialized");
    }
}
