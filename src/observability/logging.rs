//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Events go to stderr so stdout stays free for operator messages
//! - Level from `RUST_LOG`, falling back to the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    format!("opcua_lite={level},warn")
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into());

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
