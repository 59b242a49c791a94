//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler, transport, runner produce:
//!     → tracing events (structured fields, stderr via logging.rs)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Log aggregation (stderr)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until an exporter is installed
//! - `RUST_LOG` overrides the configured level

pub mod logging;
pub mod metrics;
