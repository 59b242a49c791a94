//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Iteration fails with an I/O error:
//!     → runner counts the consecutive failure
//!     → backoff.rs (exponential delay with jitter)
//!     → next iteration, or abort past the configured limit
//! ```

pub mod backoff;

pub use backoff::{backoff_delay, calculate_backoff};
