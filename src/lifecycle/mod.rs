//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → background task → RunningFlag cleared
//!
//! Run loop (runner.rs):
//!     while flag set: iterate(wait) → on I/O error: back off, count
//!     loop exit → shutdown() exactly once
//! ```
//!
//! # Design Decisions
//! - The flag is passed explicitly; there is no global state
//! - Clearing the flag never interrupts an iteration in progress
//! - Too many consecutive I/O errors abort the loop with the last error

pub mod runner;
pub mod signals;

pub use runner::{run, RunSummary};
pub use signals::{RunningFlag, SignalLatch};
