//! Minimal OPC UA server library.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT/SIGTERM ──▶ lifecycle::signals ──▶ RunningFlag
//!                                                  │
//!                                                  ▼
//!   config ──▶ server::Server ◀── lifecycle::runner (iterate until cleared)
//!                  │
//!                  ├── scheduler (timer queue, bounded waits)
//!                  ├── net (listeners, connections, UA TCP handshake)
//!                  └── address_space (namespaces, nodes, values)
//! ```

pub mod address_space;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod scheduler;
pub mod server;

pub use config::schema::ServerConfig;
pub use error::ServerError;
pub use lifecycle::{RunningFlag, SignalLatch};
pub use scheduler::{IterationResult, TimerId};
pub use server::{Server, ServerState};
