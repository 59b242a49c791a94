//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind per endpoint, connection limits)
//!     → connection.rs (bounded BytesMut buffers, non-blocking read/write)
//!     → handshake.rs (UA TCP Hello/Acknowledge state machine)
//!     → frame.rs (UaTcpCodec: tokio-util Decoder/Encoder)
//!
//! Connection States:
//!     AwaitingHello → Established → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - transport.rs owns every socket; only the scheduler drives it
//! - Connections are polled, never given their own task
//! - A full connection table leaves new clients in the kernel backlog
//! - Input is processed after every read, so no connection buffers more
//!   than one chunk

pub mod connection;
pub mod endpoint;
pub mod frame;
pub mod handshake;
pub mod listener;
pub mod transport;

pub use endpoint::{EndpointError, EndpointUrl};
pub use transport::{IoActivity, Transport};
