//! Server error type.

use std::io;

use thiserror::Error;

use crate::address_space::AddressSpaceError;
use crate::net::listener::ListenerError;
use crate::server::ServerState;

/// Errors returned by [`Server`](crate::server::Server) operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Allocating a resource failed at startup: binding a socket, parsing an
    /// endpoint or installing a signal handler.
    #[error("failed to allocate {resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// Listener fault during an iteration. The handle stays usable.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },

    #[error("invalid node definition: {0}")]
    AddressSpace(#[from] AddressSpaceError),
}

impl ServerError {
    pub fn resource(resource: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            resource: resource.into(),
            source,
        }
    }
}

impl From<ListenerError> for ServerError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Bind(addr, source) => Self::resource(format!("listener on {addr}"), source),
            ListenerError::Accept(source) => Self::Io(source),
        }
    }
}
