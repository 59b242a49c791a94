//! Endpoint listener with connection limits.
//!
//! # Responsibilities
//! - Bind to a configured endpoint
//! - Accept incoming TCP connections, blocking or as a non-blocking poll
//! - Enforce max_connections via a semaphore shared by all endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::net::endpoint::EndpointUrl;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to the endpoint.
    Bind(String, std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(endpoint, e) => write!(f, "Failed to bind {}: {}", endpoint, e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(_, e) | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// A TCP listener serving one endpoint.
pub struct EndpointListener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Endpoint this listener was bound for.
    endpoint: EndpointUrl,
    /// Resolved local address (port 0 replaced by the kernel's choice).
    local_addr: SocketAddr,
}

impl EndpointListener {
    /// Bind to the endpoint's host and port.
    pub async fn bind(endpoint: &EndpointUrl) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind((endpoint.host(), endpoint.port()))
            .await
            .map_err(|e| ListenerError::Bind(endpoint.to_string(), e))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ListenerError::Bind(endpoint.to_string(), e))?;

        tracing::info!(
            endpoint = %endpoint,
            address = %local_addr,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            endpoint: endpoint.clone(),
            local_addr,
        })
    }

    /// Wait for the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        self.inner.accept().await.map_err(ListenerError::Accept)
    }

    /// Accept a connection only if one is ready right now.
    ///
    /// `TcpListener::accept` is cancel safe, so dropping the unfinished
    /// future loses nothing.
    pub fn try_accept(&self) -> Option<Result<(TcpStream, SocketAddr), ListenerError>> {
        self.inner
            .accept()
            .now_or_never()
            .map(|res| res.map_err(ListenerError::Accept))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &EndpointUrl {
        &self.endpoint
    }
}

/// Connection slots shared by every listener of a server.
#[derive(Debug, Clone)]
pub struct ConnectionLimit {
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl ConnectionLimit {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<ConnectionPermit> {
        self.slots
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
