//! Listener and connection set driven by the iteration scheduler.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::select_all;
use tokio::net::TcpStream;

use crate::config::LimitsConfig;
use crate::net::connection::{Connection, ConnectionId};
use crate::net::endpoint::EndpointUrl;
use crate::net::listener::{ConnectionLimit, EndpointListener, ListenerError};
use crate::observability::metrics;

/// What one I/O pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoActivity {
    pub accepted: usize,
    pub closed: usize,
    pub messages: usize,
}

impl IoActivity {
    pub fn is_idle(&self) -> bool {
        self.accepted == 0 && self.closed == 0 && self.messages == 0
    }

    pub fn merge(&mut self, other: IoActivity) {
        self.accepted += other.accepted;
        self.closed += other.closed;
        self.messages += other.messages;
    }
}

enum Wake {
    Accepted(Result<(TcpStream, SocketAddr), ListenerError>),
    Ready,
    Timeout,
}

/// Owns every socket of a server.
pub struct Transport {
    listeners: Vec<EndpointListener>,
    connections: Vec<Connection>,
    limits: LimitsConfig,
    connection_limit: ConnectionLimit,
    next_connection_id: u64,
}

impl Transport {
    /// Bind every endpoint; on failure the already bound listeners are dropped.
    pub async fn bind(endpoints: &[EndpointUrl], limits: LimitsConfig) -> Result<Self, ListenerError> {
        let mut listeners = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            listeners.push(EndpointListener::bind(endpoint).await?);
        }
        Ok(Self {
            listeners,
            connections: Vec::new(),
            connection_limit: ConnectionLimit::new(limits.max_connections),
            limits,
            next_connection_id: 1,
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Service listeners and connections without blocking.
    ///
    /// Only a listener failure is returned; connections admitted before the
    /// failure stay registered.
    pub fn poll(&mut self) -> Result<IoActivity, ListenerError> {
        let mut activity = IoActivity::default();

        for idx in 0..self.listeners.len() {
            while self.connection_limit.available() > 0 {
                match self.listeners[idx].try_accept() {
                    Some(Ok((stream, peer))) => {
                        if self.admit(stream, peer) {
                            activity.accepted += 1;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }

        for conn in &mut self.connections {
            for message_type in conn.service(&self.limits) {
                metrics::record_message(message_type.as_str());
                activity.messages += 1;
            }
        }

        let before = self.connections.len();
        self.connections.retain(|conn| {
            if conn.is_closed() {
                tracing::debug!(connection_id = %conn.id(), peer_addr = %conn.peer_addr(), "Connection closed");
            }
            !conn.is_closed()
        });
        activity.closed = before - self.connections.len();

        if activity.accepted > 0 || activity.closed > 0 {
            metrics::set_active_connections(self.connections.len());
        }
        Ok(activity)
    }

    /// Block until a listener or connection is ready, or `timeout` elapses.
    ///
    /// A connection accepted while waiting is admitted before returning and
    /// counted in the returned activity; readable data is left for `poll`.
    pub async fn wait(&mut self, timeout: Duration) -> Result<IoActivity, ListenerError> {
        let accepting = self.connection_limit.available() > 0 && !self.listeners.is_empty();

        let wake = {
            let listeners = &self.listeners;
            let connections = &self.connections;

            let accept_any = async {
                if !accepting {
                    return std::future::pending().await;
                }
                let (res, _, _) = select_all(listeners.iter().map(|l| Box::pin(l.accept()))).await;
                res
            };
            let ready_any = async {
                if connections.is_empty() {
                    return std::future::pending::<()>().await;
                }
                let _ = select_all(connections.iter().map(|c| Box::pin(c.ready()))).await;
            };

            tokio::select! {
                res = accept_any => Wake::Accepted(res),
                _ = ready_any => Wake::Ready,
                _ = tokio::time::sleep(timeout) => Wake::Timeout,
            }
        };

        let mut activity = IoActivity::default();
        match wake {
            Wake::Accepted(Ok((stream, peer))) => {
                if self.admit(stream, peer) {
                    activity.accepted = 1;
                    metrics::set_active_connections(self.connections.len());
                }
            }
            Wake::Accepted(Err(e)) => return Err(e),
            Wake::Ready => tracing::trace!("Connection ready"),
            Wake::Timeout => {}
        }
        Ok(activity)
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) -> bool {
        let Some(permit) = self.connection_limit.try_acquire() else {
            tracing::warn!(peer_addr = %peer, "Connection limit reached, dropping connection");
            return false;
        };
        let id = ConnectionId::new(self.next_connection_id);
        self.next_connection_id += 1;

        tracing::debug!(
            connection_id = %id,
            peer_addr = %peer,
            available_slots = self.connection_limit.available(),
            "Connection accepted"
        );
        metrics::record_connection_accepted();
        self.connections.push(Connection::new(id, stream, peer, permit, &self.limits));
        true
    }

    /// Drop every connection and listener.
    pub fn close_all(&mut self) {
        let open = self.connections.len();
        self.connections.clear();
        self.listeners.clear();
        metrics::set_active_connections(0);
        tracing::debug!(closed_connections = open, "Transport closed");
    }
}
