//! Client connection state and non-blocking I/O.
//!
//! # Responsibilities
//! - Own the socket, buffers and connection slot of one client
//! - Read whatever is available without blocking, within a per-call budget
//! - Feed each chunk of input to the protocol handler as it arrives
//! - Flush replies, keeping unsent bytes for the next iteration
//!
//! # Teardown
//! ```text
//! protocol Closed ──(peer EOF / socket error)──────────────▶ Done
//!        └──(replies flushed)──▶ write half shut down ──▶ Draining ──(EOF / limit / deadline)──▶ Done
//! ```
//! Draining discards input so the peer reads our final reply before the
//! socket is dropped.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncWriteExt, Interest, Ready};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::LimitsConfig;
use crate::net::frame::MessageType;
use crate::net::handshake::{Handshake, ProtocolState};
use crate::net::listener::ConnectionPermit;

/// Largest single socket read.
const READ_CHUNK: usize = 16 * 1024;

/// Input discarded after our side has finished before the socket is dropped.
const DRAIN_LIMIT: usize = 1024 * 1024;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Unique identifier for a connection within one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Open,
    Draining { until: Instant, discarded: usize },
    Done,
}

enum ReadOutcome {
    Data(usize),
    WouldBlock,
    Closed,
}

/// A connected client.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    protocol: Handshake,
    inbound: BytesMut,
    outbound: BytesMut,
    teardown: Teardown,
    bytes_received: u64,
    _permit: ConnectionPermit,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        permit: ConnectionPermit,
        limits: &LimitsConfig,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }
        Self {
            id,
            stream,
            peer_addr,
            protocol: Handshake::new(limits),
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::new(),
            teardown: Teardown::Open,
            bytes_received: 0,
            _permit: permit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ProtocolState {
        self.protocol.state()
    }

    /// The socket can be dropped.
    pub fn is_closed(&self) -> bool {
        self.teardown == Teardown::Done
    }

    /// Bytes waiting for the rest of their chunk.
    pub fn buffered_input(&self) -> usize {
        self.inbound.len()
    }

    /// Total bytes read from the socket, discarded input included.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Read, process and flush without blocking.
    ///
    /// At most one chunk limit's worth of bytes is read per call, and the
    /// buffered input never exceeds that limit. Socket errors close this
    /// connection only; they are never returned.
    pub fn service(&mut self, limits: &LimitsConfig) -> Vec<MessageType> {
        let mut messages = Vec::new();
        let mut budget = self.protocol.max_chunk_size() as usize;

        while self.protocol.accepts_input() && budget > 0 {
            let room = (self.protocol.max_chunk_size() as usize).saturating_sub(self.inbound.len());
            let want = room.min(READ_CHUNK).min(budget);
            if want == 0 {
                break;
            }
            match self.read(want) {
                ReadOutcome::Data(n) => {
                    budget -= n;
                    let processed = self.protocol.process(&mut self.inbound, &mut self.outbound, limits);
                    messages.extend(processed.messages);
                }
                ReadOutcome::WouldBlock => break,
                ReadOutcome::Closed => return messages,
            }
        }

        if !self.outbound.is_empty() && self.teardown == Teardown::Open {
            self.flush();
        }
        if self.outbound.is_empty() {
            self.protocol.on_flushed();
        }
        if self.protocol.state() == ProtocolState::Closed && self.teardown == Teardown::Open {
            self.start_drain();
        }
        if matches!(self.teardown, Teardown::Draining { .. }) {
            self.drain(budget);
        }
        messages
    }

    fn read(&mut self, want: usize) -> ReadOutcome {
        self.inbound.reserve(want);
        loop {
            match self.stream.try_read_buf(&mut (&mut self.inbound).limit(want)) {
                Ok(0) => {
                    tracing::debug!(connection_id = %self.id, "Peer closed connection");
                    self.finish();
                    return ReadOutcome::Closed;
                }
                Ok(n) => {
                    self.bytes_received += n as u64;
                    return ReadOutcome::Data(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::WouldBlock,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(connection_id = %self.id, error = %e, "Read failed, closing connection");
                    self.finish();
                    return ReadOutcome::Closed;
                }
            }
        }
    }

    fn flush(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => {
                    self.finish();
                    return;
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(connection_id = %self.id, error = %e, "Write failed, closing connection");
                    self.finish();
                    return;
                }
            }
        }
    }

    /// Send FIN after our last reply, then discard input until the peer closes.
    fn start_drain(&mut self) {
        match AsyncWriteExt::shutdown(&mut self.stream).now_or_never() {
            Some(Ok(())) => {
                tracing::trace!(connection_id = %self.id, "Write side closed, draining input");
                self.inbound.clear();
                self.teardown = Teardown::Draining {
                    until: Instant::now() + DRAIN_TIMEOUT,
                    discarded: 0,
                };
            }
            Some(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Shutdown failed");
                self.teardown = Teardown::Done;
            }
            None => self.teardown = Teardown::Done,
        }
    }

    fn drain(&mut self, mut budget: usize) {
        while let Teardown::Draining { until, discarded } = self.teardown {
            if discarded >= DRAIN_LIMIT || Instant::now() >= until {
                self.teardown = Teardown::Done;
                return;
            }
            if budget == 0 {
                return;
            }
            match self.read(READ_CHUNK.min(budget)) {
                ReadOutcome::Data(n) => {
                    self.inbound.clear();
                    budget -= n;
                    self.teardown = Teardown::Draining {
                        until,
                        discarded: discarded + n,
                    };
                }
                ReadOutcome::WouldBlock | ReadOutcome::Closed => return,
            }
        }
    }

    fn finish(&mut self) {
        self.protocol.close();
        self.inbound.clear();
        self.teardown = Teardown::Done;
    }

    /// Wait until the socket can make progress.
    ///
    /// Interest includes writability only while replies are pending, and
    /// readability only while input is still read.
    pub async fn ready(&self) -> io::Result<Ready> {
        let reading = self.protocol.accepts_input() || matches!(self.teardown, Teardown::Draining { .. });
        let interest = match (reading, self.outbound.is_empty()) {
            (true, true) => Interest::READABLE,
            (true, false) => Interest::READABLE | Interest::WRITABLE,
            (false, _) => Interest::WRITABLE,
        };
        self.stream.ready(interest).await
    }
}
