//! UA TCP connection protocol state machine.
//!
//! # States
//! ```text
//! AwaitingHello ──HEL──▶ Established
//!       │                     │
//!       └──── any error ──────┴──▶ Closing (ERR queued) ──flushed──▶ Closed
//!                             └──CLO──▶ Closing ──flushed──▶ Closed
//! ```
//!
//! Pure byte-in/byte-out logic so it can be exercised without sockets.
//! Secure channels are not supported: `OPN`/`MSG` are answered with
//! `Bad_ServiceUnsupported`.
//!
//! Before the Hello, chunks are limited by our configured receive buffer.
//! Afterwards the limit is the negotiated receive buffer size.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::LimitsConfig;
use crate::net::frame::{
    status, Acknowledge, ErrorMessage, Frame, Hello, MessageBody, MessageType, UaTcpCodec, MIN_BUFFER_SIZE,
};

/// Protocol version this server speaks.
pub const PROTOCOL_VERSION: u32 = 0;

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Connected, waiting for the client Hello.
    AwaitingHello,
    /// Hello acknowledged.
    Established,
    /// No more input is read; close once queued replies are flushed.
    Closing,
    /// No further traffic.
    Closed,
}

/// Buffer sizes agreed during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

/// Messages handled by one call to [`Handshake::process`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Processed {
    pub messages: Vec<MessageType>,
}

/// Per-connection protocol handler.
#[derive(Debug)]
pub struct Handshake {
    state: ProtocolState,
    negotiated: Option<Negotiated>,
    endpoint_url: Option<String>,
    codec: UaTcpCodec,
}

impl Handshake {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            state: ProtocolState::AwaitingHello,
            negotiated: None,
            endpoint_url: None,
            codec: UaTcpCodec::new(limits.receive_buffer_size),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn negotiated(&self) -> Option<Negotiated> {
        self.negotiated
    }

    /// Endpoint URL the client asked for in its Hello.
    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    /// Largest chunk the peer may currently send.
    pub fn max_chunk_size(&self) -> u32 {
        self.codec.max_chunk_size()
    }

    /// Whether more input should be read.
    pub fn accepts_input(&self) -> bool {
        matches!(self.state, ProtocolState::AwaitingHello | ProtocolState::Established)
    }

    /// Mark the connection closed (peer went away or the write side failed).
    pub fn close(&mut self) {
        self.state = ProtocolState::Closed;
    }

    /// Called once the outbound buffer is empty.
    pub fn on_flushed(&mut self) {
        if self.state == ProtocolState::Closing {
            self.state = ProtocolState::Closed;
        }
    }

    /// Consume every complete message in `inbound`, appending replies to `outbound`.
    ///
    /// Incomplete trailing data is left in `inbound` for the next call. Once
    /// input is no longer accepted the rest of `inbound` is discarded.
    pub fn process(&mut self, inbound: &mut BytesMut, outbound: &mut BytesMut, limits: &LimitsConfig) -> Processed {
        let mut processed = Processed::default();

        while self.accepts_input() {
            match self.codec.decode(inbound) {
                Ok(Some(frame)) => {
                    processed.messages.push(frame.header.message_type);
                    self.handle(frame, outbound, limits);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Rejecting malformed frame");
                    self.fail(outbound, ErrorMessage::new(e.status_code(), e.to_string()));
                }
            }
        }

        if !self.accepts_input() {
            inbound.clear();
        }
        processed
    }

    fn handle(&mut self, frame: Frame, outbound: &mut BytesMut, limits: &LimitsConfig) {
        match (self.state, frame.header.message_type) {
            (_, MessageType::CloseChannel) => {
                tracing::debug!("Close requested by peer");
                self.state = ProtocolState::Closing;
            }
            (ProtocolState::AwaitingHello, MessageType::Hello) => match Hello::decode(&frame.body) {
                Ok(hello) if hello.receive_buffer_size < MIN_BUFFER_SIZE || hello.send_buffer_size < MIN_BUFFER_SIZE => {
                    self.fail(
                        outbound,
                        ErrorMessage::new(
                            status::BAD_CONNECTION_REJECTED,
                            format!("buffer sizes must be at least {MIN_BUFFER_SIZE} bytes"),
                        ),
                    );
                }
                Ok(hello) => self.acknowledge(hello, outbound, limits),
                Err(e) => self.fail(outbound, ErrorMessage::new(e.status_code(), e.to_string())),
            },
            (ProtocolState::Established, MessageType::OpenChannel | MessageType::Message) => {
                self.fail(
                    outbound,
                    ErrorMessage::new(status::BAD_SERVICE_UNSUPPORTED, "secure channels are not supported"),
                );
            }
            (_, other) => {
                self.fail(
                    outbound,
                    ErrorMessage::new(
                        status::BAD_TCP_MESSAGE_TYPE_INVALID,
                        format!("unexpected {} message", other.as_str()),
                    ),
                );
            }
        }
    }

    fn acknowledge(&mut self, hello: Hello, outbound: &mut BytesMut, limits: &LimitsConfig) {
        // Our receive buffer is bounded by what the client can send and vice versa.
        let negotiated = Negotiated {
            receive_buffer_size: limits.receive_buffer_size.min(hello.send_buffer_size),
            send_buffer_size: limits.send_buffer_size.min(hello.receive_buffer_size),
            max_message_size: limits.max_message_size,
            max_chunk_count: limits.max_chunk_count,
        };
        let ack = Acknowledge {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: negotiated.receive_buffer_size,
            send_buffer_size: negotiated.send_buffer_size,
            max_message_size: negotiated.max_message_size,
            max_chunk_count: negotiated.max_chunk_count,
        };
        if !self.write(ack, outbound) {
            return;
        }

        tracing::debug!(
            client_protocol_version = hello.protocol_version,
            endpoint_url = hello.endpoint_url.as_deref().unwrap_or(""),
            receive_buffer_size = negotiated.receive_buffer_size,
            send_buffer_size = negotiated.send_buffer_size,
            "Hello acknowledged"
        );
        self.codec.set_max_chunk_size(negotiated.receive_buffer_size);
        self.negotiated = Some(negotiated);
        self.endpoint_url = hello.endpoint_url;
        self.state = ProtocolState::Established;
    }

    fn fail(&mut self, outbound: &mut BytesMut, error: ErrorMessage) {
        if self.write(error, outbound) {
            self.state = ProtocolState::Closing;
        }
    }

    /// Queue a reply; a reply that cannot be encoded closes the connection.
    fn write<M: MessageBody>(&mut self, message: M, outbound: &mut BytesMut) -> bool {
        match self.codec.encode(message, outbound) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(message_type = M::MESSAGE_TYPE.as_str(), error = %e, "Failed to encode reply");
                self.state = ProtocolState::Closed;
                false
            }
        }
    }
}
