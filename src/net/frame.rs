//! UA TCP message framing.
//!
//! Every message starts with an 8-byte header:
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |    message type (ASCII, 3 bytes)  | chunk  |  message size (u32 LE)    |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//! The size covers the header itself. Integers in bodies are little-endian,
//! strings are an i32 length (-1 = null) followed by UTF-8 bytes.
//!
//! [`UaTcpCodec`] splits a byte stream into [`Frame`]s and writes any
//! [`MessageBody`] with its header.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Length of the fixed message header.
pub const HEADER_LEN: usize = 8;

/// Smallest buffer size a UA TCP peer may announce.
pub const MIN_BUFFER_SIZE: u32 = 8192;

/// Longest endpoint URL a Hello may carry.
pub const MAX_ENDPOINT_URL_LEN: usize = 4096;

/// Chunk byte for final (single-chunk) messages.
pub const CHUNK_FINAL: u8 = b'F';

/// Status codes sent in Error messages.
pub mod status {
    pub const BAD_DECODING_ERROR: u32 = 0x8007_0000;
    pub const BAD_SERVICE_UNSUPPORTED: u32 = 0x800B_0000;
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: u32 = 0x807E_0000;
    pub const BAD_TCP_MESSAGE_TOO_LARGE: u32 = 0x8080_0000;
    pub const BAD_TCP_ENDPOINT_URL_INVALID: u32 = 0x8083_0000;
    pub const BAD_CONNECTION_REJECTED: u32 = 0x80AC_0000;
}

/// UA TCP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Acknowledge,
    Error,
    ReverseHello,
    Message,
    OpenChannel,
    CloseChannel,
}

impl MessageType {
    pub fn from_bytes(bytes: [u8; 3]) -> Option<Self> {
        match &bytes {
            b"HEL" => Some(Self::Hello),
            b"ACK" => Some(Self::Acknowledge),
            b"ERR" => Some(Self::Error),
            b"RHE" => Some(Self::ReverseHello),
            b"MSG" => Some(Self::Message),
            b"OPN" => Some(Self::OpenChannel),
            b"CLO" => Some(Self::CloseChannel),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8; 3] {
        match self {
            Self::Hello => b"HEL",
            Self::Acknowledge => b"ACK",
            Self::Error => b"ERR",
            Self::ReverseHello => b"RHE",
            Self::Message => b"MSG",
            Self::OpenChannel => b"OPN",
            Self::CloseChannel => b"CLO",
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Acknowledge => "acknowledge",
            Self::Error => "error",
            Self::ReverseHello => "reverse_hello",
            Self::Message => "message",
            Self::OpenChannel => "open_channel",
            Self::CloseChannel => "close_channel",
        }
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub chunk_type: u8,
    /// Total size including the header.
    pub size: u32,
}

impl FrameHeader {
    pub fn body_len(&self) -> usize {
        self.size as usize - HEADER_LEN
    }
}

/// Framing and body decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown message type {0:?}")]
    UnknownType([u8; 3]),

    #[error("message size {size} exceeds limit {limit}")]
    TooLarge { size: u32, limit: u32 },

    #[error("message size {0} is smaller than the header")]
    TooSmall(u32),

    #[error("body truncated while reading {0}")]
    Truncated(&'static str),

    #[error("endpoint url is invalid")]
    InvalidEndpointUrl,

    #[error("I/O error: {0}")]
    Io(io::ErrorKind),
}

impl DecodeError {
    /// Status code reported to the peer for this failure.
    pub fn status_code(&self) -> u32 {
        match self {
            DecodeError::UnknownType(_) => status::BAD_TCP_MESSAGE_TYPE_INVALID,
            DecodeError::TooLarge { .. } | DecodeError::TooSmall(_) => {
                status::BAD_TCP_MESSAGE_TOO_LARGE
            }
            DecodeError::Truncated(_) | DecodeError::Io(_) => status::BAD_DECODING_ERROR,
            DecodeError::InvalidEndpointUrl => status::BAD_TCP_ENDPOINT_URL_INVALID,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        DecodeError::Io(err.kind())
    }
}

/// Decode a header from the front of `buf`.
///
/// Returns `Ok(None)` until at least [`HEADER_LEN`] bytes are buffered.
pub fn decode_header(buf: &[u8], max_size: u32) -> Result<Option<FrameHeader>, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let type_bytes = [buf[0], buf[1], buf[2]];
    let message_type = MessageType::from_bytes(type_bytes).ok_or(DecodeError::UnknownType(type_bytes))?;
    let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if (size as usize) < HEADER_LEN {
        return Err(DecodeError::TooSmall(size));
    }
    if size > max_size {
        return Err(DecodeError::TooLarge { size, limit: max_size });
    }
    Ok(Some(FrameHeader {
        message_type,
        chunk_type: buf[3],
        size,
    }))
}

/// One complete chunk taken off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

/// Body of a message type this crate reads or writes.
pub trait MessageBody: Sized {
    const MESSAGE_TYPE: MessageType;

    fn encode_body(&self, dst: &mut BytesMut);

    fn decode_body<B: Buf>(src: &mut B) -> Result<Self, DecodeError>;
}

/// Stream codec for UA TCP chunks.
///
/// The header is checked as soon as eight bytes are buffered, so an oversized
/// chunk is rejected before its body arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UaTcpCodec {
    max_chunk_size: u32,
}

impl UaTcpCodec {
    pub fn new(max_chunk_size: u32) -> Self {
        Self { max_chunk_size }
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Apply the chunk size agreed in the handshake.
    pub fn set_max_chunk_size(&mut self, max_chunk_size: u32) {
        self.max_chunk_size = max_chunk_size;
    }
}

impl Decoder for UaTcpCodec {
    type Item = Frame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, DecodeError> {
        let Some(header) = decode_header(src, self.max_chunk_size)? else {
            return Ok(None);
        };

        let size = header.size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut chunk = src.split_to(size);
        chunk.advance(HEADER_LEN);
        Ok(Some(Frame {
            header,
            body: chunk.freeze(),
        }))
    }
}

impl<M: MessageBody> Encoder<M> for UaTcpCodec {
    type Error = DecodeError;

    fn encode(&mut self, item: M, dst: &mut BytesMut) -> Result<(), DecodeError> {
        let start = dst.len();
        dst.put_slice(M::MESSAGE_TYPE.as_bytes());
        dst.put_u8(CHUNK_FINAL);
        dst.put_u32_le(0);
        item.encode_body(dst);

        let size = dst.len() - start;
        if size > self.max_chunk_size as usize {
            dst.truncate(start);
            return Err(DecodeError::TooLarge {
                size: size as u32,
                limit: self.max_chunk_size,
            });
        }
        dst[start + 4..start + HEADER_LEN].copy_from_slice(&(size as u32).to_le_bytes());
        Ok(())
    }
}

/// Prefix `body` with a final-chunk header of the given type.
pub fn encode_frame(message_type: MessageType, body: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_LEN + body.len());
    dst.put_slice(message_type.as_bytes());
    dst.put_u8(CHUNK_FINAL);
    dst.put_u32_le((HEADER_LEN + body.len()) as u32);
    dst.put_slice(body);
}

fn get_u32<B: Buf>(src: &mut B, field: &'static str) -> Result<u32, DecodeError> {
    if src.remaining() < 4 {
        return Err(DecodeError::Truncated(field));
    }
    Ok(src.get_u32_le())
}

fn get_string<B: Buf>(src: &mut B, field: &'static str, max_len: usize) -> Result<Option<String>, DecodeError> {
    if src.remaining() < 4 {
        return Err(DecodeError::Truncated(field));
    }
    let len = src.get_i32_le();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if len > max_len {
        return Err(DecodeError::InvalidEndpointUrl);
    }
    if src.remaining() < len {
        return Err(DecodeError::Truncated(field));
    }
    String::from_utf8(src.copy_to_bytes(len).to_vec())
        .map(Some)
        .map_err(|_| DecodeError::InvalidEndpointUrl)
}

fn put_string(dst: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(s) => {
            dst.put_i32_le(s.len() as i32);
            dst.put_slice(s.as_bytes());
        }
        None => dst.put_i32_le(-1),
    }
}

/// Client Hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: Option<String>,
}

impl Hello {
    pub fn decode(mut body: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_body(&mut body)
    }
}

impl MessageBody for Hello {
    const MESSAGE_TYPE: MessageType = MessageType::Hello;

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.protocol_version);
        dst.put_u32_le(self.receive_buffer_size);
        dst.put_u32_le(self.send_buffer_size);
        dst.put_u32_le(self.max_message_size);
        dst.put_u32_le(self.max_chunk_count);
        put_string(dst, self.endpoint_url.as_deref());
    }

    fn decode_body<B: Buf>(src: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol_version: get_u32(src, "protocol_version")?,
            receive_buffer_size: get_u32(src, "receive_buffer_size")?,
            send_buffer_size: get_u32(src, "send_buffer_size")?,
            max_message_size: get_u32(src, "max_message_size")?,
            max_chunk_count: get_u32(src, "max_chunk_count")?,
            endpoint_url: get_string(src, "endpoint_url", MAX_ENDPOINT_URL_LEN)?,
        })
    }
}

/// Server Acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl Acknowledge {
    pub fn decode(mut body: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_body(&mut body)
    }
}

impl MessageBody for Acknowledge {
    const MESSAGE_TYPE: MessageType = MessageType::Acknowledge;

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.protocol_version);
        dst.put_u32_le(self.receive_buffer_size);
        dst.put_u32_le(self.send_buffer_size);
        dst.put_u32_le(self.max_message_size);
        dst.put_u32_le(self.max_chunk_count);
    }

    fn decode_body<B: Buf>(src: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            protocol_version: get_u32(src, "protocol_version")?,
            receive_buffer_size: get_u32(src, "receive_buffer_size")?,
            send_buffer_size: get_u32(src, "send_buffer_size")?,
            max_message_size: get_u32(src, "max_message_size")?,
            max_chunk_count: get_u32(src, "max_chunk_count")?,
        })
    }
}

/// Error message sent before the server closes a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub code: u32,
    pub reason: String,
}

impl ErrorMessage {
    pub fn new(code: u32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_body(&mut body)
    }
}

impl MessageBody for ErrorMessage {
    const MESSAGE_TYPE: MessageType = MessageType::Error;

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.code);
        put_string(dst, Some(&self.reason));
    }

    fn decode_body<B: Buf>(src: &mut B) -> Result<Self, DecodeError> {
        let code = get_u32(src, "error")?;
        let reason = get_string(src, "reason", usize::MAX)?.unwrap_or_default();
        Ok(Self { code, reason })
    }
}
