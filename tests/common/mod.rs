//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use opcua_lite::net::frame::{encode_frame, Hello, MessageType, UaTcpCodec, HEADER_LEN};
use opcua_lite::{Server, ServerConfig};

/// Config bound to an ephemeral loopback port with the clock timer off.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.endpoints = vec!["opc.tcp://127.0.0.1:0/test/".to_string()];
    config.scheduler.clock_interval_ms = 0;
    config
}

/// Create a server and return it with its bound address.
pub async fn started_server(config: ServerConfig) -> (Server, SocketAddr) {
    let mut server = Server::new(config);
    server.create().await.unwrap();
    let addr = server.local_addrs()[0];
    (server, addr)
}

/// Iterate `server` until `client` finishes, failing after five seconds.
pub async fn drive_until<T>(server: &mut Server, client: JoinHandle<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !client.is_finished() {
            server.iterate(true).await.unwrap();
        }
    })
    .await
    .expect("client did not finish in time");
    client.await.unwrap()
}

/// Iterate `server` until it has dropped every connection.
pub async fn drive_until_disconnected(server: &mut Server) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.connection_count() > 0 {
            server.iterate(true).await.unwrap();
        }
    })
    .await
    .expect("connections were not dropped in time");
}

pub fn hello_frame(endpoint_url: &str, receive_buffer_size: u32, send_buffer_size: u32) -> Vec<u8> {
    let hello = Hello {
        protocol_version: 0,
        receive_buffer_size,
        send_buffer_size,
        max_message_size: 0,
        max_chunk_count: 0,
        endpoint_url: Some(endpoint_url.to_string()),
    };
    let mut out = BytesMut::new();
    UaTcpCodec::new(u32::MAX).encode(hello, &mut out).unwrap();
    out.to_vec()
}

pub fn raw_frame(message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::new();
    encode_frame(message_type, body, &mut out);
    out.to_vec()
}

/// Read one frame; returns the message type bytes and the body.
pub async fn read_frame(stream: &mut TcpStream) -> std::io::Result<([u8; 3], Vec<u8>)> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut body = vec![0u8; size - HEADER_LEN];
    stream.read_exact(&mut body).await?;
    Ok(([header[0], header[1], header[2]], body))
}

/// True once the server has closed its side.
pub async fn read_eof(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(stream.read(&mut buf).await, Ok(0) | Err(_))
}

pub async fn connect_and_send(addr: SocketAddr, bytes: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream
}
