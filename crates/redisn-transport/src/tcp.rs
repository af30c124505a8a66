//! TCP transport implementation.
//!
//! This module provides a RESP connection over a plain `tokio` TCP stream.

use async_trait::async_trait;
use bytes::BytesMut;
use redisn_protocol::{codec, Reply};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionId, TransportError};

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 4096;

/// A RESP connection over TCP.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: Option<String>,
    is_open: bool,
    read_buffer: BytesMut,
}

impl TcpConnection {
    /// Connect to `addr`, giving up after `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be reached in time.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectFailed(format!("{addr}: {e}")))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
        }

        let conn = Self::from_stream(stream);
        debug!(connection = %conn.id, addr = %addr, "Connected");
        Ok(conn)
    }

    /// Wrap an already connected stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        let remote_addr = stream.peer_addr().ok().map(|a| a.to_string());
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr,
            is_open: true,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_no_wait(&mut self, args: &[String]) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let data = codec::encode_command(args);
        if let Err(e) = self.stream.write_all(&data).await {
            self.is_open = false;
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Reply, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        loop {
            // First, try to decode from what is already buffered
            match codec::decode_from(&mut self.read_buffer) {
                Ok(Some(reply)) => return Ok(reply),
                Ok(None) => {}
                Err(e) => {
                    self.is_open = false;
                    return Err(e.into());
                }
            }

            // `read_buf` is cancel-safe, partial data stays in the buffer
            match self.stream.read_buf(&mut self.read_buffer).await {
                Ok(0) => {
                    debug!(connection = %self.id, "Connection closed by peer");
                    self.is_open = false;
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e) => {
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
