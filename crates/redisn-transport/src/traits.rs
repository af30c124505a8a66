//! Transport abstraction traits for redisn.
//!
//! These traits define the interface every connection and pool must provide,
//! allowing the subscription layer to stay transport-agnostic.

use async_trait::async_trait;
use redisn_protocol::{ProtocolError, Reply};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{n:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Failed to establish a connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// An open connection speaking the request/response protocol.
///
/// A connection is owned by exactly one user at a time; nothing here is
/// expected to be called concurrently.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Write a command and wait for exactly one reply.
    async fn send(&mut self, args: &[String]) -> Result<Reply, TransportError> {
        self.send_no_wait(args).await?;
        self.read().await
    }

    /// Write a command without waiting for a reply.
    async fn send_no_wait(&mut self, args: &[String]) -> Result<(), TransportError>;

    /// Read the next reply from the connection.
    ///
    /// Implementations must be cancel-safe: if the returned future is dropped
    /// before completion, no reply data may be lost and a later call picks up
    /// where this one left off.
    async fn read(&mut self) -> Result<Reply, TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

/// A source of reusable connections.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Take a connection out of the pool, creating one if the policy allows.
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Hand a connection back to the pool.
    async fn release(&self, conn: Box<dyn Connection>);
}
