//! Bounded connection pool.
//!
//! The pool keeps at most `max_size` connections open. When all of them are
//! checked out, `acquire` waits `retry_interval` and tries again, optionally
//! bounded by `acquire_timeout`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::tcp::TcpConnection;
use crate::traits::{Connection, Pool, TransportError};

/// Creates new connections for a pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// Connector that dials a fixed TCP address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    /// Get the target address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let conn = TcpConnection::connect(&self.addr, self.connect_timeout).await?;
        Ok(Box::new(conn))
    }
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections. Zero is treated as one.
    pub max_size: usize,
    /// Wait between attempts when the pool is exhausted.
    pub retry_interval: Duration,
    /// Give up acquiring after this long (`None` waits forever).
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            retry_interval: Duration::from_millis(300),
            acquire_timeout: None,
        }
    }
}

/// A bounded pool of reusable connections.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    /// Connections currently open, idle or checked out.
    open: AtomicUsize,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Create a pool with default configuration.
    #[must_use]
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_config(connector, PoolConfig::default())
    }

    /// Create a pool with custom configuration.
    #[must_use]
    pub fn with_config(connector: impl Connector + 'static, mut config: PoolConfig) -> Self {
        // An empty pool could never hand out a connection
        config.max_size = config.max_size.max(1);
        debug!("Creating connection pool with config: {:?}", config);
        Self {
            connector: Arc::new(connector),
            idle: Mutex::new(Vec::new()),
            open: AtomicUsize::new(0),
            config,
        }
    }

    /// Number of open connections, idle or checked out.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of idle connections waiting to be reused.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Reserve a slot for a new connection if the pool is under its limit.
    fn try_reserve(&self) -> bool {
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < self.config.max_size).then_some(open + 1)
            })
            .is_ok()
    }

    async fn acquire_inner(&self) -> Result<Box<dyn Connection>, TransportError> {
        loop {
            while let Some(conn) = self.idle.lock().await.pop() {
                if conn.is_open() {
                    trace!(connection = %conn.id(), "Reusing idle connection");
                    return Ok(conn);
                }
                self.open.fetch_sub(1, Ordering::SeqCst);
            }

            if self.try_reserve() {
                return match self.connector.connect().await {
                    Ok(conn) => {
                        debug!(connection = %conn.id(), open = self.open_count(), "Opened connection");
                        Ok(conn)
                    }
                    Err(e) => {
                        self.open.fetch_sub(1, Ordering::SeqCst);
                        Err(e)
                    }
                };
            }

            trace!(
                retry_ms = self.config.retry_interval.as_millis() as u64,
                "Pool exhausted, retrying"
            );
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }
}

#[async_trait]
impl Pool for ConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
        match self.config.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, self.acquire_inner())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.acquire_inner().await,
        }
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        if conn.is_open() {
            trace!(connection = %conn.id(), "Returning connection to pool");
            self.idle.lock().await.push(conn);
        } else {
            debug!(connection = %conn.id(), "Dropping closed connection");
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
