//! # redisn-transport
//!
//! Connection and pooling layer for redisn.
//!
//! This crate provides a uniform interface over the connections a subscriber
//! talks to, plus a pool that hands them out:
//!
//! - **TcpConnection** - RESP over a plain TCP stream
//! - **ConnectionPool** - Bounded pool with a retry-on-exhaustion policy
//!
//! ## Transport Abstraction
//!
//! Connections implement the `Connection` trait and pools implement `Pool`,
//! so the subscription layer never depends on a concrete socket type.
//!
//! ```rust,ignore
//! use redisn_transport::{Connection, Pool};
//!
//! async fn first_reply(pool: &dyn Pool) -> Result<(), redisn_transport::TransportError> {
//!     let mut conn = pool.acquire().await?;
//!     let reply = conn.send(&["PING".to_string()]).await?;
//!     println!("{reply}");
//!     pool.release(conn).await;
//!     Ok(())
//! }
//! ```

pub mod pool;
pub mod tcp;
pub mod traits;

pub use pool::{ConnectionPool, Connector, PoolConfig, TcpConnector};
pub use tcp::TcpConnection;
pub use traits::{Connection, ConnectionId, Pool, TransportError};
