//! # redisn-core
//!
//! Pub/sub subscription sessions for redisn.
//!
//! This crate turns a pooled RESP connection into a stream of notifications:
//!
//! - **Command** - Verb and key validation for subscribe/unsubscribe
//! - **Handshake** - Write the subscribe command and confirm every key
//! - **Dispatcher** - Background loop delivering push events to a handler
//! - **Subscriber** - Owns the session, its connection and its lifecycle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  acquire  ┌─────────────┐  handshake  ┌─────────────┐
//! │ Subscriber  │──────────▶│    Pool     │────────────▶│ Dispatcher  │
//! └─────────────┘           └─────────────┘             └─────────────┘
//!        │ control channel        ▲                            │
//!        └────────────────────────┼───────────────────────────▶│
//!                                 │ release on termination     ▼
//!                                 └─────────────────────  ┌─────────┐
//!                                                         │ Handler │
//!                                                         └─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use redisn_core::{NotifyError, Subscriber};
//! use redisn_transport::{ConnectionPool, TcpConnector};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let connector = TcpConnector::new("127.0.0.1:6379", Duration::from_secs(5));
//! let pool = Arc::new(ConnectionPool::new(connector));
//! let mut subscriber = Subscriber::new(pool);
//!
//! subscriber
//!     .subscribe(
//!         "SUBSCRIBE",
//!         |channel: &str, payload: &str, error: Option<NotifyError>| {
//!             println!("{channel}: {payload} {error:?}");
//!         },
//!         &["news"],
//!     )
//!     .await?;
//! ```

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod handshake;
pub mod metrics;
pub mod session;

#[cfg(test)]
mod test_support;

pub use command::{SubscriptionKind, SubscriptionRequest, UnsubscribeRequest, Verb};
pub use dispatcher::{SessionState, Termination};
pub use error::NotifyError;
pub use event::PushEvent;
pub use handler::Handler;
pub use session::{Subscriber, SubscriberConfig};
