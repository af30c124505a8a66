//! # redisn-protocol
//!
//! Wire protocol definitions for redisn.
//!
//! This crate models the replies a RESP (REdis Serialization Protocol) server
//! sends and provides the codec that turns command arguments into request
//! bytes and incoming bytes back into [`Reply`] values.
//!
//! ## Reply Types
//!
//! - `Simple` / `Error` - Single-line status and error replies
//! - `Integer` - Signed 64-bit integers (e.g. subscription counts)
//! - `Bulk` - Binary-safe strings (channel names, payloads)
//! - `Array` / `Push` - Aggregates; RESP3 push frames arrive as `Push`
//!
//! ## Example
//!
//! ```rust
//! use redisn_protocol::{codec, Reply};
//!
//! let request = codec::encode_command(["SUBSCRIBE", "news"]);
//! assert_eq!(&request[..], b"*2\r\n$9\r\nSUBSCRIBE\r\n$4\r\nnews\r\n");
//!
//! let reply = codec::decode(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n").unwrap();
//! assert_eq!(reply.as_array().map(<[Reply]>::len), Some(3));
//! ```

pub mod codec;
pub mod reply;

pub use codec::{decode, decode_from, encode_command, ProtocolError};
pub use reply::Reply;
