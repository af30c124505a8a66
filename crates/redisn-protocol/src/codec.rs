//! Codec for encoding commands and decoding RESP replies.
//!
//! Commands are always sent as an array of bulk strings. Replies are decoded
//! with a recursive parser that works on a borrowed slice and only advances
//! the caller's buffer once a complete reply is available.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::reply::Reply;

/// Maximum number of elements in a single aggregate.
pub const MAX_ARRAY_ELEMENTS: usize = 1024 * 1024;

/// Maximum bulk string size (512 MiB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum nesting depth for aggregates.
pub const MAX_DEPTH: usize = 64;

const CRLF: &[u8] = b"\r\n";

/// Protocol errors that can occur during decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not enough data to decode a complete reply.
    #[error("Incomplete reply")]
    Incomplete,

    /// Unknown type prefix byte.
    #[error("Invalid reply prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Length or integer line could not be parsed.
    #[error("Invalid length: {0}")]
    InvalidLength(String),

    /// Bulk string or aggregate exceeds the configured limits.
    #[error("Reply size {0} exceeds limits")]
    TooLarge(usize),

    /// Aggregates nested deeper than [`MAX_DEPTH`].
    #[error("Reply nesting exceeds maximum depth {MAX_DEPTH}")]
    TooDeep,

    /// Structurally invalid reply.
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// Encode a command as a RESP array of bulk strings.
///
/// The first argument is the command verb, the rest are its arguments.
pub fn encode_command<I, T>(args: I) -> Bytes
where
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
    T: AsRef<[u8]>,
{
    let mut buf = BytesMut::new();
    encode_command_into(args, &mut buf);
    buf.freeze()
}

/// Encode a command into an existing buffer.
pub fn encode_command_into<I, T>(args: I, buf: &mut BytesMut)
where
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
    T: AsRef<[u8]>,
{
    let args = args.into_iter();
    put_header(buf, b'*', args.len());
    for arg in args {
        let arg = arg.as_ref();
        put_header(buf, b'$', arg.len());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(CRLF);
    }
}

fn put_header(buf: &mut BytesMut, prefix: u8, len: usize) {
    buf.put_u8(prefix);
    buf.extend_from_slice(len.to_string().as_bytes());
    buf.extend_from_slice(CRLF);
}

/// Decode a single reply from bytes.
///
/// Bytes following the first complete reply are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::Incomplete`] if the data ends early, or another
/// variant if the data is invalid.
pub fn decode(data: &[u8]) -> Result<Reply, ProtocolError> {
    let mut bytes = data;
    parse_reply(&mut bytes, 0)
}

/// Try to decode a reply from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(reply))` if a complete reply was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the buffered data is not valid RESP.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Reply>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut bytes = &buf[..];
    match parse_reply(&mut bytes, 0) {
        Ok(reply) => {
            let consumed = buf.len() - bytes.len();
            buf.advance(consumed);
            Ok(Some(reply))
        }
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_reply(bytes: &mut &[u8], depth: usize) -> Result<Reply, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::TooDeep);
    }

    let input: &[u8] = *bytes;
    let (&prefix, rest) = input.split_first().ok_or(ProtocolError::Incomplete)?;
    *bytes = rest;

    match prefix {
        b'+' => Ok(Reply::Simple(parse_text_line(bytes)?)),
        b'-' => Ok(Reply::Error(parse_text_line(bytes)?)),
        b':' => Ok(Reply::Integer(parse_number(bytes)?)),
        b'_' => {
            parse_line(bytes)?;
            Ok(Reply::Null)
        }
        b'$' => parse_bulk(bytes),
        b'*' => match parse_aggregate(bytes, depth)? {
            Some(items) => Ok(Reply::Array(items)),
            None => Ok(Reply::Null),
        },
        b'>' => match parse_aggregate(bytes, depth)? {
            Some(items) => Ok(Reply::Push(items)),
            None => Err(ProtocolError::Malformed("null push frame".to_string())),
        },
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

/// Split off the next CRLF-terminated line.
fn parse_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], ProtocolError> {
    let input: &'a [u8] = *bytes;
    let pos = input
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .ok_or(ProtocolError::Incomplete)?;
    *bytes = &input[pos + CRLF.len()..];
    Ok(&input[..pos])
}

fn parse_text_line(bytes: &mut &[u8]) -> Result<String, ProtocolError> {
    let line = parse_line(bytes)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn parse_number(bytes: &mut &[u8]) -> Result<i64, ProtocolError> {
    let line = parse_line(bytes)?;
    let text = String::from_utf8_lossy(line);
    text.parse::<i64>()
        .map_err(|_| ProtocolError::InvalidLength(text.to_string()))
}

/// Parse a length header; `None` means the null marker `-1`.
fn parse_length(bytes: &mut &[u8], limit: usize) -> Result<Option<usize>, ProtocolError> {
    let len = parse_number(bytes)?;
    if len == -1 {
        return Ok(None);
    }
    let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidLength(len.to_string()))?;
    if len > limit {
        return Err(ProtocolError::TooLarge(len));
    }
    Ok(Some(len))
}

fn parse_bulk(bytes: &mut &[u8]) -> Result<Reply, ProtocolError> {
    let Some(len) = parse_length(bytes, MAX_BULK_SIZE)? else {
        return Ok(Reply::Null);
    };

    let input: &[u8] = *bytes;
    if input.len() < len + CRLF.len() {
        return Err(ProtocolError::Incomplete);
    }
    if &input[len..len + CRLF.len()] != CRLF {
        return Err(ProtocolError::Malformed(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&input[..len]);
    *bytes = &input[len + CRLF.len()..];
    Ok(Reply::Bulk(data))
}

fn parse_aggregate(bytes: &mut &[u8], depth: usize) -> Result<Option<Vec<Reply>>, ProtocolError> {
    let Some(len) = parse_length(bytes, MAX_ARRAY_ELEMENTS)? else {
        return Ok(None);
    };

    let mut items = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        items.push(parse_reply(bytes, depth + 1)?);
    }
    Ok(Some(items))
}
