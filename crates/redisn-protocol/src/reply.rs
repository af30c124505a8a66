//! Reply values for the RESP protocol.
//!
//! A [`Reply`] is what the codec hands back for every complete frame read off
//! a connection. Callers never cast elements blindly; they go through the
//! `as_*` accessors, which return `None` when the shape does not match.

use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// A single decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status reply (`+OK`).
    Simple(String),
    /// Error reply (`-ERR ...`).
    Error(String),
    /// Integer reply (`:1`).
    Integer(i64),
    /// Binary-safe bulk string (`$5\r\nhello`).
    Bulk(Bytes),
    /// Null bulk string, null array, or RESP3 null.
    Null,
    /// Array of nested replies.
    Array(Vec<Reply>),
    /// RESP3 out-of-band push frame.
    Push(Vec<Reply>),
}

impl Reply {
    /// Create a bulk string reply.
    #[must_use]
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Create an array of bulk strings.
    #[must_use]
    pub fn bulk_array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Reply::Array(items.into_iter().map(Reply::bulk).collect())
    }

    /// Get the elements of an aggregate reply.
    ///
    /// Both `Array` and `Push` are aggregates; everything else yields `None`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) | Reply::Push(items) => Some(items),
            _ => None,
        }
    }

    /// Get the textual content of a string reply.
    ///
    /// Invalid UTF-8 in bulk strings is replaced rather than rejected.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Reply::Simple(s) => Some(Cow::Borrowed(s)),
            Reply::Bulk(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    /// Get the value of an integer reply.
    ///
    /// String replies holding a decimal integer are accepted as well.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            Reply::Simple(_) | Reply::Bulk(_) => self.as_text()?.parse().ok(),
            _ => None,
        }
    }

    /// Check whether this is an error reply.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Check whether this is a null reply.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "{s}"),
            Reply::Error(e) => write!(f, "(error) {e}"),
            Reply::Integer(i) => write!(f, "(integer) {i}"),
            Reply::Bulk(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Reply::Null => write!(f, "(nil)"),
            Reply::Array(items) | Reply::Push(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for Reply {
    fn from(i: i64) -> Self {
        Reply::Integer(i)
    }
}
