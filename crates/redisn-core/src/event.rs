//! Push events received while a session is listening.
//!
//! Every reply read by the dispatcher is classified into a [`PushEvent`]
//! before anything acts on it. Classification checks arity and element types;
//! anything that does not fit one of the known shapes becomes
//! [`PushEvent::Unexpected`] with the original reply attached.

use redisn_protocol::Reply;

use crate::command::SubscriptionKind;

/// A classified push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// `["message", channel, payload]`
    Message { channel: String, payload: String },

    /// `["pmessage", pattern, channel, payload]`
    PatternMessage {
        pattern: String,
        channel: String,
        payload: String,
    },

    /// `["subscribe" | "psubscribe", key, count]`
    SubscribeAck {
        kind: SubscriptionKind,
        key: String,
        count: u64,
    },

    /// `["unsubscribe" | "punsubscribe", key | nil, remaining]`
    UnsubscribeAck {
        kind: SubscriptionKind,
        key: Option<String>,
        remaining: u64,
    },

    /// Anything else, including error replies.
    Unexpected { raw: Reply },
}

impl PushEvent {
    /// Classify a reply.
    #[must_use]
    pub fn decode(reply: Reply) -> Self {
        match Self::classify(&reply) {
            Some(event) => event,
            None => PushEvent::Unexpected { raw: reply },
        }
    }

    /// Classify a reply without taking ownership of it.
    ///
    /// Returns `None` where [`PushEvent::decode`] would return `Unexpected`.
    #[must_use]
    pub fn classify(reply: &Reply) -> Option<Self> {
        let (kind, rest) = reply.as_array()?.split_first()?;
        let kind = kind.as_text()?.to_ascii_lowercase();

        let event = match (kind.as_str(), rest) {
            ("message", [channel, payload]) => PushEvent::Message {
                channel: text(channel)?,
                payload: text(payload)?,
            },
            ("pmessage", [pattern, channel, payload]) => PushEvent::PatternMessage {
                pattern: text(pattern)?,
                channel: text(channel)?,
                payload: text(payload)?,
            },
            ("subscribe", [key, count]) => subscribe_ack(SubscriptionKind::Channel, key, count)?,
            ("psubscribe", [key, count]) => subscribe_ack(SubscriptionKind::Pattern, key, count)?,
            ("unsubscribe", [key, remaining]) => {
                unsubscribe_ack(SubscriptionKind::Channel, key, remaining)?
            }
            ("punsubscribe", [key, remaining]) => {
                unsubscribe_ack(SubscriptionKind::Pattern, key, remaining)?
            }
            _ => return None,
        };
        Some(event)
    }
}

fn text(reply: &Reply) -> Option<String> {
    reply.as_text().map(|t| t.into_owned())
}

fn count(reply: &Reply) -> Option<u64> {
    u64::try_from(reply.as_integer()?).ok()
}

fn subscribe_ack(kind: SubscriptionKind, key: &Reply, n: &Reply) -> Option<PushEvent> {
    Some(PushEvent::SubscribeAck {
        kind,
        key: text(key)?,
        count: count(n)?,
    })
}

fn unsubscribe_ack(kind: SubscriptionKind, key: &Reply, n: &Reply) -> Option<PushEvent> {
    // The key is nil when unsubscribing without any active subscription
    let key = if key.is_null() { None } else { Some(text(key)?) };
    Some(PushEvent::UnsubscribeAck {
        kind,
        key,
        remaining: count(n)?,
    })
}
