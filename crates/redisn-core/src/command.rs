//! Command validation.
//!
//! Only four verbs are accepted: `SUBSCRIBE` and `PSUBSCRIBE` to enter a
//! session, `UNSUBSCRIBE` and `PUNSUBSCRIBE` to leave one. Validation never
//! touches a connection.

use std::collections::HashSet;
use std::fmt;

use crate::error::NotifyError;

const SUBSCRIBE_ALTERNATIVES: &str = "'SUBSCRIBE' or 'PSUBSCRIBE'";
const UNSUBSCRIBE_ALTERNATIVES: &str = "'UNSUBSCRIBE' or 'PUNSUBSCRIBE'";

/// Whether a subscription targets channel names or glob patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Exact channel names.
    Channel,
    /// Glob-style patterns.
    Pattern,
}

/// A recognized pub/sub verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Subscribe,
    PSubscribe,
    Unsubscribe,
    PUnsubscribe,
}

impl Verb {
    /// Parse a subscribe-family verb, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::UnsupportedCommand`] for any other verb.
    pub fn parse_subscribe(verb: &str) -> Result<Self, NotifyError> {
        match verb.to_ascii_uppercase().as_str() {
            "SUBSCRIBE" => Ok(Verb::Subscribe),
            "PSUBSCRIBE" => Ok(Verb::PSubscribe),
            _ => Err(NotifyError::UnsupportedCommand {
                verb: verb.to_string(),
                operation: "subscribe",
                expected: SUBSCRIBE_ALTERNATIVES,
            }),
        }
    }

    /// Parse an unsubscribe-family verb, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::UnsupportedCommand`] for any other verb.
    pub fn parse_unsubscribe(verb: &str) -> Result<Self, NotifyError> {
        match verb.to_ascii_uppercase().as_str() {
            "UNSUBSCRIBE" => Ok(Verb::Unsubscribe),
            "PUNSUBSCRIBE" => Ok(Verb::PUnsubscribe),
            _ => Err(NotifyError::UnsupportedCommand {
                verb: verb.to_string(),
                operation: "unsubscribe",
                expected: UNSUBSCRIBE_ALTERNATIVES,
            }),
        }
    }

    /// Get the wire form of the verb.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Subscribe => "SUBSCRIBE",
            Verb::PSubscribe => "PSUBSCRIBE",
            Verb::Unsubscribe => "UNSUBSCRIBE",
            Verb::PUnsubscribe => "PUNSUBSCRIBE",
        }
    }

    /// Get the kind of key this verb operates on.
    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Verb::Subscribe | Verb::Unsubscribe => SubscriptionKind::Channel,
            Verb::PSubscribe | Verb::PUnsubscribe => SubscriptionKind::Pattern,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn command_args(verb: Verb, keys: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(keys.len() + 1);
    args.push(verb.as_str().to_string());
    args.extend(keys.iter().cloned());
    args
}

/// A validated request to enter (or extend) a subscription session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    verb: Verb,
    keys: Vec<String>,
}

impl SubscriptionRequest {
    /// Validate a subscribe request.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::UnsupportedCommand`] for a verb outside the
    /// subscribe family, and [`NotifyError::InvalidKeys`] for an empty or
    /// duplicated key list.
    pub fn new<K: AsRef<str>>(verb: &str, keys: &[K]) -> Result<Self, NotifyError> {
        let verb = Verb::parse_subscribe(verb)?;

        if keys.is_empty() {
            return Err(NotifyError::InvalidKeys(format!(
                "{verb} requires at least one key"
            )));
        }

        let mut seen = HashSet::with_capacity(keys.len());
        for key in keys {
            if !seen.insert(key.as_ref()) {
                return Err(NotifyError::InvalidKeys(format!(
                    "duplicate key '{}'",
                    key.as_ref()
                )));
            }
        }

        Ok(Self {
            verb,
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        })
    }

    /// Get the verb.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Get the keys, in request order. Never empty.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Build the command array: verb followed by every key.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        command_args(self.verb, &self.keys)
    }
}

/// A validated request to leave subscriptions.
///
/// An empty key list leaves every subscription of the verb's kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeRequest {
    verb: Verb,
    keys: Vec<String>,
}

impl UnsubscribeRequest {
    /// Validate an unsubscribe request.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::UnsupportedCommand`] for a verb outside the
    /// unsubscribe family.
    pub fn new<K: AsRef<str>>(verb: &str, keys: &[K]) -> Result<Self, NotifyError> {
        Ok(Self {
            verb: Verb::parse_unsubscribe(verb)?,
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        })
    }

    /// Get the verb.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Get the keys, in request order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Build the command array: verb followed by every key.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        command_args(self.verb, &self.keys)
    }
}
