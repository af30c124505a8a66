//! Subscription handshake.
//!
//! The subscribe command is written once with every key; the server then
//! answers with one acknowledgement per key. The first acknowledgement comes
//! back as the reply to the command, the remaining ones are read off the
//! connection without sending anything else.

use redisn_protocol::Reply;
use redisn_transport::Connection;
use tracing::{debug, trace};

use crate::command::SubscriptionRequest;
use crate::error::NotifyError;

/// Run the handshake for `request` on `conn`.
///
/// Exactly `request.keys().len()` replies are consumed on success.
///
/// # Errors
///
/// Returns the transport error if reading or writing fails, or
/// [`NotifyError::SubscriptionFailed`] if an acknowledgement does not confirm
/// the subscription. Replies after the first failing one are not read.
pub async fn perform(
    conn: &mut dyn Connection,
    request: &SubscriptionRequest,
) -> Result<(), NotifyError> {
    let keys = request.keys();
    debug!(
        connection = %conn.id(),
        verb = %request.verb(),
        keys = keys.len(),
        "Starting subscription handshake"
    );

    let first = conn.send(&request.to_args()).await?;
    verify_ack(&first, &keys[0])?;

    for key in &keys[1..] {
        let reply = conn.read().await?;
        verify_ack(&reply, key)?;
    }

    debug!(connection = %conn.id(), keys = keys.len(), "Subscription handshake complete");
    Ok(())
}

/// Check that `reply` acknowledges a subscription.
///
/// The reply must be an aggregate whose first element, upper-cased, ends with
/// `SUBSCRIBE`. On failure the key is taken from the reply's second element,
/// falling back to `expected_key` when the reply has none.
pub fn verify_ack(reply: &Reply, expected_key: &str) -> Result<(), NotifyError> {
    let items = reply.as_array().unwrap_or_default();

    let confirmed = items
        .first()
        .and_then(Reply::as_text)
        .is_some_and(|verb| verb.to_ascii_uppercase().ends_with("SUBSCRIBE"));

    if confirmed {
        trace!(key = %expected_key, "Subscription acknowledged");
        return Ok(());
    }

    let key = items
        .get(1)
        .and_then(Reply::as_text)
        .map_or_else(|| expected_key.to_string(), |k| k.into_owned());
    debug!(key = %key, reply = %reply, "Subscription rejected");
    Err(NotifyError::SubscriptionFailed { key })
}
