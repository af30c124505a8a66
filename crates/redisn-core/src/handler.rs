//! Notification handlers.

use crate::error::NotifyError;

/// Receives notifications for a subscription session.
///
/// The handler is called from the session's dispatcher task only, one call
/// at a time, in the order events arrived. A call carrying an error is the
/// last call the handler will see for that session.
///
/// Any `FnMut(&str, &str, Option<NotifyError>)` closure is a handler.
pub trait Handler: Send + 'static {
    /// Handle one notification.
    ///
    /// `channel` and `payload` are empty when `error` is set.
    fn handle(&mut self, channel: &str, payload: &str, error: Option<NotifyError>);
}

impl<F> Handler for F
where
    F: FnMut(&str, &str, Option<NotifyError>) + Send + 'static,
{
    fn handle(&mut self, channel: &str, payload: &str, error: Option<NotifyError>) {
        self(channel, payload, error);
    }
}
