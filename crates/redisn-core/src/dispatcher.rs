//! Notification dispatch loop.
//!
//! After a successful handshake the session's connection is moved into a
//! [`Dispatcher`], which becomes its only user. The dispatcher reads pushed
//! replies until one of these happens:
//!
//! - an unsubscribe acknowledgement reports zero remaining subscriptions
//! - a reply of unknown shape arrives, or the read fails
//! - the session's cancellation token fires
//!
//! It then releases the connection to the pool, exactly once, and publishes
//! [`SessionState::Terminated`].
//!
//! ```text
//!              ┌──────────────┐  message / pmessage      ┌─────────┐
//! handshake ──▶│  LISTENING   │─────────────────────────▶│ Handler │
//!              └──────────────┘                          └─────────┘
//!                 │  unsubscribe ack, 0 left
//!                 │  unexpected reply / read error
//!                 │  cancellation
//!                 ▼
//!              ┌──────────────┐
//!              │  TERMINATED  │──▶ pool.release(conn)
//!              └──────────────┘
//! ```

use redisn_protocol::Reply;
use redisn_transport::{Connection, Pool, TransportError};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::command::{SubscriptionRequest, UnsubscribeRequest};
use crate::error::NotifyError;
use crate::event::PushEvent;
use crate::handler::Handler;
use crate::metrics;

/// Lifecycle state of a subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The dispatcher is reading pushed replies.
    Listening,
    /// The dispatcher stopped and the connection went back to the pool.
    Terminated,
}

/// Why a dispatcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// An unsubscribe acknowledgement reported no remaining subscriptions.
    Drained,
    /// A read failed or an unexpected reply arrived; the handler saw the error.
    Failed,
    /// The session was cancelled by its owner.
    Cancelled,
}

impl Termination {
    /// Short label used for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Drained => "drained",
            Termination::Failed => "failed",
            Termination::Cancelled => "cancelled",
        }
    }
}

/// A request from the session owner to the running dispatcher.
pub(crate) enum Control {
    /// Add subscriptions to the live session.
    Subscribe {
        request: SubscriptionRequest,
        handler: Box<dyn Handler>,
        reply: oneshot::Sender<Result<(), NotifyError>>,
    },
    /// Write an unsubscribe command; acknowledgements arrive as push events.
    Unsubscribe {
        request: UnsubscribeRequest,
        reply: oneshot::Sender<Result<(), NotifyError>>,
    },
}

/// A follow-up subscribe still waiting for acknowledgements.
struct PendingSubscribe {
    request: SubscriptionRequest,
    acked: usize,
    reply: oneshot::Sender<Result<(), NotifyError>>,
}

/// Owns a subscribed connection and feeds its push events to a handler.
pub(crate) struct Dispatcher {
    conn: Box<dyn Connection>,
    handler: Box<dyn Handler>,
    control: mpsc::Receiver<Control>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    pending: VecDeque<PendingSubscribe>,
    /// A drain-to-zero arrived while a subscribe was still pending.
    drain_deferred: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        conn: Box<dyn Connection>,
        handler: Box<dyn Handler>,
        control: mpsc::Receiver<Control>,
        cancel: CancellationToken,
        state: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            conn,
            handler,
            control,
            cancel,
            state,
            pending: VecDeque::new(),
            drain_deferred: false,
        }
    }

    /// Run until termination, then release the connection to `pool`.
    pub(crate) async fn run(mut self, pool: Arc<dyn Pool>) -> Termination {
        let connection = self.conn.id().clone();
        metrics::record_session_started();
        debug!(connection = %connection, "Dispatcher listening");

        let termination = self.listen().await;

        if termination != Termination::Drained {
            // May still be subscribed server-side; never hand it out again
            if let Err(e) = self.conn.close().await {
                debug!(connection = %connection, "Failed to close connection: {}", e);
            }
        }

        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(Err(NotifyError::NoActiveSession));
        }

        let Self { conn, state, .. } = self;
        pool.release(conn).await;
        state.send_replace(SessionState::Terminated);
        metrics::record_session_terminated(termination.as_str());

        debug!(
            connection = %connection,
            reason = termination.as_str(),
            "Dispatcher terminated, connection released"
        );
        termination
    }

    async fn listen(&mut self) -> Termination {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Termination::Cancelled,

                Some(control) = self.control.recv() => self.apply(control).await,

                // `Connection::read` is cancel-safe, losing this race drops no data
                result = self.conn.read() => {
                    let outcome = match result {
                        Ok(reply) => self.on_reply(reply),
                        Err(e) => Some(self.on_read_error(e)),
                    };
                    if let Some(termination) = outcome {
                        return termination;
                    }
                }
            }
        }
    }

    async fn apply(&mut self, control: Control) {
        match control {
            Control::Subscribe {
                request,
                handler,
                reply,
            } => match self.conn.send_no_wait(&request.to_args()).await {
                Ok(()) => {
                    debug!(
                        connection = %self.conn.id(),
                        verb = %request.verb(),
                        keys = request.keys().len(),
                        "Extending subscription session"
                    );
                    self.handler = handler;
                    self.pending.push_back(PendingSubscribe {
                        request,
                        acked: 0,
                        reply,
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e.into()));
                }
            },
            Control::Unsubscribe { request, reply } => {
                trace!(
                    connection = %self.conn.id(),
                    verb = %request.verb(),
                    keys = request.keys().len(),
                    "Sending unsubscribe"
                );
                let result = self
                    .conn
                    .send_no_wait(&request.to_args())
                    .await
                    .map_err(NotifyError::from);
                let _ = reply.send(result);
            }
        }
    }

    fn on_reply(&mut self, reply: Reply) -> Option<Termination> {
        let Some(event) = PushEvent::classify(&reply) else {
            return self.on_unexpected(reply);
        };

        match event {
            PushEvent::Message { channel, payload } => {
                trace!(channel = %channel, bytes = payload.len(), "Dispatching message");
                metrics::record_notification(false);
                self.handler.handle(&channel, &payload, None);
                None
            }
            PushEvent::PatternMessage {
                pattern,
                channel,
                payload,
            } => {
                trace!(pattern = %pattern, channel = %channel, bytes = payload.len(), "Dispatching pattern message");
                metrics::record_notification(true);
                self.handler.handle(&channel, &payload, None);
                None
            }
            PushEvent::SubscribeAck { key, count, .. } => {
                if !self.ack_pending() {
                    return self.on_unexpected(reply);
                }
                self.drain_deferred = false;
                trace!(key = %key, count, "Subscription acknowledged");
                None
            }
            PushEvent::UnsubscribeAck { key, remaining, .. } => {
                trace!(key = ?key, remaining, "Unsubscription acknowledged");
                if remaining > 0 {
                    self.drain_deferred = false;
                    return None;
                }
                if self.pending.is_empty() {
                    return Some(Termination::Drained);
                }
                // Acks for the pending subscribe will raise the count again
                self.drain_deferred = true;
                None
            }
            PushEvent::Unexpected { .. } => self.on_unexpected(reply),
        }
    }

    /// Count an acknowledgement against the oldest pending subscribe.
    fn ack_pending(&mut self) -> bool {
        let Some(front) = self.pending.front_mut() else {
            return false;
        };

        front.acked += 1;
        if front.acked == front.request.keys().len() {
            if let Some(done) = self.pending.pop_front() {
                let _ = done.reply.send(Ok(()));
            }
        }
        true
    }

    fn on_unexpected(&mut self, reply: Reply) -> Option<Termination> {
        if reply.is_error() {
            if let Some(failed) = self.pending.pop_front() {
                let key = failed
                    .request
                    .keys()
                    .get(failed.acked)
                    .cloned()
                    .unwrap_or_default();
                warn!(key = %key, reply = %reply, "Subscription rejected by server");
                metrics::record_error("subscription_failed");
                let _ = failed
                    .reply
                    .send(Err(NotifyError::SubscriptionFailed { key }));
                return (self.drain_deferred && self.pending.is_empty())
                    .then_some(Termination::Drained);
            }
        }

        warn!(connection = %self.conn.id(), reply = %reply, "Unexpected reply while listening");
        self.deliver_error(NotifyError::UnexpectedReply { raw: reply });
        Some(Termination::Failed)
    }

    fn on_read_error(&mut self, error: TransportError) -> Termination {
        match error {
            TransportError::ConnectionClosed => {
                debug!(connection = %self.conn.id(), "Connection closed while listening")
            }
            ref e => warn!(connection = %self.conn.id(), "Read failed while listening: {}", e),
        }
        self.deliver_error(error.into());
        Termination::Failed
    }

    /// Deliver the final, error-carrying handler call.
    fn deliver_error(&mut self, error: NotifyError) {
        metrics::record_error(error.kind());
        self.handler.handle("", "", Some(error));
    }
}
