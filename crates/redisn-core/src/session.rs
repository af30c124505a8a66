//! Subscription session management.
//!
//! A [`Subscriber`] owns at most one live session. The first successful
//! subscribe acquires a connection from the pool, runs the handshake, and
//! hands the connection to a dispatcher task. Later calls talk to that task
//! over a control channel instead of touching the connection.

use redisn_transport::{Connection, ConnectionId, Pool, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{SubscriptionRequest, UnsubscribeRequest};
use crate::dispatcher::{Control, Dispatcher, SessionState, Termination};
use crate::error::NotifyError;
use crate::handler::Handler;
use crate::handshake;
use crate::metrics;

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Upper bound on the whole handshake. `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Capacity of the control channel to a running dispatcher.
    pub control_buffer: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Some(Duration::from_secs(10)),
            control_buffer: 32,
        }
    }
}

/// Handles to a running dispatcher.
struct Session {
    connection: ConnectionId,
    control: mpsc::Sender<Control>,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<Termination>,
}

impl Session {
    fn is_listening(&self) -> bool {
        *self.state.borrow() == SessionState::Listening && !self.task.is_finished()
    }
}

/// Subscribes to channels and patterns over pooled connections.
///
/// Dropping a `Subscriber` cancels its live session, which closes the
/// connection and releases it to the pool.
pub struct Subscriber {
    pool: Arc<dyn Pool>,
    config: SubscriberConfig,
    session: Option<Session>,
}

impl Subscriber {
    /// Create a subscriber with default configuration.
    #[must_use]
    pub fn new(pool: Arc<dyn Pool>) -> Self {
        Self::with_config(pool, SubscriberConfig::default())
    }

    /// Create a subscriber with custom configuration.
    #[must_use]
    pub fn with_config(pool: Arc<dyn Pool>, config: SubscriberConfig) -> Self {
        debug!("Creating subscriber with config: {:?}", config);
        Self {
            pool,
            config,
            session: None,
        }
    }

    /// Subscribe `handler` to `keys`.
    ///
    /// `verb` is `SUBSCRIBE` or `PSUBSCRIBE`, in any case. Without a live
    /// session this acquires a connection and runs the handshake; the call
    /// returns once every key is acknowledged and messages then flow to
    /// `handler` from a background task. With a live session the keys are
    /// added to it and `handler` replaces the session's current handler.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::UnsupportedCommand`] or [`NotifyError::InvalidKeys`]
    ///   before the pool is touched
    /// - [`NotifyError::Transport`] if acquiring, writing or reading fails,
    ///   including a handshake timeout
    /// - [`NotifyError::SubscriptionFailed`] naming the rejected key
    ///
    /// A connection acquired for a failed handshake is closed and released.
    /// When a follow-up subscribe times out the session keeps listening and
    /// still consumes the late acknowledgements.
    pub async fn subscribe<H, K>(&mut self, verb: &str, handler: H, keys: &[K]) -> Result<(), NotifyError>
    where
        H: Handler,
        K: AsRef<str>,
    {
        let request = SubscriptionRequest::new(verb, keys)?;
        let handler: Box<dyn Handler> = Box::new(handler);

        match self.listening_session() {
            Some(session) => {
                let (reply, rx) = oneshot::channel();
                let control = Control::Subscribe {
                    request,
                    handler,
                    reply,
                };
                if session.control.send(control).await.is_err() {
                    self.session = None;
                    return Err(NotifyError::NoActiveSession);
                }

                let acked = match self.config.handshake_timeout {
                    Some(limit) => tokio::time::timeout(limit, rx)
                        .await
                        .unwrap_or(Ok(Err(NotifyError::Transport(TransportError::Timeout)))),
                    None => rx.await,
                };
                acked.unwrap_or(Err(NotifyError::NoActiveSession))
            }
            None => self.start_session(request, handler).await,
        }
    }

    /// Unsubscribe the live session from `keys`, or from everything when
    /// `keys` is empty.
    ///
    /// Returns once the command is written. Acknowledgements are consumed by
    /// the dispatcher, which terminates the session when none remain.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::UnsupportedCommand`] unless `verb` is `UNSUBSCRIBE`
    ///   or `PUNSUBSCRIBE`
    /// - [`NotifyError::NoActiveSession`] without a listening session
    /// - [`NotifyError::Transport`] if the write fails
    pub async fn unsubscribe<K: AsRef<str>>(&mut self, verb: &str, keys: &[K]) -> Result<(), NotifyError> {
        let request = UnsubscribeRequest::new(verb, keys)?;
        let session = self
            .listening_session()
            .ok_or(NotifyError::NoActiveSession)?;

        let (reply, rx) = oneshot::channel();
        session
            .control
            .send(Control::Unsubscribe { request, reply })
            .await
            .map_err(|_| NotifyError::NoActiveSession)?;
        rx.await.unwrap_or(Err(NotifyError::NoActiveSession))
    }

    /// State of the current session, if any.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| *s.state.borrow())
    }

    /// Whether a session is listening.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_listening)
    }

    /// A receiver that observes the current session's state changes.
    #[must_use]
    pub fn watch_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.session.as_ref().map(|s| s.state.clone())
    }

    /// Id of the connection held by the current session.
    #[must_use]
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.session.as_ref().map(|s| &s.connection)
    }

    /// Cancel the current session and wait for it to release its connection.
    ///
    /// Returns how the session ended, which is not necessarily
    /// [`Termination::Cancelled`] if it had already stopped. Calling this
    /// more than once is harmless.
    pub async fn cancel(&mut self) -> Option<Termination> {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
        self.join().await
    }

    /// Wait for the current session to terminate on its own.
    ///
    /// Safe to abandon: if the returned future is dropped the session is
    /// kept and can still be cancelled.
    pub async fn join(&mut self) -> Option<Termination> {
        let session = self.session.as_mut()?;
        let result = (&mut session.task).await;
        let session = self.session.take()?;

        match result {
            Ok(termination) => Some(termination),
            Err(e) => {
                error!(connection = %session.connection, "Dispatcher task failed: {}", e);
                None
            }
        }
    }

    /// The live session, discarding one that has already terminated.
    fn listening_session(&mut self) -> Option<&Session> {
        if !self.session.as_ref().is_some_and(Session::is_listening) {
            self.session = None;
        }
        self.session.as_ref()
    }

    async fn start_session(&mut self, request: SubscriptionRequest, handler: Box<dyn Handler>) -> Result<(), NotifyError> {
        let mut conn = self.pool.acquire().await?;

        if let Err(e) = self.handshake(conn.as_mut(), &request).await {
            warn!(
                connection = %conn.id(),
                error = %e,
                "Subscription handshake failed, releasing connection"
            );
            metrics::record_error(e.kind());
            // The server may already hold some of the subscriptions
            if let Err(close) = conn.close().await {
                debug!(connection = %conn.id(), "Failed to close connection: {}", close);
            }
            self.pool.release(conn).await;
            return Err(e);
        }

        let connection = conn.id().clone();
        let (control, control_rx) = mpsc::channel(self.config.control_buffer.max(1));
        let (state_tx, state) = watch::channel(SessionState::Listening);
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(conn, handler, control_rx, cancel.clone(), state_tx);
        let task = tokio::spawn(dispatcher.run(self.pool.clone()));

        info!(
            connection = %connection,
            verb = %request.verb(),
            keys = request.keys().len(),
            "Subscription session started"
        );

        self.session = Some(Session {
            connection,
            control,
            cancel,
            state,
            task,
        });
        Ok(())
    }

    async fn handshake(&self, conn: &mut dyn Connection, request: &SubscriptionRequest) -> Result<(), NotifyError> {
        match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake::perform(conn, request))
                .await
                .unwrap_or(Err(NotifyError::Transport(TransportError::Timeout))),
            None => handshake::perform(conn, request).await,
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}
