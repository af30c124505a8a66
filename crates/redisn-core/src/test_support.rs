//! Scripted fakes for unit tests.

use async_trait::async_trait;
use redisn_protocol::Reply;
use redisn_transport::{Connection, ConnectionId, Pool, TransportError};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::NotifyError;
use crate::handler::Handler;

/// What a [`ScriptedConnection`] observed.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionLog {
    pub sent: Vec<Vec<String>>,
    pub reads: usize,
    pub closed: bool,
}

/// Feeds replies to a [`ScriptedConnection`] and inspects its log.
#[derive(Clone)]
pub(crate) struct Script {
    replies: mpsc::UnboundedSender<Result<Reply, TransportError>>,
    log: Arc<Mutex<ConnectionLog>>,
}

impl Script {
    pub fn reply(&self, reply: Reply) {
        let _ = self.replies.send(Ok(reply));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.replies.send(Err(error));
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.lock().unwrap().clone()
    }
}

/// A connection whose replies come from a [`Script`].
///
/// Reads block until the script provides a reply and fail with
/// `ConnectionClosed` once every script handle is dropped.
pub(crate) struct ScriptedConnection {
    id: ConnectionId,
    replies: mpsc::UnboundedReceiver<Result<Reply, TransportError>>,
    log: Arc<Mutex<ConnectionLog>>,
    open: bool,
}

impl ScriptedConnection {
    pub fn new() -> (Self, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(ConnectionLog::default()));
        let conn = Self {
            id: ConnectionId::generate(),
            replies: rx,
            log: log.clone(),
            open: true,
        };
        (conn, Script { replies: tx, log })
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_no_wait(&mut self, args: &[String]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed);
        }
        self.log.lock().unwrap().sent.push(args.to_vec());
        Ok(())
    }

    async fn read(&mut self) -> Result<Reply, TransportError> {
        let next = self.replies.recv().await;
        self.log.lock().unwrap().reads += 1;
        next.unwrap_or(Err(TransportError::ConnectionClosed))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.log.lock().unwrap().closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// A pool that hands out one prepared connection and counts calls.
#[derive(Default)]
pub(crate) struct SingleConnectionPool {
    conn: Mutex<Option<Box<dyn Connection>>>,
    counts: Mutex<(usize, usize)>,
}

impl SingleConnectionPool {
    pub fn with(conn: impl Connection + 'static) -> Arc<Self> {
        Arc::new(Self {
            conn: Mutex::new(Some(Box::new(conn))),
            ..Default::default()
        })
    }

    pub fn acquired(&self) -> usize {
        self.counts.lock().unwrap().0
    }

    pub fn released(&self) -> usize {
        self.counts.lock().unwrap().1
    }
}

#[async_trait]
impl Pool for SingleConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.counts.lock().unwrap().0 += 1;
        self.conn
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Other("pool empty".to_string()))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        self.counts.lock().unwrap().1 += 1;
        *self.conn.lock().unwrap() = Some(conn);
    }
}

/// One handler call, with the error reduced to its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Recorded {
    pub channel: String,
    pub payload: String,
    pub error: Option<&'static str>,
}

impl Recorded {
    pub fn message(channel: &str, payload: &str) -> Self {
        Self {
            channel: channel.to_string(),
            payload: payload.to_string(),
            error: None,
        }
    }

    pub fn error(kind: &'static str) -> Self {
        Self {
            channel: String::new(),
            payload: String::new(),
            error: Some(kind),
        }
    }
}

/// A handler that forwards every call to the returned receiver.
pub(crate) fn recording_handler() -> (impl Handler, mpsc::UnboundedReceiver<Recorded>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |channel: &str, payload: &str, error: Option<NotifyError>| {
        let _ = tx.send(Recorded {
            channel: channel.to_string(),
            payload: payload.to_string(),
            error: error.map(|e| e.kind()),
        });
    };
    (handler, rx)
}
