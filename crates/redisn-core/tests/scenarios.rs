//! End-to-end subscription scenarios against a fake connection and pool.

use async_trait::async_trait;
use redisn_core::{NotifyError, SessionState, Subscriber, Termination};
use redisn_protocol::Reply;
use redisn_transport::{Connection, ConnectionId, Pool, TransportError};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Log {
    sent: Vec<Vec<String>>,
    reads_started: usize,
    reads: usize,
    closed: bool,
}

struct FakeConnection {
    id: ConnectionId,
    replies: mpsc::UnboundedReceiver<Result<Reply, TransportError>>,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_no_wait(&mut self, args: &[String]) -> Result<(), TransportError> {
        self.log.lock().unwrap().sent.push(args.to_vec());
        Ok(())
    }

    async fn read(&mut self) -> Result<Reply, TransportError> {
        self.log.lock().unwrap().reads_started += 1;
        let next = self.replies.recv().await;
        self.log.lock().unwrap().reads += 1;
        next.unwrap_or(Err(TransportError::ConnectionClosed))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.log.lock().unwrap().closed
    }
}

#[derive(Default)]
struct FakePool {
    idle: Mutex<Option<Box<dyn Connection>>>,
    acquired: Mutex<usize>,
    released: Mutex<usize>,
}

#[async_trait]
impl Pool for FakePool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
        *self.acquired.lock().unwrap() += 1;
        self.idle
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::ConnectFailed("exhausted".to_string()))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        *self.released.lock().unwrap() += 1;
        *self.idle.lock().unwrap() = Some(conn);
    }
}

struct Fixture {
    pool: Arc<FakePool>,
    replies: mpsc::UnboundedSender<Result<Reply, TransportError>>,
    log: Arc<Mutex<Log>>,
}

impl Fixture {
    fn new() -> Self {
        let (replies, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(Log::default()));
        let conn = FakeConnection {
            id: ConnectionId::generate(),
            replies: rx,
            log: log.clone(),
        };
        let pool = Arc::new(FakePool::default());
        *pool.idle.lock().unwrap() = Some(Box::new(conn));
        Self { pool, replies, log }
    }

    fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.pool.clone())
    }

    fn push(&self, items: &[&str], count: Option<i64>) {
        let mut replies: Vec<Reply> = items.iter().map(|s| Reply::from(*s)).collect();
        if let Some(n) = count {
            replies.push(Reply::Integer(n));
        }
        let _ = self.replies.send(Ok(Reply::Array(replies)));
    }

    fn acquired(&self) -> usize {
        *self.pool.acquired.lock().unwrap()
    }

    fn released(&self) -> usize {
        *self.pool.released.lock().unwrap()
    }

    fn reads(&self) -> usize {
        self.log.lock().unwrap().reads
    }

    fn reads_started(&self) -> usize {
        self.log.lock().unwrap().reads_started
    }
}

type Calls = Arc<Mutex<Vec<(String, String, Option<String>)>>>;

fn recorder() -> (impl FnMut(&str, &str, Option<NotifyError>) + Send + 'static, Calls) {
    let calls: Calls = Arc::default();
    let sink = calls.clone();
    let handler = move |channel: &str, payload: &str, error: Option<NotifyError>| {
        sink.lock()
            .unwrap()
            .push((channel.to_string(), payload.to_string(), error.map(|e| e.to_string())));
    };
    (handler, calls)
}

fn message(channel: &str, payload: &str) -> (String, String, Option<String>) {
    (channel.to_string(), payload.to_string(), None)
}

#[tokio::test]
async fn test_subscribe_single_key() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "news"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["news"]).await.unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(subscriber.state(), Some(SessionState::Listening));
    assert_eq!(fixture.acquired(), 1);
    assert_eq!(fixture.released(), 0);
}

#[tokio::test]
async fn test_message_reaches_handler_once() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "news"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["news"]).await.unwrap();

    fixture.push(&["message", "news", "hello"], None);
    fixture.push(&["unsubscribe", "news"], Some(0));
    assert_eq!(subscriber.join().await, Some(Termination::Drained));

    assert_eq!(*calls.lock().unwrap(), vec![message("news", "hello")]);
}

#[tokio::test]
async fn test_unsubscribe_drains_session() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "news"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["news"]).await.unwrap();
    let mut state = subscriber.watch_state().unwrap();

    subscriber.unsubscribe("UNSUBSCRIBE", &["news"]).await.unwrap();
    fixture.push(&["unsubscribe", "news"], Some(0));

    state
        .wait_for(|s| *s == SessionState::Terminated)
        .await
        .unwrap();
    assert_eq!(subscriber.join().await, Some(Termination::Drained));

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(fixture.released(), 1);
    assert!(!fixture.log.lock().unwrap().closed);
    // One handshake read plus the drain ack, and no read left pending
    assert_eq!(fixture.reads(), 2);
    assert_eq!(fixture.reads_started(), 2);
    assert_eq!(
        fixture.log.lock().unwrap().sent,
        vec![vec!["SUBSCRIBE", "news"], vec!["UNSUBSCRIBE", "news"]]
    );
}

#[tokio::test]
async fn test_multi_key_handshake_reads() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "a"], Some(1));
    fixture.push(&["subscribe", "b"], Some(2));
    subscriber.subscribe("subscribe", handler, &["a", "b"]).await.unwrap();

    // The dispatcher has not run yet on this single-threaded runtime
    assert_eq!(fixture.reads(), 2);
    assert_eq!(fixture.reads_started(), 2);
    assert!(calls.lock().unwrap().is_empty());

    assert_eq!(subscriber.cancel().await, Some(Termination::Cancelled));
}

#[tokio::test]
async fn test_unsupported_verb_skips_pool() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, _calls) = recorder();

    let err = subscriber.subscribe("GET", handler, &["news"]).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "the given command 'GET' is not supported by subscribe. Please use 'SUBSCRIBE' or 'PSUBSCRIBE'"
    );
    assert_eq!(fixture.acquired(), 0);
    assert!(fixture.log.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn test_messages_keep_arrival_order() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["psubscribe", "news.*"], Some(1));
    subscriber.subscribe("PSUBSCRIBE", handler, &["news.*"]).await.unwrap();

    for i in 0..20 {
        let payload = i.to_string();
        fixture.push(&["pmessage", "news.*", "news.uk", &payload], None);
    }
    fixture.push(&["punsubscribe", "news.*"], Some(0));
    assert_eq!(subscriber.join().await, Some(Termination::Drained));

    let expected: Vec<_> = (0..20)
        .map(|i| message("news.uk", &i.to_string()))
        .collect();
    assert_eq!(*calls.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_unexpected_reply_terminates_with_error() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "news"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["news"]).await.unwrap();

    let _ = fixture.replies.send(Ok(Reply::Integer(42)));
    assert_eq!(subscriber.join().await, Some(Termination::Failed));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "");
    assert!(calls[0].2.is_some());
    assert_eq!(fixture.released(), 1);
    assert_eq!(fixture.reads_started(), 2);
    // Still subscribed server-side, so it must not be reused
    assert!(fixture.log.lock().unwrap().closed);
}

#[tokio::test]
async fn test_handshake_failure_releases_connection() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, calls) = recorder();

    fixture.push(&["subscribe", "a"], Some(1));
    let _ = fixture
        .replies
        .send(Ok(Reply::Error("ERR max subscriptions".to_string())));

    let err = subscriber.subscribe("SUBSCRIBE", handler, &["a", "b"]).await.unwrap_err();
    assert_eq!(err.to_string(), "failed to subscribe to key: b");
    assert_eq!(fixture.released(), 1);
    assert!(fixture.log.lock().unwrap().closed);
    assert!(calls.lock().unwrap().is_empty());
    assert!(subscriber.state().is_none());
}

#[tokio::test]
async fn test_duplicate_keys_rejected() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, _calls) = recorder();

    let err = subscriber.subscribe("SUBSCRIBE", handler, &["a", "a"]).await.unwrap_err();
    assert!(matches!(err, NotifyError::InvalidKeys(_)));
    assert_eq!(fixture.acquired(), 0);
}

#[tokio::test]
async fn test_unsubscribe_requires_session() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();

    let err = subscriber.unsubscribe("UNSUBSCRIBE", &["news"]).await.unwrap_err();
    assert!(matches!(err, NotifyError::NoActiveSession));
    assert_eq!(fixture.acquired(), 0);
}

#[tokio::test]
async fn test_follow_up_subscribe_extends_session() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (first, first_calls) = recorder();
    let (second, second_calls) = recorder();

    fixture.push(&["subscribe", "a"], Some(1));
    subscriber.subscribe("SUBSCRIBE", first, &["a"]).await.unwrap();

    fixture.push(&["message", "a", "before"], None);
    while first_calls.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    fixture.push(&["psubscribe", "b*"], Some(2));
    subscriber.subscribe("PSUBSCRIBE", second, &["b*"]).await.unwrap();

    fixture.push(&["pmessage", "b*", "bee", "after"], None);
    fixture.push(&["unsubscribe", "a"], Some(1));
    fixture.push(&["punsubscribe", "b*"], Some(0));
    assert_eq!(subscriber.join().await, Some(Termination::Drained));

    assert_eq!(*first_calls.lock().unwrap(), vec![message("a", "before")]);
    assert_eq!(*second_calls.lock().unwrap(), vec![message("bee", "after")]);
    assert_eq!(fixture.acquired(), 1);
    assert_eq!(fixture.released(), 1);
}

#[tokio::test]
async fn test_new_session_after_termination() {
    let fixture = Fixture::new();
    let mut subscriber = fixture.subscriber();
    let (handler, _calls) = recorder();

    fixture.push(&["subscribe", "a"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["a"]).await.unwrap();
    fixture.push(&["unsubscribe", "a"], Some(0));
    assert_eq!(subscriber.join().await, Some(Termination::Drained));

    let (handler, _calls) = recorder();
    fixture.push(&["subscribe", "b"], Some(1));
    subscriber.subscribe("SUBSCRIBE", handler, &["b"]).await.unwrap();

    assert_eq!(fixture.acquired(), 2);
    assert_eq!(subscriber.state(), Some(SessionState::Listening));
    assert_eq!(subscriber.cancel().await, Some(Termination::Cancelled));
    assert_eq!(fixture.released(), 2);
}
