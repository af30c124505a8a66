//! # redisn
//!
//! Subscribes to channels and patterns and logs every notification.
//!
//! ## Usage
//!
//! ```bash
//! # Subscribe using redisn.toml
//! redisn
//!
//! # Subscribe using a specific config file (no environment layering)
//! redisn /path/to/redisn.toml
//!
//! # Subscribe using environment variables
//! REDISN_PORT=6380 REDISN_SUBSCRIBE__CHANNELS=news,sport redisn
//! ```
//!
//! Ctrl-C unsubscribes and waits for the session to drain.

mod config;
mod metrics;

use anyhow::{bail, Context, Result};
use redisn_core::{NotifyError, SessionState, Subscriber, Termination};
use redisn_transport::{ConnectionPool, TcpConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redisn=info,redisn_core=info,redisn_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };
    let targets = &config.subscribe;
    if targets.channels.is_empty() && targets.patterns.is_empty() {
        bail!("Nothing to subscribe to: set subscribe.channels or subscribe.patterns");
    }

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }
    metrics::init_metrics();

    info!("Connecting to {}", config.addr());
    let connector = TcpConnector::new(config.addr(), config.pool.connect_timeout());
    let pool = Arc::new(ConnectionPool::with_config(
        connector,
        config.pool.to_pool_config(),
    ));
    let mut subscriber = Subscriber::with_config(pool, config.subscriber.to_subscriber_config());

    if !targets.channels.is_empty() {
        subscriber
            .subscribe("SUBSCRIBE", log_notification, &targets.channels)
            .await
            .context("Failed to subscribe to channels")?;
    }
    if !targets.patterns.is_empty() {
        subscriber
            .subscribe("PSUBSCRIBE", log_notification, &targets.patterns)
            .await
            .context("Failed to subscribe to patterns")?;
    }

    let mut state = subscriber
        .watch_state()
        .context("Subscription session is not running")?;

    let termination = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, unsubscribing");
            shutdown(
                &mut subscriber,
                !targets.channels.is_empty(),
                !targets.patterns.is_empty(),
                config.shutdown.drain_timeout(),
            )
            .await
        }
        _ = state.wait_for(|s| *s == SessionState::Terminated) => subscriber.join().await,
    };

    match termination {
        Some(reason) => info!(reason = reason.as_str(), "Subscription session ended"),
        None => warn!("Subscription session ended abnormally"),
    }
    Ok(())
}

fn log_notification(channel: &str, payload: &str, error: Option<NotifyError>) {
    match error {
        Some(e) => warn!(error = %e, "Subscription session failed"),
        None => info!(channel = %channel, "{}", payload),
    }
}

/// Unsubscribe from everything, then wait for the drain or cancel.
async fn shutdown(
    subscriber: &mut Subscriber,
    channels: bool,
    patterns: bool,
    drain_timeout: Duration,
) -> Option<Termination> {
    let everything: [&str; 0] = [];
    let verbs = [("UNSUBSCRIBE", channels), ("PUNSUBSCRIBE", patterns)];

    for (verb, _) in verbs.iter().filter(|(_, active)| *active) {
        if let Err(e) = subscriber.unsubscribe(verb, &everything).await {
            warn!(verb = %verb, error = %e, "Unsubscribe failed");
        }
    }

    match tokio::time::timeout(drain_timeout, subscriber.join()).await {
        Ok(termination) => termination,
        Err(_) => {
            warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                "Session did not drain in time, cancelling"
            );
            subscriber.cancel().await
        }
    }
}
