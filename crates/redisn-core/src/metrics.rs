//! Metrics instrumentation for subscription sessions.
//!
//! Uses the `metrics` facade; nothing is recorded unless the application
//! installs a recorder (the `redisn` binary installs a Prometheus exporter).

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "redisn_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "redisn_sessions_active";
    pub const NOTIFICATIONS_TOTAL: &str = "redisn_notifications_total";
    pub const TERMINATIONS_TOTAL: &str = "redisn_session_terminations_total";
    pub const ERRORS_TOTAL: &str = "redisn_errors_total";
}

/// Describe all metrics.
pub fn describe() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of subscription sessions started"
    );
    metrics::describe_gauge!(
        names::SESSIONS_ACTIVE,
        "Current number of listening sessions"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_TOTAL,
        "Total number of messages delivered to handlers"
    );
    metrics::describe_counter!(
        names::TERMINATIONS_TOTAL,
        "Total number of session terminations by reason"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors by type");
}

/// Record a session that entered the listening state.
pub fn record_session_started() {
    counter!(names::SESSIONS_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

/// Record a session termination.
pub fn record_session_terminated(reason: &'static str) {
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
    counter!(names::TERMINATIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record a message delivered to a handler.
pub fn record_notification(pattern: bool) {
    let kind = if pattern { "pmessage" } else { "message" };
    counter!(names::NOTIFICATIONS_TOTAL, "kind" => kind).increment(1);
}

/// Record an error.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // No recorder installed: calls must be no-ops
        describe();
        record_session_started();
        record_notification(true);
        record_error("transport");
        record_session_terminated("drained");
    }
}
