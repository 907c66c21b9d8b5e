//! Thread-safe metrics collection
//!
//! One [`MetricsCollector`] is owned per connection manager and shared by
//! `Arc` with whatever reports on it (health server, CLI). There is no global
//! instance.

use crate::manager::FailureKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic counters for the connection lifecycle and message flow
pub struct MetricsCollector {
    // Connection metrics
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connect_failures: AtomicU64,
    connections_lost: AtomicU64,
    credential_failures: AtomicU64,
    subscribe_failures: AtomicU64,
    retries_scheduled: AtomicU64,
    last_connected_at: AtomicU64,

    // Message metrics
    messages_received: AtomicU64,
    notifications_posted: AtomicU64,
    notifications_tagged: AtomicU64,
    last_message_at: AtomicU64,

    // Lifecycle metrics
    state: Mutex<String>,
    state_transitions: AtomicU64,
    started_at: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            credential_failures: AtomicU64::new(0),
            subscribe_failures: AtomicU64::new(0),
            retries_scheduled: AtomicU64::new(0),
            last_connected_at: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            notifications_posted: AtomicU64::new(0),
            notifications_tagged: AtomicU64::new(0),
            last_message_at: AtomicU64::new(0),
            state: Mutex::new("disconnected".to_string()),
            state_transitions: AtomicU64::new(0),
            started_at: current_timestamp(),
        }
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.last_connected_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Count a failure by what caused it
    pub fn connection_failed(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::ConnectFailed => &self.connect_failures,
            FailureKind::ConnectionLost => &self.connections_lost,
            FailureKind::SubscribeFailed => &self.subscribe_failures,
            FailureKind::Credential => &self.credential_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn notification_posted(&self, tagged: bool) {
        if tagged {
            self.notifications_tagged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_posted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_state(&self, state: &str) {
        if let Ok(mut current) = self.state.lock() {
            *current = state.to_string();
        }
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let state = self
            .state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            timestamp: now,
            connection: ConnectionMetrics {
                attempts: self.connection_attempts.load(Ordering::Relaxed),
                established: self.connections_established.load(Ordering::Relaxed),
                connect_failures: self.connect_failures.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                credential_failures: self.credential_failures.load(Ordering::Relaxed),
                subscribe_failures: self.subscribe_failures.load(Ordering::Relaxed),
                retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
                last_connected_at: self.last_connected_at.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                notifications_posted: self.notifications_posted.load(Ordering::Relaxed),
                notifications_tagged: self.notifications_tagged.load(Ordering::Relaxed),
                last_message_at: self.last_message_at.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                state,
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                uptime_seconds: now.saturating_sub(self.started_at),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub connection: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub lifecycle: LifecycleMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    pub attempts: u64,
    pub established: u64,
    pub connect_failures: u64,
    pub connections_lost: u64,
    pub credential_failures: u64,
    pub subscribe_failures: u64,
    pub retries_scheduled: u64,
    pub last_connected_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub notifications_posted: u64,
    pub notifications_tagged: u64,
    pub last_message_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleMetrics {
    pub state: String,
    pub state_transitions: u64,
    pub uptime_seconds: u64,
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_counted_by_kind() {
        let metrics = MetricsCollector::new();
        metrics.connection_failed(FailureKind::ConnectFailed);
        metrics.connection_failed(FailureKind::ConnectFailed);
        metrics.connection_failed(FailureKind::ConnectionLost);
        metrics.connection_failed(FailureKind::SubscribeFailed);
        metrics.connection_failed(FailureKind::Credential);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connection.connect_failures, 2);
        assert_eq!(snapshot.connection.connections_lost, 1);
        assert_eq!(snapshot.connection.subscribe_failures, 1);
        assert_eq!(snapshot.connection.credential_failures, 1);
    }

    #[test]
    fn test_message_and_notification_counters() {
        let metrics = MetricsCollector::new();
        metrics.message_received();
        metrics.message_received();
        metrics.notification_posted(true);
        metrics.notification_posted(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages.received, 2);
        assert_eq!(snapshot.messages.notifications_tagged, 1);
        assert_eq!(snapshot.messages.notifications_posted, 1);
        assert!(snapshot.messages.last_message_at > 0);
    }

    #[test]
    fn test_state_tracking() {
        let metrics = MetricsCollector::new();
        assert_eq!(metrics.snapshot().lifecycle.state, "disconnected");

        metrics.set_state("connecting");
        metrics.set_state("connected");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lifecycle.state, "connected");
        assert_eq!(snapshot.lifecycle.state_transitions, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsCollector::new();
        metrics.connection_attempt();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["connection"]["attempts"], 1);
        assert_eq!(json["lifecycle"]["state"], "disconnected");
    }
}
