//! Connection state and its observers

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// What failed when the manager entered `Retrying`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The handshake never completed (DNS, TCP, TLS, broker refusal)
    ConnectFailed,
    /// An established session dropped
    ConnectionLost,
    /// The broker rejected or never acknowledged a required subscription
    SubscribeFailed,
    /// The client identity could not be resolved
    Credential,
}

/// Error carried by a `Retrying` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCause {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureCause {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Lifecycle of one logical broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Retrying {
        attempt: u32,
        delay: Duration,
        cause: Option<FailureCause>,
    },
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Retrying { .. } => "retrying",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Canonical owner of the current state.
///
/// Every subscriber gets its own unbounded queue, so no intermediate state is
/// dropped for slow consumers; `watch` receivers only see the latest value.
pub struct StatePublisher {
    current: watch::Sender<ConnectionState>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ConnectionState>>>,
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePublisher {
    pub fn new() -> Self {
        let (current, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            current,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current.borrow().clone()
    }

    /// Latest-value view, suitable for polling consumers
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.current.subscribe()
    }

    /// Ordered stream of every transition, starting with the current state.
    /// See [`StateSubscription`] for the buffering contract.
    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = tx.send(self.current.borrow().clone());
        listeners.push(tx);
        StateSubscription { rx }
    }

    /// Record a transition. Publishing the current state again is a no-op.
    pub(crate) fn publish(&self, next: ConnectionState) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = self.current.borrow().clone();
        if previous == next {
            return false;
        }

        log_transition(&previous, &next);
        self.current.send_replace(next.clone());
        listeners.retain(|tx| tx.send(next.clone()).is_ok());
        true
    }
}

fn log_transition(from: &ConnectionState, to: &ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("MQTT session established");
        }
        (ConnectionState::Connected, ConnectionState::Retrying { cause, .. }) => {
            warn!(cause = ?cause, "MQTT session lost");
        }
        (_, ConnectionState::Retrying { attempt, delay, cause }) => {
            warn!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                cause = ?cause,
                "Scheduling MQTT reconnection"
            );
        }
        (_, ConnectionState::Disconnected) => {
            info!("MQTT session stopped");
        }
        _ => {
            info!("MQTT connection state: {} -> {}", from.name(), to.name());
        }
    }
}

/// Receiving end of [`StatePublisher::subscribe`]
///
/// The queue is unbounded so that no transition is ever lost. A subscription
/// that is kept but never read buffers every transition, which grows without
/// limit during a long retry storm. Drop subscriptions you stop reading, or use
/// [`StatePublisher::watch`] when only the latest state matters.
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<ConnectionState>,
}

impl StateSubscription {
    /// Wait for the next transition; `None` once the publisher is gone
    pub async fn next(&mut self) -> Option<ConnectionState> {
        self.rx.recv().await
    }

    /// Next already-published transition, if any
    pub fn try_next(&mut self) -> Option<ConnectionState> {
        match self.rx.try_recv() {
            Ok(state) => Some(state),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                error!("State publisher dropped while subscription still active");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrying(attempt: u32) -> ConnectionState {
        ConnectionState::Retrying {
            attempt,
            delay: Duration::from_secs(1),
            cause: Some(FailureCause::new(FailureKind::ConnectFailed, "refused")),
        }
    }

    #[test]
    fn test_subscription_starts_with_current_state() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();
        assert_eq!(sub.try_next(), Some(ConnectionState::Disconnected));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_every_transition_is_delivered_in_order() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();

        publisher.publish(ConnectionState::Connecting);
        publisher.publish(retrying(1));
        publisher.publish(ConnectionState::Connecting);
        publisher.publish(ConnectionState::Connected);

        let seen: Vec<ConnectionState> = std::iter::from_fn(|| sub.try_next()).collect();
        assert_eq!(
            seen,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                retrying(1),
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[test]
    fn test_duplicate_publish_is_ignored() {
        let publisher = StatePublisher::new();
        assert!(publisher.publish(ConnectionState::Connecting));
        assert!(!publisher.publish(ConnectionState::Connecting));
        assert_eq!(publisher.current(), ConnectionState::Connecting);
    }

    #[test]
    fn test_late_subscriber_sees_latest_state_only() {
        let publisher = StatePublisher::new();
        publisher.publish(ConnectionState::Connecting);
        publisher.publish(ConnectionState::Connected);

        let mut sub = publisher.subscribe();
        assert_eq!(sub.try_next(), Some(ConnectionState::Connected));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_watch_reflects_current() {
        let publisher = StatePublisher::new();
        let rx = publisher.watch();
        publisher.publish(ConnectionState::Connected);
        assert!(rx.borrow().is_connected());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let publisher = StatePublisher::new();
        let sub = publisher.subscribe();
        drop(sub);
        publisher.publish(ConnectionState::Connecting);
        assert!(publisher.listeners.lock().unwrap().is_empty());
    }

    #[test]
    fn test_idle_subscriber_keeps_every_transition() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();

        for attempt in 1..=50 {
            publisher.publish(ConnectionState::Connecting);
            publisher.publish(ConnectionState::Retrying {
                attempt,
                delay: Duration::from_secs(1),
                cause: None,
            });
        }

        assert_eq!(sub.try_next(), Some(ConnectionState::Disconnected));
        let mut received = 0;
        while let Some(state) = sub.try_next() {
            if let ConnectionState::Retrying { attempt, .. } = state {
                assert_eq!(attempt, received / 2 + 1);
            }
            received += 1;
        }
        assert_eq!(received, 100);
    }
}
