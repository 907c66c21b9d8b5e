//! Transport layer for the broker session
//!
//! The connection manager talks to the network only through the [`Transport`]
//! and [`Session`] traits. Network outcomes (handshake result, link loss,
//! subscription rejection, inbound messages) are not returned from calls: they
//! are delivered as [`SessionEvent`] values into the manager's mailbox through
//! [`SessionEvents`], so the state machine has a single serialized input.

use crate::credentials::TlsSettings;
use crate::manager::actor::Input;
use crate::protocol::TopicSubscription;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

pub use mqtt::{BrokerEndpoint, RumqttTransport};

/// Network-level failures; always retried by the manager
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error("Session closed")]
    SessionClosed,
}

/// Broker username and the environment variable holding its password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAuth {
    pub username: String,
    pub password_env: Option<String>,
}

/// Everything a transport needs to open one session
#[derive(Clone)]
pub struct SessionRequest {
    pub endpoint: BrokerEndpoint,
    pub client_id: String,
    pub auth: Option<BrokerAuth>,
    pub tls: TlsSettings,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

impl std::fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRequest")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("auth", &self.auth)
            .field("client_identity", &self.tls.client_identity)
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

/// One message delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retained: bool,
}

/// Network outcome reported by a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake completed; also sent again when the link reconnects implicitly
    Connected { session_present: bool },
    /// Handshake never completed
    ConnectFailed(String),
    /// An established link dropped
    ConnectionLost(String),
    /// The broker rejected a subscription
    SubscribeFailed(String),
    Message(InboundMessage),
}

/// Handle a session uses to report events to the manager.
///
/// Every handle is stamped with the generation of the session it belongs to;
/// events from superseded sessions are discarded by the manager.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<Input>,
}

impl SessionEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` once the manager has stopped.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(Input::Session {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn connected(&self, session_present: bool) -> bool {
        self.emit(SessionEvent::Connected { session_present })
    }

    pub fn connect_failed(&self, reason: impl Into<String>) -> bool {
        self.emit(SessionEvent::ConnectFailed(reason.into()))
    }

    pub fn connection_lost(&self, reason: impl Into<String>) -> bool {
        self.emit(SessionEvent::ConnectionLost(reason.into()))
    }

    pub fn subscribe_failed(&self, reason: impl Into<String>) -> bool {
        self.emit(SessionEvent::SubscribeFailed(reason.into()))
    }

    pub fn message(&self, message: InboundMessage) -> bool {
        self.emit(SessionEvent::Message(message))
    }
}

/// Factory for broker sessions.
///
/// `open` must return as soon as the session is started; the handshake result
/// arrives later as [`SessionEvent::Connected`] or
/// [`SessionEvent::ConnectFailed`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(
        &self,
        request: SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// A started broker session, exclusively owned by the connection manager
#[async_trait::async_trait]
pub trait Session: Send {
    /// Request subscriptions in the given order
    async fn subscribe(&mut self, subscriptions: &[TopicSubscription])
    -> Result<(), TransportError>;

    /// Best-effort disconnect; the session emits no further events afterwards
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_carry_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = SessionEvents::new(7, tx);
        assert!(events.connected(false));

        match rx.try_recv().unwrap() {
            Input::Session { generation, event } => {
                assert_eq!(generation, 7);
                assert_eq!(
                    event,
                    SessionEvent::Connected {
                        session_present: false
                    }
                );
            }
            _ => panic!("expected a session event"),
        }
    }

    #[test]
    fn test_emit_reports_stopped_manager() {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = SessionEvents::new(1, tx);
        drop(rx);
        assert!(!events.connection_lost("gone"));
    }
}
