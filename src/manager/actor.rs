//! The serialized state-machine worker
//!
//! Commands from [`ConnectionManager`](super::ConnectionManager), network
//! events from the live session and retry timer expiries all arrive on one
//! mailbox and are handled one at a time. Every session and every retry timer
//! is stamped with a generation; anything stamped with an older generation
//! than the worker's current one is discarded.

use super::backoff::BackoffPolicy;
use super::state::{ConnectionState, FailureCause, FailureKind, StatePublisher};
use super::ValidatedConfig;
use crate::credentials::CredentialProvider;
use crate::notification::{deliver, Delivery, NotificationSink};
use crate::observability::MetricsCollector;
use crate::protocol::resolve;
use crate::transport::{InboundMessage, Session, SessionEvent, SessionEvents, Transport};
use crate::{lifecycle_span, session_span};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn, Instrument};

/// Everything the worker reacts to
#[derive(Debug)]
pub(crate) enum Input {
    Connect {
        config: Box<ValidatedConfig>,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Session {
        generation: u64,
        event: SessionEvent,
    },
    RetryElapsed {
        generation: u64,
    },
    /// The owning manager was dropped
    Shutdown,
}

pub(crate) struct Worker {
    transport: Arc<dyn Transport>,
    credentials: CredentialProvider,
    sink: Arc<dyn NotificationSink>,
    backoff: BackoffPolicy,
    metrics: Arc<MetricsCollector>,
    publisher: Arc<StatePublisher>,
    inbox: mpsc::UnboundedSender<Input>,

    config: Option<Arc<ValidatedConfig>>,
    session: Option<Box<dyn Session>>,
    generation: u64,
    attempt: u32,
    retry_timer: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialProvider,
        sink: Arc<dyn NotificationSink>,
        backoff: BackoffPolicy,
        metrics: Arc<MetricsCollector>,
        publisher: Arc<StatePublisher>,
        inbox: mpsc::UnboundedSender<Input>,
    ) -> Self {
        Self {
            transport,
            credentials,
            sink,
            backoff,
            metrics,
            publisher,
            inbox,
            config: None,
            session: None,
            generation: 0,
            attempt: 0,
            retry_timer: None,
        }
    }

    /// Runs until [`Input::Shutdown`]; the worker holds its own sender, so
    /// the mailbox never closes on its own.
    pub(crate) async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Connect { config, reply } => {
                    let span = lifecycle_span!(command = "connect", client_id = %config.source.client_id);
                    self.handle_connect(*config).instrument(span).await;
                    let _ = reply.send(());
                }
                Input::Disconnect { reply } => {
                    self.handle_disconnect()
                        .instrument(lifecycle_span!(command = "disconnect"))
                        .await;
                    let _ = reply.send(());
                }
                Input::Session { generation, event } => {
                    if generation != self.generation {
                        trace!(generation, current = self.generation, "Dropping stale session event");
                        continue;
                    }
                    self.handle_session_event(event).await;
                }
                Input::RetryElapsed { generation } => {
                    self.handle_retry_elapsed(generation).await;
                }
                Input::Shutdown => break,
            }
        }

        self.cancel_retry();
        self.teardown_session().await;
        debug!("Connection manager worker stopped");
    }

    fn current_state(&self) -> ConnectionState {
        self.publisher.current()
    }

    fn publish(&self, state: ConnectionState) {
        let name = state.name();
        if self.publisher.publish(state) {
            self.metrics.set_state(name);
        }
    }

    async fn handle_connect(&mut self, config: ValidatedConfig) {
        let active = matches!(
            self.current_state(),
            ConnectionState::Connecting | ConnectionState::Connected
        );
        if active
            && self.session.is_some()
            && self.config.as_deref().map(|c| &c.source) == Some(&config.source)
        {
            debug!("Configuration unchanged, keeping the active session");
            return;
        }

        self.cancel_retry();
        self.teardown_session().await;
        self.config = Some(Arc::new(config));
        self.attempt = 0;
        self.start_session().await;
    }

    async fn handle_disconnect(&mut self) {
        self.cancel_retry();
        self.generation += 1;
        self.teardown_session().await;
        self.config = None;
        self.attempt = 0;
        self.publish(ConnectionState::Disconnected);
    }

    async fn handle_retry_elapsed(&mut self, generation: u64) {
        if generation != self.generation
            || !matches!(self.current_state(), ConnectionState::Retrying { .. })
        {
            trace!(generation, "Ignoring superseded retry timer");
            return;
        }

        self.retry_timer = None;
        debug!(attempt = self.attempt, "Retry delay elapsed, reconnecting");
        self.start_session().await;
    }

    async fn start_session(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        self.publish(ConnectionState::Connecting);
        self.metrics.connection_attempt();

        let tls = match self
            .credentials
            .build_tls_config(config.source.credential_alias())
        {
            Ok(tls) => tls,
            Err(e) => {
                self.fail(FailureCause::new(FailureKind::Credential, e.to_string()))
                    .await;
                return;
            }
        };

        let events = SessionEvents::new(generation, self.inbox.clone());
        let span = session_span!(generation, endpoint = %config.endpoint);
        match self
            .transport
            .open(config.session_request(tls), events)
            .instrument(span)
            .await
        {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                self.fail(FailureCause::new(FailureKind::ConnectFailed, e.to_string()))
                    .await;
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { session_present } => {
                self.on_connected(session_present).await;
            }
            SessionEvent::ConnectFailed(reason) => {
                self.fail(FailureCause::new(FailureKind::ConnectFailed, reason))
                    .await;
            }
            SessionEvent::ConnectionLost(reason) => {
                self.fail(FailureCause::new(FailureKind::ConnectionLost, reason))
                    .await;
            }
            SessionEvent::SubscribeFailed(reason) => {
                self.fail(FailureCause::new(FailureKind::SubscribeFailed, reason))
                    .await;
            }
            SessionEvent::Message(message) => self.on_message(message),
        }
    }

    async fn on_connected(&mut self, session_present: bool) {
        let Some(config) = self.config.clone() else {
            return;
        };

        self.attempt = 0;
        if self.current_state().is_connected() {
            info!("Link reconnected, re-issuing subscriptions");
        } else {
            self.metrics.connection_established();
            self.publish(ConnectionState::Connected);
        }
        debug!(session_present, "Broker acknowledged the connection");

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = session.subscribe(&config.subscriptions).await;
        match result {
            Ok(()) => {
                info!(count = config.subscriptions.len(), "Subscriptions requested");
            }
            Err(e) => {
                self.fail(FailureCause::new(FailureKind::SubscribeFailed, e.to_string()))
                    .await;
            }
        }
    }

    fn on_message(&self, message: InboundMessage) {
        self.metrics.message_received();
        debug!(
            topic = %message.topic,
            qos = message.qos,
            retained = message.retained,
            bytes = message.payload.len(),
            "Message received"
        );

        let payload = resolve(&message.topic, &message.payload, message.qos);
        let delivery = deliver(self.sink.as_ref(), &payload);
        self.metrics
            .notification_posted(delivery == Delivery::Tagged);
    }

    /// Drop the failed session and schedule the next attempt
    async fn fail(&mut self, cause: FailureCause) {
        self.teardown_session().await;
        self.generation += 1;
        self.metrics.connection_failed(cause.kind);

        self.attempt = self.attempt.saturating_add(1);
        let delay = self.backoff.next_delay(self.attempt);
        self.publish(ConnectionState::Retrying {
            attempt: self.attempt,
            delay,
            cause: Some(cause),
        });
        self.schedule_retry(delay);
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry();
        self.metrics.retry_scheduled();

        let generation = self.generation;
        let inbox = self.inbox.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Input::RetryElapsed { generation });
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    /// Best-effort disconnect of the current session; failures are only logged
    async fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.disconnect().await {
                warn!(error = %e, "Session disconnect failed");
            }
        }
    }
}
