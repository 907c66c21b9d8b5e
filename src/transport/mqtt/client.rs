//! rumqttc-backed transport
//!
//! Each session owns one `AsyncClient` and one poller task driving its
//! `EventLoop`. The poller reports the first failure and stops: reconnecting
//! is the connection manager's job, so the event loop's own retry is never
//! used.

use super::connection::configure_mqtt_options;
use super::message_handler::{build_subscribe_filters, route_event, EventRoute};
use crate::protocol::TopicSubscription;
use crate::transport::{Session, SessionEvents, SessionRequest, Transport, TransportError};
use rumqttc::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Capacity of the request channel between `AsyncClient` and `EventLoop`
const REQUEST_CAPACITY: usize = 10;

/// How long a closing poller may take to flush the disconnect packet
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Production [`Transport`] built on rumqttc
#[derive(Debug, Default, Clone, Copy)]
pub struct RumqttTransport;

impl RumqttTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transport for RumqttTransport {
    async fn open(
        &self,
        request: SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn Session>, TransportError> {
        let options = configure_mqtt_options(&request);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));

        info!(
            endpoint = %request.endpoint,
            client_id = %request.client_id,
            mutual_tls = request.tls.client_identity,
            "Opening MQTT session"
        );

        let poller = tokio::spawn(run_event_loop(event_loop, events, closing.clone()));

        Ok(Box::new(RumqttSession {
            client,
            closing,
            poller: Some(poller),
        }))
    }
}

/// Drive one event loop until the session fails or is closed
async fn run_event_loop(mut event_loop: EventLoop, events: SessionEvents, closing: Arc<AtomicBool>) {
    let generation = events.generation();
    let mut acknowledged = false;

    loop {
        let result = event_loop.poll().await;
        if closing.load(Ordering::SeqCst) {
            debug!(generation, "Session closing, stopping event loop");
            break;
        }

        match result {
            Ok(event) => match route_event(&event) {
                EventRoute::ConnectionAcknowledged { session_present } => {
                    acknowledged = true;
                    if !events.connected(session_present) {
                        break;
                    }
                }
                EventRoute::MessageReceived(message) => {
                    if !events.message(message) {
                        break;
                    }
                }
                EventRoute::SubscriptionAcknowledged(Ok(())) => {
                    debug!(generation, "Subscriptions acknowledged");
                }
                EventRoute::SubscriptionAcknowledged(Err(reason)) => {
                    events.subscribe_failed(reason);
                }
                EventRoute::Disconnected => {
                    events.connection_lost("broker closed the session");
                    break;
                }
                EventRoute::LocalDisconnect => break,
                EventRoute::Infrastructure => {
                    trace!(generation, event = ?event, "MQTT infrastructure event");
                }
            },
            Err(e) => {
                if acknowledged {
                    events.connection_lost(e.to_string());
                } else {
                    events.connect_failed(e.to_string());
                }
                break;
            }
        }
    }

    debug!(generation, "MQTT event loop stopped");
}

/// A live rumqttc session
pub struct RumqttSession {
    client: AsyncClient,
    closing: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl Session for RumqttSession {
    async fn subscribe(
        &mut self,
        subscriptions: &[TopicSubscription],
    ) -> Result<(), TransportError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TransportError::SessionClosed);
        }

        self.client
            .subscribe_many(build_subscribe_filters(subscriptions))
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        if self.poller.as_ref().map_or(true, |handle| handle.is_finished()) {
            // Event loop already gone, nothing to flush
            self.poller = None;
            return Ok(());
        }

        let result = self
            .client
            .try_disconnect()
            .map_err(|e| TransportError::DisconnectFailed(e.to_string()));

        // Give the poller time to write the disconnect packet without
        // holding up the caller
        if let Some(mut handle) = self.poller.take() {
            tokio::spawn(async move {
                if tokio::time::timeout(DISCONNECT_GRACE, &mut handle)
                    .await
                    .is_err()
                {
                    warn!("MQTT event loop didn't stop gracefully, forcing abort");
                    handle.abort();
                }
            });
        }

        result
    }
}

impl Drop for RumqttSession {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}
