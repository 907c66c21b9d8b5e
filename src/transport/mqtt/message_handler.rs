//! Pure routing of rumqttc events
//!
//! The poller task feeds every event through [`route_event`] and acts on the
//! resulting [`EventRoute`]; nothing here performs I/O.

use crate::protocol::TopicSubscription;
use crate::transport::InboundMessage;
use rumqttc::{Event, Outgoing, Packet, QoS, SubscribeFilter, SubscribeReasonCode};

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged { session_present: bool },
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Subscription acknowledged; `Err` lists the rejected positions
    SubscriptionAcknowledged(Result<(), String>),
    /// Broker closed the session
    Disconnected,
    /// Our own disconnect request has been written
    LocalDisconnect,
    /// Keep-alive and acknowledgement traffic
    Infrastructure,
}

/// Route a rumqttc event (pure function)
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(connack)) => EventRoute::ConnectionAcknowledged {
            session_present: connack.session_present,
        },
        Event::Incoming(Packet::Publish(publish)) => {
            EventRoute::MessageReceived(InboundMessage {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
                qos: qos_level(publish.qos),
                retained: publish.retain,
            })
        }
        Event::Incoming(Packet::SubAck(suback)) => {
            EventRoute::SubscriptionAcknowledged(validate_subscription_success(
                &suback.return_codes,
            ))
        }
        Event::Incoming(Packet::Disconnect) => EventRoute::Disconnected,
        Event::Outgoing(Outgoing::Disconnect) => EventRoute::LocalDisconnect,
        _ => EventRoute::Infrastructure,
    }
}

/// Check SubAck return codes (pure function)
pub fn validate_subscription_success(return_codes: &[SubscribeReasonCode]) -> Result<(), String> {
    let rejected: Vec<usize> = return_codes
        .iter()
        .enumerate()
        .filter(|(_, code)| matches!(code, SubscribeReasonCode::Failure))
        .map(|(index, _)| index)
        .collect();

    if rejected.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "broker rejected subscriptions at positions {rejected:?}"
        ))
    }
}

/// Validated QoS level to rumqttc QoS
pub fn to_qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Subscribe filters in caller order
pub fn build_subscribe_filters(subscriptions: &[TopicSubscription]) -> Vec<SubscribeFilter> {
    subscriptions
        .iter()
        .map(|sub| SubscribeFilter::new(sub.filter().to_string(), to_qos(sub.qos())))
        .collect()
}
