//! MQTT 3.1.1 transport over TLS
//!
//! - [`connection`] - broker endpoint parsing and option construction (pure)
//! - [`message_handler`] - rumqttc event routing (pure)
//! - [`client`] - session ownership and the event-loop poller (I/O)

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{RumqttSession, RumqttTransport};
pub use connection::{configure_mqtt_options, BrokerEndpoint, DEFAULT_TLS_PORT};
pub use message_handler::{route_event, EventRoute};
