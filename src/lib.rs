//! mqtt-notify
//!
//! An always-on MQTT client that keeps a TLS-secured broker session alive and
//! turns inbound messages into prioritized, deduplicated notifications.
//!
//! # Overview
//!
//! - [`protocol`] - subscription spec parsing and message payload resolution
//! - [`credentials`] - client identity lookup and rustls configuration
//! - [`transport`] - the broker session seam and its rumqttc implementation
//! - [`manager`] - the connection lifecycle state machine
//! - [`notification`] - sinks that render resolved notifications
//! - [`config`] - the TOML configuration file
//! - [`observability`] - logging, metrics and health endpoints
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_notify::protocol::{resolve, topics, Priority};
//!
//! let sub = topics::parse("alerts/+/fire:2").unwrap();
//! assert_eq!(sub.filter(), "alerts/+/fire");
//! assert_eq!(sub.qos(), 2);
//!
//! let payload = resolve("alerts/kitchen/fire", br#"{"title":"Smoke","tag":"fire"}"#, 2);
//! assert_eq!(payload.title, "Smoke");
//! assert_eq!(payload.priority, Priority::Urgent);
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod notification;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{AppConfig, ConnectionConfig};
pub use error::{ConfigurationError, NotifyError, NotifyResult};
pub use manager::{ConnectionManager, ConnectionState};
pub use protocol::{NotificationPayload, Priority, TopicSubscription};
