//! Wire formats handled by the client
//!
//! Two formats are in scope: subscription spec strings (`filter` or
//! `filter:qos`) and inbound message bodies, optionally carrying a JSON
//! object that describes the notification to show.

pub mod payload;
pub mod topics;

pub use payload::{resolve, NotificationPayload, Priority};
pub use topics::{parse, parse_all, SubscriptionError, TopicFilterError, TopicSubscription};
