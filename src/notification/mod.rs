//! Notification sinks
//!
//! The connection manager hands every resolved payload to a
//! [`NotificationSink`] through [`deliver`], which applies the dedup policy:
//! tagged payloads go to [`NotificationSink::post_tagged`] and replace the
//! previous notification under the same tag, untagged payloads are posted as
//! independent notifications.

use crate::protocol::NotificationPayload;
use std::sync::Arc;
use tracing::{debug, info};

pub mod board;
pub mod recorder;

pub use board::{NotificationBoard, Slot, SlotKey};
pub use recorder::FileRecorder;

/// Renders notifications
pub trait NotificationSink: Send + Sync {
    /// Post an independent notification
    fn post(&self, payload: &NotificationPayload);

    /// Post a notification replacing any existing one under `tag`
    fn post_tagged(&self, tag: &str, payload: &NotificationPayload);
}

/// How a payload was handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Posted,
    Tagged,
}

/// Route a payload to the sink according to its tag
pub fn deliver(sink: &dyn NotificationSink, payload: &NotificationPayload) -> Delivery {
    match payload.tag.as_deref() {
        Some(tag) => {
            sink.post_tagged(tag, payload);
            Delivery::Tagged
        }
        None => {
            sink.post(payload);
            Delivery::Posted
        }
    }
}

/// Writes notifications to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn post(&self, payload: &NotificationPayload) {
        info!(
            title = %payload.title,
            priority = %payload.priority,
            "Notification"
        );
        debug!(title = %payload.title, body = %payload.body, "Notification body");
    }

    fn post_tagged(&self, tag: &str, payload: &NotificationPayload) {
        info!(
            title = %payload.title,
            priority = %payload.priority,
            tag = %tag,
            "Notification"
        );
        debug!(title = %payload.title, body = %payload.body, "Notification body");
    }
}

/// Forwards every notification to several sinks in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for FanoutSink {
    fn post(&self, payload: &NotificationPayload) {
        for sink in &self.sinks {
            sink.post(payload);
        }
    }

    fn post_tagged(&self, tag: &str, payload: &NotificationPayload) {
        for sink in &self.sinks {
            sink.post_tagged(tag, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::resolve;

    #[test]
    fn test_deliver_routes_by_tag() {
        let board = NotificationBoard::new();

        let tagged = resolve("home/door", br#"{"body":"open","tag":"door"}"#, 1);
        assert_eq!(deliver(&board, &tagged), Delivery::Tagged);

        let plain = resolve("home/door", b"closed", 1);
        assert_eq!(deliver(&board, &plain), Delivery::Posted);

        assert_eq!(board.len(), 2);
        assert!(board.get_tagged("door").is_some());
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(NotificationBoard::new());
        let second = Arc::new(NotificationBoard::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(LogSink));
        assert_eq!(fanout.len(), 3);

        let payload = resolve("t", br#"{"body":"b","tag":"k"}"#, 0);
        deliver(&fanout, &payload);
        deliver(&fanout, &payload);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
