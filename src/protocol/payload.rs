//! Inbound message to notification payload resolution
//!
//! Message bodies are either plain text or a JSON object with optional
//! `title`, `body`, `priority` and `tag` fields. Resolution never fails: any
//! body that is not a usable JSON object is treated as plain text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Notification urgency, ordered from least to most intrusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Map a delivery QoS onto a priority: 0 → low, 1 → normal, 2 → urgent.
    ///
    /// Values outside the legal MQTT range map to `High`.
    pub fn from_qos(qos: u8) -> Self {
        match qos {
            0 => Priority::Low,
            1 => Priority::Normal,
            2 => Priority::Urgent,
            _ => Priority::High,
        }
    }

    /// Case-insensitive parse of `low`, `normal`, `high` or `urgent`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Urgent,
        ]
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification derived from one inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    /// Dedup tag: payloads sharing a tag occupy the same notification slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Resolve a raw message into a notification payload
pub fn resolve(topic: &str, body: &[u8], qos: u8) -> NotificationPayload {
    let decoded = String::from_utf8_lossy(body);
    let text = decoded.trim();
    let qos_priority = Priority::from_qos(qos);

    if looks_like_object(text) {
        if let Ok(fields) = serde_json::from_str::<Map<String, Value>>(text) {
            return from_fields(&fields, topic, text, qos_priority);
        }
        tracing::debug!(topic = %topic, "Message body is not a JSON object, using plain text");
    }

    plain_text(topic, text, qos_priority)
}

fn looks_like_object(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

fn from_fields(
    fields: &Map<String, Value>,
    topic: &str,
    raw: &str,
    qos_priority: Priority,
) -> NotificationPayload {
    NotificationPayload {
        title: non_blank_field(fields, "title").unwrap_or_else(|| topic.to_string()),
        body: non_blank_field(fields, "body").unwrap_or_else(|| raw.to_string()),
        priority: non_blank_field(fields, "priority")
            .and_then(|value| Priority::parse(&value))
            .unwrap_or(qos_priority),
        tag: non_blank_field(fields, "tag"),
    }
}

fn plain_text(topic: &str, text: &str, priority: Priority) -> NotificationPayload {
    NotificationPayload {
        title: topic.to_string(),
        body: text.to_string(),
        priority,
        tag: None,
    }
}

/// Loosely-typed field lookup: strings are taken as-is, numbers and booleans
/// are rendered, anything else counts as absent.
fn non_blank_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match fields.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!value.trim().is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_body_overrides_qos_priority() {
        let payload = resolve(
            "t",
            br#"{"title":"X","body":"Y","priority":"high","tag":"k"}"#,
            0,
        );
        assert_eq!(
            payload,
            NotificationPayload {
                title: "X".to_string(),
                body: "Y".to_string(),
                priority: Priority::High,
                tag: Some("k".to_string()),
            }
        );
    }

    #[test]
    fn test_plain_text_uses_topic_and_qos() {
        let payload = resolve("t", b"plain text", 2);
        assert_eq!(payload.title, "t");
        assert_eq!(payload.body, "plain text");
        assert_eq!(payload.priority, Priority::Urgent);
        assert_eq!(payload.tag, None);
    }

    #[test]
    fn test_malformed_json_falls_back_to_plain_text() {
        let payload = resolve("t", b"{not json", 1);
        assert_eq!(payload.title, "t");
        assert_eq!(payload.body, "{not json");
        assert_eq!(payload.priority, Priority::Normal);
        assert_eq!(payload.tag, None);

        let payload = resolve("t", b"{not: json}", 1);
        assert_eq!(payload.body, "{not: json}");
        assert_eq!(payload.tag, None);
    }

    #[test]
    fn test_body_is_trimmed() {
        let payload = resolve("t", b"  \n hello \t", 1);
        assert_eq!(payload.body, "hello");
    }

    #[test]
    fn test_missing_fields_default() {
        let raw = r#"{"tag":"door"}"#;
        let payload = resolve("home/door", raw.as_bytes(), 0);
        assert_eq!(payload.title, "home/door");
        assert_eq!(payload.body, raw);
        assert_eq!(payload.priority, Priority::Low);
        assert_eq!(payload.tag.as_deref(), Some("door"));
    }

    #[test]
    fn test_blank_fields_count_as_absent() {
        let payload = resolve(
            "t",
            br#"{"title":"  ","body":"","priority":" ","tag":"   "}"#,
            1,
        );
        assert_eq!(payload.title, "t");
        assert_eq!(payload.priority, Priority::Normal);
        assert_eq!(payload.tag, None);
    }

    #[test]
    fn test_unrecognised_priority_falls_back_to_qos() {
        let payload = resolve("t", br#"{"body":"b","priority":"critical"}"#, 2);
        assert_eq!(payload.priority, Priority::Urgent);
    }

    #[test]
    fn test_priority_is_case_insensitive() {
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
        assert_eq!(Priority::parse("Low"), Some(Priority::Low));
        assert_eq!(Priority::parse(" normal "), Some(Priority::Normal));
        assert_eq!(Priority::parse("nope"), None);
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(Priority::from_qos(0), Priority::Low);
        assert_eq!(Priority::from_qos(1), Priority::Normal);
        assert_eq!(Priority::from_qos(2), Priority::Urgent);
        assert_eq!(Priority::from_qos(7), Priority::High);
    }

    #[test]
    fn test_loose_typing_of_fields() {
        let payload = resolve("t", br#"{"title":42,"body":true,"tag":{"x":1}}"#, 1);
        assert_eq!(payload.title, "42");
        assert_eq!(payload.body, "true");
        assert_eq!(payload.tag, None);
    }

    #[test]
    fn test_json_array_is_plain_text() {
        let payload = resolve("t", br#"[{"title":"x"}]"#, 1);
        assert_eq!(payload.title, "t");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let payload = resolve("t", &[0x68, 0x69, 0xff], 1);
        assert!(payload.body.starts_with("hi"));
    }
}
