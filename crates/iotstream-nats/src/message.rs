use async_nats::HeaderMap;
use bytes::Bytes;
use serde::Serialize;

use crate::headers::{message_key, set_parent_from_headers};

/// A message as fetched from the broker, before any decoding
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub subject: String,
    pub key: Option<String>,
    pub headers: Option<HeaderMap>,
    pub payload: Bytes,
}

impl BrokerMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            key: None,
            headers: None,
            payload: payload.into(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Link the current span to the trace that published this message
    pub fn attach_trace_parent(&self) {
        if let Some(headers) = &self.headers {
            set_parent_from_headers(headers);
        }
    }
}

impl From<async_nats::jetstream::Message> for BrokerMessage {
    fn from(message: async_nats::jetstream::Message) -> Self {
        let message = message.message;
        Self {
            subject: message.subject.to_string(),
            key: message.headers.as_ref().and_then(message_key),
            headers: message.headers,
            payload: message.payload,
        }
    }
}

/// Subject filter covering every message of a topic
pub fn topic_subjects(topic: &str) -> String {
    format!("{}.>", topic)
}

/// Subject a keyed message is published on
///
/// Keys are arbitrary strings while subject tokens may not contain `.`, `*`,
/// `>` or whitespace; those characters become `_`. An absent or empty key
/// maps to the `_` token.
pub fn publish_subject(topic: &str, key: Option<&str>) -> String {
    let token: String = match key {
        Some(key) if !key.is_empty() => key
            .chars()
            .map(|c| match c {
                '.' | '*' | '>' => '_',
                c if c.is_whitespace() => '_',
                c => c,
            })
            .collect(),
        _ => "_".to_string(),
    };
    format!("{}.{}", topic, token)
}

/// UTF-8 JSON encoding used for every published value
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(value).map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_subject_sanitizes_key() {
        assert_eq!(publish_subject("events", Some("dev-1")), "events.dev-1");
        assert_eq!(publish_subject("events", Some("a.b c>*")), "events.a_b_c__");
        assert_eq!(publish_subject("events", Some("")), "events._");
        assert_eq!(publish_subject("events", None), "events._");
    }

    #[test]
    fn test_topic_subjects_is_wildcard() {
        assert_eq!(topic_subjects("iot_stream_v1"), "iot_stream_v1.>");
    }

    #[test]
    fn test_encode_json_is_compact_utf8() {
        let payload = encode_json(&serde_json::json!({"device_id": "dev-1", "reading_value": 1.5}))
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&payload).unwrap(),
            r#"{"device_id":"dev-1","reading_value":1.5}"#
        );
    }

    #[test]
    fn test_broker_message_builder() {
        let message = BrokerMessage::new("iot_stream_v1._", "{}").with_key("dev-1");
        assert_eq!(message.key.as_deref(), Some("dev-1"));
        assert!(message.headers.is_none());
        // no headers: no-op
        message.attach_trace_parent();
    }
}
