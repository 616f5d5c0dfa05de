//! Normalized inbound chat messages.
//!
//! Transports hand the stream a [`RawMessage`] for every event they receive.
//! Only events whose kind is [`MESSAGE_KIND`] become an [`InboundMessage`];
//! everything else (presence changes, typing indicators, ...) is dropped at
//! the stream boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only event kind the stream forwards to listeners.
pub const MESSAGE_KIND: &str = "message";

/// A raw event as emitted by a transport, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Event kind reported by the transport (`"message"`, `"presence_change"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Id of the sending user, if the event has one.
    #[serde(default)]
    pub user: Option<String>,
    /// Channel the event arrived on.
    #[serde(default)]
    pub channel: Option<String>,
    /// Message text, if any.
    #[serde(default)]
    pub text: Option<String>,
    /// The untouched transport payload.
    #[serde(skip)]
    pub raw: Value,
}

impl RawMessage {
    /// Creates a raw event of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Creates a raw chat message event.
    pub fn message(
        user: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: MESSAGE_KIND.to_string(),
            user: Some(user.into()),
            channel: Some(channel.into()),
            text: Some(text.into()),
            raw: Value::Null,
        }
    }

    /// Parses a raw event from a JSON payload, keeping the payload in `raw`.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let mut raw = Self::deserialize(&value)?;
        raw.raw = value;
        Ok(raw)
    }

    /// Attaches the original transport payload.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

/// A normalized chat message, shared by every listener that sees it.
///
/// Produced once per transport event of kind [`MESSAGE_KIND`]. The stream
/// wraps it in an `Arc` and fans the same value out to all observers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Always [`MESSAGE_KIND`].
    pub kind: &'static str,
    /// Id of the sending user.
    pub user_id: Option<String>,
    /// Channel the message arrived on; replies go back here.
    pub channel: Option<String>,
    /// Message text. Listeners never match a message without text.
    pub text: Option<String>,
    /// The untouched transport payload.
    pub raw: Value,
}

impl InboundMessage {
    /// Normalizes a raw event, returning `None` for any kind other than
    /// [`MESSAGE_KIND`].
    pub fn from_raw(raw: RawMessage) -> Option<Self> {
        if raw.kind != MESSAGE_KIND {
            return None;
        }

        Some(Self {
            kind: MESSAGE_KIND,
            user_id: raw.user,
            channel: raw.channel,
            text: raw.text,
            raw: raw.raw,
        })
    }

    /// Returns the sender id, if present.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the channel id, if present.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Returns the message text, if present.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_message_kinds_are_dropped() {
        assert!(InboundMessage::from_raw(RawMessage::new("presence_change")).is_none());
        assert!(InboundMessage::from_raw(RawMessage::new("user_typing")).is_none());
    }

    #[test]
    fn test_message_kind_is_normalized() {
        let msg = InboundMessage::from_raw(RawMessage::message("U1", "C1", "hello")).unwrap();
        assert_eq!(msg.kind, MESSAGE_KIND);
        assert_eq!(msg.user_id(), Some("U1"));
        assert_eq!(msg.channel(), Some("C1"));
        assert_eq!(msg.text(), Some("hello"));
    }

    #[test]
    fn test_from_json_keeps_payload() {
        let payload = json!({
            "type": "message",
            "user": "U42",
            "channel": "C7",
            "text": "hi there",
            "ts": "1355517523.000005"
        });

        let raw = RawMessage::from_json(payload.clone()).unwrap();
        let msg = InboundMessage::from_raw(raw).unwrap();

        assert_eq!(msg.user_id(), Some("U42"));
        assert_eq!(msg.text(), Some("hi there"));
        assert_eq!(msg.raw, payload);
    }

    #[test]
    fn test_message_without_text() {
        let payload = json!({ "type": "message", "subtype": "channel_join", "user": "U1" });
        let msg = InboundMessage::from_raw(RawMessage::from_json(payload).unwrap()).unwrap();
        assert!(msg.text().is_none());
        assert!(msg.channel().is_none());
    }
}
