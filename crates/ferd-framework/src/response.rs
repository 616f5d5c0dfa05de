//! The value handed to a listener callback.

use std::sync::Arc;

use ferd_core::{BoxedTransport, InboundMessage, TransportError, TransportResult, UserInfo};
use regex::Regex;
use tracing::debug;

/// A matched message together with the means to answer it.
///
/// Cheap to clone; the message is shared with every other listener that
/// matched it.
#[derive(Clone)]
pub struct Response {
    pattern: Regex,
    message: Arc<InboundMessage>,
    transport: BoxedTransport,
}

impl Response {
    pub(crate) fn new(pattern: Regex, message: Arc<InboundMessage>, transport: BoxedTransport) -> Self {
        Self {
            pattern,
            message,
            transport,
        }
    }

    /// Returns the matched message.
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// Returns the sender id, if the message has one.
    pub fn user_id(&self) -> Option<&str> {
        self.message.user_id()
    }

    /// Returns the channel the message arrived on.
    pub fn channel(&self) -> Option<&str> {
        self.message.channel()
    }

    /// Returns the message text. Always non-empty for a matched message.
    pub fn text(&self) -> &str {
        self.message.text().unwrap_or_default()
    }

    /// Returns the listener's pattern.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Returns capture group `index` of the first match (0 is the whole match).
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.pattern
            .captures(self.text())
            .and_then(|caps| caps.get(index))
            .map(|m| m.as_str())
    }

    /// Returns the named capture group `name` of the first match.
    pub fn named(&self, name: &str) -> Option<&str> {
        self.pattern
            .captures(self.text())
            .and_then(|caps| caps.name(name))
            .map(|m| m.as_str())
    }

    /// Returns every capture group of the first match, in order.
    pub fn captures(&self) -> Vec<Option<String>> {
        self.pattern
            .captures(self.text())
            .map(|caps| {
                caps.iter()
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Looks up the sender in the transport's user directory.
    pub fn sender(&self) -> Option<UserInfo> {
        self.user_id().and_then(|id| self.transport.user(id))
    }

    /// Returns the sender's display name, if known.
    pub fn sender_name(&self) -> Option<String> {
        self.sender().and_then(|user| user.name)
    }

    /// Returns the transport the message came from.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Sends `text` to the channel the message came from.
    pub async fn send(&self, text: impl AsRef<str>) -> TransportResult<()> {
        let channel = self.channel().ok_or(TransportError::MissingChannel)?;
        let text = text.as_ref();
        debug!(channel = %channel, len = text.len(), "Sending reply");
        self.transport.send(channel, text).await
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("pattern", &self.pattern.as_str())
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferd_core::{MemoryTransport, RawMessage};

    fn response(pattern: &str, text: &str, transport: Arc<MemoryTransport>) -> Response {
        let message = InboundMessage::from_raw(RawMessage::message("U1", "C1", text)).unwrap();
        Response::new(Regex::new(pattern).unwrap(), Arc::new(message), transport)
    }

    #[test]
    fn test_captures() {
        let transport = Arc::new(MemoryTransport::new());
        let res = response(r"^deploy (\w+) to (?P<env>\w+)$", "deploy api to prod", transport);

        assert_eq!(res.capture(0), Some("deploy api to prod"));
        assert_eq!(res.capture(1), Some("api"));
        assert_eq!(res.named("env"), Some("prod"));
        assert_eq!(res.capture(3), None);
        assert_eq!(
            res.captures(),
            vec![
                Some("deploy api to prod".to_string()),
                Some("api".to_string()),
                Some("prod".to_string()),
            ]
        );
    }

    #[test]
    fn test_sender_lookup() {
        let transport = Arc::new(MemoryTransport::new().with_user(UserInfo::new("U1", "alice")));
        let res = response(".*", "hi", transport);
        assert_eq!(res.sender_name().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_send_replies_to_origin_channel() {
        let transport = Arc::new(MemoryTransport::new());
        let res = response("hi", "hi", transport.clone());

        res.send("hello back").await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "C1");
        assert_eq!(sent[0].text, "hello back");
    }

    #[tokio::test]
    async fn test_send_without_channel_fails() {
        let transport = Arc::new(MemoryTransport::new());
        let raw = RawMessage {
            kind: "message".into(),
            user: Some("U1".into()),
            text: Some("hi".into()),
            ..Default::default()
        };
        let message = InboundMessage::from_raw(raw).unwrap();
        let res = Response::new(Regex::new("hi").unwrap(), Arc::new(message), transport.clone());

        assert!(matches!(res.send("x").await, Err(TransportError::MissingChannel)));
        assert!(transport.sent().is_empty());
    }
}
