//! Listeners: a predicate, a pattern and a callback.
//!
//! A [`Listener`] matches a message iff its predicate accepts the message,
//! the message has non-empty text, and the text matches the pattern. On a
//! match it builds a [`Response`] and runs the callback.

use std::sync::Arc;

use async_trait::async_trait;
use ferd_core::{BoxedTransport, InboundMessage, MessageObserver, ObserverResult, SubscriptionId};
use regex::Regex;
use tracing::{debug, info, trace};

use crate::callback::BoxedCallback;
use crate::error::{ListenerError, ListenerResult};
use crate::predicate::Predicate;
use crate::response::Response;

struct ListenerInner {
    predicate: Predicate,
    pattern: Regex,
    callback: BoxedCallback,
    transport: BoxedTransport,
}

/// A registered (predicate, pattern, callback) triple.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Creates a listener that replies through `transport`.
    pub fn new(
        predicate: Predicate,
        pattern: Regex,
        callback: BoxedCallback,
        transport: BoxedTransport,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                predicate,
                pattern,
                callback,
                transport,
            }),
        }
    }

    /// Returns the listener's pattern.
    pub fn pattern(&self) -> &Regex {
        &self.inner.pattern
    }

    /// Checks if this listener should handle `message`.
    pub fn matches(&self, message: &InboundMessage) -> bool {
        let Some(text) = message.text().filter(|text| !text.is_empty()) else {
            return false;
        };
        (self.inner.predicate)(message) && self.inner.pattern.is_match(text)
    }

    /// Runs the callback if the listener matches.
    ///
    /// Returns `Ok(true)` if the callback ran, `Ok(false)` if the message did
    /// not match.
    pub async fn execute(&self, message: Arc<InboundMessage>) -> ListenerResult<bool> {
        if !self.matches(&message) {
            trace!(pattern = %self.inner.pattern, "Listener did not match, skipping");
            return Ok(false);
        }

        debug!(
            pattern = %self.inner.pattern,
            user_id = message.user_id().unwrap_or("-"),
            "Listener matched, invoking callback"
        );

        let response = Response::new(
            self.inner.pattern.clone(),
            message,
            Arc::clone(&self.inner.transport),
        );

        self.inner
            .callback
            .call(response)
            .await
            .map(|()| true)
            .map_err(|e| ListenerError::callback(self.inner.pattern.as_str(), e))
    }
}

#[async_trait]
impl MessageObserver for Listener {
    async fn on_next(&self, message: Arc<InboundMessage>) -> ObserverResult {
        self.execute(message).await?;
        Ok(())
    }

    fn on_complete(&self, id: SubscriptionId) {
        info!(listener_id = id, pattern = %self.inner.pattern, "Completed");
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("pattern", &self.inner.pattern.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::into_callback;
    use crate::predicate;
    use ferd_core::{MemoryTransport, RawMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(text: &str) -> Arc<InboundMessage> {
        Arc::new(InboundMessage::from_raw(RawMessage::message("U1", "C1", text)).unwrap())
    }

    fn counting(pattern: &str, hits: Arc<AtomicUsize>) -> Listener {
        Listener::new(
            predicate::always(),
            Regex::new(pattern).unwrap(),
            into_callback(move |_res: Response| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Arc::new(MemoryTransport::new()),
        )
    }

    #[test]
    fn test_anchored_pattern_is_not_substring() {
        let listener = counting("^ping$", Arc::new(AtomicUsize::new(0)));
        assert!(listener.matches(&msg("ping")));
        assert!(!listener.matches(&msg("pingpong")));

        let loose = counting("ping", Arc::new(AtomicUsize::new(0)));
        assert!(loose.matches(&msg("pingpong")));
    }

    #[test]
    fn test_text_is_required() {
        let listener = counting(".*", Arc::new(AtomicUsize::new(0)));
        assert!(!listener.matches(&msg("")));

        let raw = RawMessage {
            kind: "message".into(),
            user: Some("U1".into()),
            ..Default::default()
        };
        assert!(!listener.matches(&InboundMessage::from_raw(raw).unwrap()));
    }

    #[test]
    fn test_predicate_gates_pattern() {
        let listener = Listener::new(
            predicate::from_user("U2"),
            Regex::new(".*").unwrap(),
            into_callback(|_res: Response| async {}),
            Arc::new(MemoryTransport::new()),
        );
        assert!(!listener.matches(&msg("anything")));
    }

    #[test]
    fn test_execute_reports_match() {
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = counting("^ping$", Arc::clone(&hits));

        let matched = tokio_test::block_on(listener.execute(msg("ping"))).unwrap();
        let missed = tokio_test::block_on(listener.execute(msg("pong"))).unwrap();

        assert!(matched);
        assert!(!missed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_error_is_wrapped() {
        let listener = Listener::new(
            predicate::always(),
            Regex::new("fail").unwrap(),
            into_callback(|_res: Response| async { Err::<(), _>(anyhow::anyhow!("nope")) }),
            Arc::new(MemoryTransport::new()),
        );

        let err = listener.execute(msg("fail")).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(listener.execute(msg("ok")).await.is_ok());
    }
}
