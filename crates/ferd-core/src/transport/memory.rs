//! In-process transport.
//!
//! [`MemoryTransport`] has no network side: events are pushed in by the
//! caller and replies are recorded instead of sent. It accepts sends whether
//! or not it is connected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{Transport, TransportEvent, UserInfo};
use crate::error::TransportResult;
use crate::identity::Identity;
use crate::message::RawMessage;

const DEFAULT_CAPACITY: usize = 256;

/// A reply recorded by [`MemoryTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target channel.
    pub channel: String,
    /// Reply text.
    pub text: String,
}

/// A transport that lives entirely in memory.
///
/// ```rust,ignore
/// let transport = Arc::new(
///     MemoryTransport::new()
///         .with_identity(Identity::new("ferd", "U0"))
///         .with_user(UserInfo::new("U1", "alice")),
/// );
/// transport.connect().await?;            // emits Ready
/// transport.message("U1", "C1", "hi");   // emits a message event
/// assert_eq!(transport.sent_texts(), vec!["..."]);
/// ```
pub struct MemoryTransport {
    events: broadcast::Sender<TransportEvent>,
    identity: Option<Identity>,
    users: RwLock<HashMap<String, UserInfo>>,
    sent: Mutex<Vec<SentMessage>>,
    connected: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates a transport with the default event buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a transport whose event buffer holds `capacity` events per
    /// subscriber before the slowest one starts lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            events,
            identity: None,
            users: RwLock::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Sets the identity announced by [`connect`](Transport::connect).
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Adds a user to the directory.
    pub fn with_user(self, user: UserInfo) -> Self {
        self.add_user(user);
        self
    }

    /// Adds or replaces a user in the directory.
    pub fn add_user(&self, user: UserInfo) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Pushes an event to every current subscriber.
    pub fn emit(&self, event: TransportEvent) {
        trace!(event = event.name(), "Emitting memory transport event");
        // No subscribers is fine: events are not buffered for latecomers.
        let _ = self.events.send(event);
    }

    /// Pushes a ready event carrying `identity`.
    pub fn ready(&self, identity: Identity) {
        self.emit(TransportEvent::Ready(identity));
    }

    /// Pushes a chat message from `user` on `channel`.
    pub fn message(&self, user: &str, channel: &str, text: &str) {
        self.emit(TransportEvent::Message(RawMessage::message(
            user, channel, text,
        )));
    }

    /// Pushes an arbitrary raw event.
    pub fn raw(&self, raw: RawMessage) {
        self.emit(TransportEvent::Message(raw));
    }

    /// Pushes a socket error.
    pub fn error(&self, reason: &str, code: i64) {
        self.emit(TransportEvent::Error {
            reason: reason.to_string(),
            code,
        });
    }

    /// Ends the event feed.
    pub fn close(&self) {
        self.emit(TransportEvent::Closed);
    }

    /// Returns every reply sent so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Returns the text of every reply sent so far.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.text.clone()).collect()
    }

    /// Returns the number of live receivers on the event feed.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Returns whether [`connect`](Transport::connect) has been called
    /// without a matching disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) -> TransportResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        debug!("Memory transport connected");
        if let Some(identity) = &self.identity {
            self.ready(identity.clone());
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("Memory transport disconnected");
            self.close();
        }
        Ok(())
    }

    async fn send(&self, channel: &str, text: &str) -> TransportResult<()> {
        self.sent.lock().push(SentMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn user(&self, user_id: &str) -> Option<UserInfo> {
        self.users.read().get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_announces_identity() {
        let transport = MemoryTransport::new().with_identity(Identity::new("ferd", "U0"));
        let mut rx = transport.subscribe();

        transport.connect().await.unwrap();

        match rx.recv().await.unwrap() {
            TransportEvent::Ready(identity) => assert_eq!(identity.name, "ferd"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_closes_feed_once() {
        let transport = MemoryTransport::new();
        let mut rx = transport.subscribe();

        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        transport.message("U1", "C1", "after");

        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Closed));
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Message(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_records_replies() {
        let transport = MemoryTransport::new();
        transport.send("C1", "one").await.unwrap();
        transport.send("C2", "two").await.unwrap();

        assert_eq!(transport.sent_texts(), vec!["one", "two"]);
        assert_eq!(transport.sent()[1].channel, "C2");
    }

    #[test]
    fn test_user_directory() {
        let transport = MemoryTransport::new().with_user(UserInfo::new("U1", "alice"));
        assert_eq!(
            transport.user("U1").and_then(|u| u.name),
            Some("alice".to_string())
        );
        assert!(transport.user("U2").is_none());
    }
}
