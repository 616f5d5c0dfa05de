//! Transport contract for the Ferd core.
//!
//! The chat transport (socket, authentication, reconnects) lives outside this
//! crate. The core only needs three things from it:
//!
//! - a multicast feed of [`TransportEvent`]s ([`Transport::subscribe`]),
//! - a way to send text back to a channel ([`Transport::send`]),
//! - a user directory for resolving display names ([`Transport::user`]).
//!
//! [`MemoryTransport`](memory::MemoryTransport) is an in-process
//! implementation used by tests and local experiments.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::TransportResult;
use crate::identity::Identity;
use crate::message::RawMessage;

pub use memory::{MemoryTransport, SentMessage};

/// An event emitted by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The handshake completed; carries the bot's own identity.
    Ready(Identity),
    /// A raw event arrived. Only kind `"message"` reaches listeners.
    Message(RawMessage),
    /// A non-fatal socket error.
    Error {
        /// Human-readable reason.
        reason: String,
        /// Transport-specific error code.
        code: i64,
    },
    /// The connection closed; no further events follow.
    Closed,
}

impl TransportEvent {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Message(_) => "message",
            Self::Error { .. } => "error",
            Self::Closed => "closed",
        }
    }
}

/// A user known to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Transport-level user id.
    pub id: String,
    /// Display name, if the user has one.
    #[serde(default)]
    pub name: Option<String>,
}

impl UserInfo {
    /// Creates a user with a display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// The external real-time chat transport.
///
/// Implementations own the connection. [`subscribe`](Self::subscribe) must
/// return a receiver on a single shared channel: every call sees the same
/// events from the moment it subscribed, with no replay.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns the transport's name (e.g. `"slack"`).
    fn name(&self) -> &str;

    /// Subscribes to the transport's event feed.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Opens the connection. The transport emits [`TransportEvent::Ready`]
    /// once the handshake completes.
    async fn connect(&self) -> TransportResult<()>;

    /// Closes the connection. The transport should emit
    /// [`TransportEvent::Closed`] afterwards.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Sends `text` to `channel`.
    async fn send(&self, channel: &str, text: &str) -> TransportResult<()>;

    /// Looks up a user in the transport's directory.
    fn user(&self, user_id: &str) -> Option<UserInfo>;
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;
