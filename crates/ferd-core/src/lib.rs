//! # Ferd Core
//!
//! The foundation of the Ferd chat bot: how raw transport events become one
//! shared, re-filterable message stream.
//!
//! This crate provides:
//! - **Message model**: [`RawMessage`] from the transport, normalized into [`InboundMessage`]
//! - **Transport contract**: the [`Transport`] trait the external chat client implements
//! - **Identity bootstrap**: [`IdentityCell`], filled once by the transport's ready signal
//! - **Message stream**: [`MessageStream`], a lazily attached multicast stream
//! - **Handles**: [`Subscription`] and [`CompositeSubscription`], both [`Disposable`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌───────────┐
//! │  Transport  │────▶│ MessageStream │────▶│ Observer  │
//! │  (Slack..)  │     │  (one pump)   │────▶│ Observer  │
//! └─────────────┘     └───────────────┘────▶│ Observer  │
//!                                           └───────────┘
//! ```
//!
//! Listener matching, replies and sessions are built on top of this in
//! `ferd-framework`.

pub mod error;
pub mod identity;
pub mod message;
pub mod stream;
pub mod subscription;
pub mod transport;

pub use error::{ObserverError, ObserverResult, TransportError, TransportResult};
pub use identity::{Identity, IdentityCell};
pub use message::{InboundMessage, MESSAGE_KIND, RawMessage};
pub use stream::{MessageObserver, MessageStream};
pub use subscription::{
    CompositeSubscription, Disposable, ListenerState, Subscription, SubscriptionId,
};
pub use transport::{
    BoxedTransport, MemoryTransport, SentMessage, Transport, TransportEvent, UserInfo,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Disposable, Identity, InboundMessage, MessageObserver, MessageStream, Subscription,
        Transport, TransportEvent,
    };
}
