//! Subscription handles and disposal.
//!
//! Every registration on a [`MessageStream`](crate::MessageStream) returns a
//! [`Subscription`]. Disposing it is idempotent and guarantees that the
//! observer sees no message dispatched after the call returns; an invocation
//! already running when `dispose` is called is allowed to finish.
//!
//! Dropping a `Subscription` does **not** dispose it. Handles are cheap to
//! clone and every clone controls the same observer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::stream::{MessageObserver, StreamInner};

/// Identifier of a subscription, unique within one stream.
pub type SubscriptionId = u64;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ListenerState {
    /// Receiving messages.
    Active = 0,
    /// Stopped by an explicit dispose.
    Disposed = 1,
    /// Stopped because its observer failed while handling a message.
    Failed = 2,
    /// Stopped because the stream completed.
    Completed = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Disposed,
            2 => Self::Failed,
            _ => Self::Completed,
        }
    }
}

/// Something that can be permanently switched off.
pub trait Disposable: Send + Sync {
    /// Stops future deliveries. Calling it again is a no-op.
    fn dispose(&self);

    /// Returns `true` once nothing more will be delivered, whatever the cause.
    fn is_closed(&self) -> bool;
}

/// Per-subscription slot stored in the stream's observer table.
///
/// The observer is released when the slot closes, so handles kept around
/// after disposal do not pin the observer's captured state.
pub(crate) struct ObserverSlot {
    state: AtomicU8,
    observer: Mutex<Option<Arc<dyn MessageObserver>>>,
}

impl ObserverSlot {
    pub(crate) fn new(observer: Arc<dyn MessageObserver>) -> Self {
        Self {
            state: AtomicU8::new(ListenerState::Active as u8),
            observer: Mutex::new(Some(observer)),
        }
    }

    /// A slot that starts out closed, holding no observer.
    pub(crate) fn closed(state: ListenerState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
            observer: Mutex::new(None),
        }
    }

    /// Returns the observer while the slot is active.
    pub(crate) fn observer(&self) -> Option<Arc<dyn MessageObserver>> {
        if !self.is_active() {
            return None;
        }
        self.observer.lock().clone()
    }

    pub(crate) fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == ListenerState::Active
    }

    /// Moves an active slot to `to` and hands back the released observer.
    /// Returns `None` if the slot had already left the active state.
    pub(crate) fn close(&self, to: ListenerState) -> Option<Arc<dyn MessageObserver>> {
        self.state
            .compare_exchange(
                ListenerState::Active as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()?;
        self.observer.lock().take()
    }
}

/// Handle to a single observer registered on a stream.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    slot: Arc<ObserverSlot>,
    stream: Weak<StreamInner>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, slot: Arc<ObserverSlot>, stream: Weak<StreamInner>) -> Self {
        Self { id, slot, stream }
    }

    /// Returns the subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.slot.state()
    }

    /// Returns `true` while the observer still receives messages.
    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        if self.slot.close(ListenerState::Disposed).is_none() {
            return;
        }
        if let Some(stream) = self.stream.upgrade() {
            stream.remove(self.id);
        }
        debug!(listener_id = self.id, "Listener disposed");
    }

    fn is_closed(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// A group of subscriptions disposed together.
///
/// All children are switched off before [`dispose`](Disposable::dispose)
/// returns, so no caller can observe some of them still active afterwards.
#[derive(Debug, Clone, Default)]
pub struct CompositeSubscription {
    children: Vec<Subscription>,
}

impl CompositeSubscription {
    /// Creates a composite over `children`.
    pub fn new(children: Vec<Subscription>) -> Self {
        Self { children }
    }

    /// Returns the child handles.
    pub fn children(&self) -> &[Subscription] {
        &self.children
    }
}

impl Disposable for CompositeSubscription {
    fn dispose(&self) {
        // Flip every flag first so a dispatch in progress skips all children
        // from here on, then drop them from the observer tables.
        let closed: Vec<&Subscription> = self
            .children
            .iter()
            .filter(|child| child.slot.close(ListenerState::Disposed).is_some())
            .collect();

        for child in closed {
            if let Some(stream) = child.stream.upgrade() {
                stream.remove(child.id);
            }
            debug!(listener_id = child.id, "Listener disposed");
        }
    }

    fn is_closed(&self) -> bool {
        self.children.iter().all(|child| !child.is_active())
    }
}
