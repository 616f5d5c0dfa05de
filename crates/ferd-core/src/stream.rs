//! The shared inbound message stream.
//!
//! [`MessageStream`] turns a transport's event feed into one multicast
//! sequence of [`InboundMessage`]s. It subscribes to the transport exactly
//! once, on first use, and fans every message out to all registered
//! [`MessageObserver`]s.
//!
//! # Delivery model
//!
//! A single pump task reads transport events in arrival order:
//!
//! 1. `Ready` bootstraps the bot [`Identity`](crate::Identity) (first one wins)
//! 2. `Message` events of kind `"message"` are normalized and dispatched
//! 3. `Error` events are logged and otherwise ignored
//! 4. `Closed` (or the feed ending) completes the stream
//!
//! Dispatching one message visits a snapshot of the observers taken when the
//! message arrives, in subscription order, awaiting each one before moving
//! on. The next message is not read until every observer has finished with
//! the current one. Observers subscribed while a message is being dispatched
//! first see the following message.
//!
//! An observer that returns an error or panics is logged and unsubscribed;
//! the other observers and the stream itself carry on.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, error, info, span, trace, warn};

use crate::error::ObserverResult;
use crate::identity::IdentityCell;
use crate::message::{InboundMessage, MESSAGE_KIND};
use crate::subscription::{ListenerState, ObserverSlot, Subscription, SubscriptionId};
use crate::transport::{BoxedTransport, TransportEvent};

/// Receives messages from a [`MessageStream`].
#[async_trait]
pub trait MessageObserver: Send + Sync + 'static {
    /// Handles one message. Returning an error unsubscribes this observer.
    async fn on_next(&self, message: Arc<InboundMessage>) -> ObserverResult;

    /// Called once when the stream completes while this observer is active,
    /// or immediately when subscribing to an already completed stream.
    fn on_complete(&self, _id: SubscriptionId) {}
}

enum Phase {
    /// Not yet subscribed to the transport.
    Idle,
    /// Subscribed, waiting for an async runtime to run the pump on.
    Attached(broadcast::Receiver<TransportEvent>),
    Running,
    Completed,
}

/// Counts events the pump has not necessarily seen yet, for [`MessageStream::flush`].
struct Probe {
    rx: Option<broadcast::Receiver<TransportEvent>>,
    seen: u64,
}

pub(crate) struct StreamInner {
    transport: BoxedTransport,
    identity: IdentityCell,
    observers: Mutex<BTreeMap<SubscriptionId, Arc<ObserverSlot>>>,
    next_id: AtomicU64,
    phase: Mutex<Phase>,
    probe: Mutex<Probe>,
    /// Number of transport events fully handled by the pump.
    consumed: watch::Sender<u64>,
    completed: AtomicBool,
    shutdown: CancellationToken,
}

impl StreamInner {
    pub(crate) fn remove(&self, id: SubscriptionId) {
        self.observers.lock().remove(&id);
    }

    /// Handles one transport event. Returns `true` when the feed is over.
    async fn handle_event(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Ready(identity) => {
                let name = identity.name.clone();
                let id = identity.id.clone();
                if self.identity.bootstrap(identity) {
                    info!(name = %name, id = %id, "Bot identity bootstrapped");
                } else {
                    debug!(name = %name, "Identity already known, ignoring ready signal");
                }
            }
            TransportEvent::Message(raw) => {
                if raw.kind != MESSAGE_KIND {
                    trace!(kind = %raw.kind, "Skipping non-message event");
                    return false;
                }
                if let Some(message) = InboundMessage::from_raw(raw) {
                    self.dispatch(Arc::new(message)).await;
                }
            }
            TransportEvent::Error { reason, code } => {
                warn!(reason = %reason, code, "Transport socket error");
            }
            TransportEvent::Closed => {
                info!(transport = self.transport.name(), "Transport closed");
                return true;
            }
        }
        false
    }

    async fn dispatch(&self, message: Arc<InboundMessage>) {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            user_id = message.user_id().unwrap_or("-")
        );

        async {
            let snapshot: Vec<(SubscriptionId, Arc<ObserverSlot>)> = self
                .observers
                .lock()
                .iter()
                .map(|(id, slot)| (*id, Arc::clone(slot)))
                .collect();

            trace!(observers = snapshot.len(), "Dispatching message");

            for (id, slot) in snapshot {
                // Disposed by an earlier observer of this same message.
                let Some(observer) = slot.observer() else {
                    continue;
                };

                let outcome = AssertUnwindSafe(observer.on_next(Arc::clone(&message)))
                    .catch_unwind()
                    .await;

                let failure = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e.to_string(),
                    Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
                };

                error!(listener_id = id, error = %failure, "Listener failed, unsubscribing");
                if slot.close(ListenerState::Failed).is_some() {
                    self.remove(id);
                }
            }
        }
        .instrument(span)
        .await;
    }

    fn complete(&self) {
        let drained = {
            let mut observers = self.observers.lock();
            if self.completed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *observers)
        };

        *self.phase.lock() = Phase::Completed;
        self.consumed.send_modify(|_| ());

        info!(listeners = drained.len(), "Message stream completed");
        for (id, slot) in drained {
            if let Some(observer) = slot.close(ListenerState::Completed) {
                observer.on_complete(id);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

async fn pump(inner: Arc<StreamInner>, mut rx: broadcast::Receiver<TransportEvent>) {
    debug!(transport = inner.transport.name(), "Message pump started");

    loop {
        let received = tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => break,
            received = rx.recv() => received,
        };

        match received {
            Ok(event) => {
                let closed = inner.handle_event(event).await;
                inner.consumed.send_modify(|n| *n += 1);
                if closed {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Message stream fell behind the transport, events dropped");
                inner.consumed.send_modify(|n| *n += skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    inner.complete();
}

/// A lazily attached, multicast stream of inbound messages.
///
/// Cloning the stream shares it.
///
/// # Example
///
/// ```rust,ignore
/// use ferd_core::{MessageStream, MemoryTransport};
///
/// let transport = Arc::new(MemoryTransport::new());
/// let stream = MessageStream::new(transport.clone());
///
/// let sub = stream.subscribe(Arc::new(MyObserver));
/// transport.message("U1", "C1", "hello");
/// stream.flush().await;
///
/// sub.dispose();
/// ```
#[derive(Clone)]
pub struct MessageStream {
    inner: Arc<StreamInner>,
}

impl MessageStream {
    /// Creates a stream over `transport` with a fresh identity cell.
    pub fn new(transport: BoxedTransport) -> Self {
        Self::with_identity(transport, IdentityCell::new())
    }

    /// Creates a stream that bootstraps into the given identity cell.
    pub fn with_identity(transport: BoxedTransport, identity: IdentityCell) -> Self {
        let (consumed, _) = watch::channel(0);
        Self {
            inner: Arc::new(StreamInner {
                transport,
                identity,
                observers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                phase: Mutex::new(Phase::Idle),
                probe: Mutex::new(Probe { rx: None, seen: 0 }),
                consumed,
                completed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Returns the identity cell filled by the transport's ready signal.
    pub fn identity(&self) -> &IdentityCell {
        &self.inner.identity
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &BoxedTransport {
        &self.inner.transport
    }

    /// Returns `true` once the stream has subscribed to the transport.
    pub fn is_attached(&self) -> bool {
        !matches!(*self.inner.phase.lock(), Phase::Idle)
    }

    /// Returns `true` once the stream has completed.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of active observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Subscribes to the transport if not done yet and starts the pump when
    /// an async runtime is available.
    ///
    /// Called automatically by [`subscribe`](Self::subscribe). Call it
    /// directly before connecting the transport so the ready signal is not
    /// missed.
    pub fn attach(&self) {
        let mut phase = self.inner.phase.lock();

        if let Phase::Idle = *phase {
            let rx = self.inner.transport.subscribe();
            self.inner.probe.lock().rx = Some(rx.resubscribe());
            debug!(
                transport = self.inner.transport.name(),
                "Message stream attached to transport"
            );
            *phase = Phase::Attached(rx);
        }

        if !matches!(*phase, Phase::Attached(_)) {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                if let Phase::Attached(rx) = std::mem::replace(&mut *phase, Phase::Running) {
                    handle.spawn(pump(Arc::clone(&self.inner), rx));
                }
            }
            Err(_) => trace!("No async runtime available yet, message pump deferred"),
        }
    }

    /// Registers an observer.
    ///
    /// On a completed stream the observer is told so immediately and the
    /// returned handle is already in the [`Completed`](ListenerState::Completed)
    /// state.
    pub fn subscribe(&self, observer: Arc<dyn MessageObserver>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::downgrade(&self.inner);

        {
            let mut observers = self.inner.observers.lock();
            if !self.inner.completed.load(Ordering::SeqCst) {
                let slot = Arc::new(ObserverSlot::new(observer));
                observers.insert(id, Arc::clone(&slot));
                drop(observers);

                self.attach();
                return Subscription::new(id, slot, stream);
            }
        }

        debug!(listener_id = id, "Subscribed to a completed stream");
        observer.on_complete(id);
        let slot = Arc::new(ObserverSlot::closed(ListenerState::Completed));
        Subscription::new(id, slot, stream)
    }

    /// Waits until every transport event delivered before this call has been
    /// fully dispatched, or the stream has completed.
    pub async fn flush(&self) {
        self.attach();

        let target = {
            let mut guard = self.inner.probe.lock();
            let probe = &mut *guard;
            if let Some(rx) = probe.rx.as_mut() {
                loop {
                    match rx.try_recv() {
                        Ok(_) => probe.seen += 1,
                        Err(TryRecvError::Lagged(skipped)) => probe.seen += skipped,
                        Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                    }
                }
            }
            probe.seen
        };

        let mut consumed = self.inner.consumed.subscribe();
        loop {
            if self.is_completed() || *consumed.borrow_and_update() >= target {
                return;
            }
            if consumed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stops the pump and completes the stream.
    ///
    /// A message being dispatched when this is called finishes with the
    /// observers that were still active.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.complete();
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("transport", &self.inner.transport.name())
            .field("observers", &self.observer_count())
            .field("completed", &self.is_completed())
            .finish()
    }
}
