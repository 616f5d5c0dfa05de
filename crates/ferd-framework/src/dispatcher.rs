//! Listener registry for the Ferd framework.
//!
//! The [`Dispatcher`] registers listeners on the shared [`MessageStream`] and
//! keeps every handle it hands out, so all of them can be cancelled at once
//! on shutdown. Once the stream has completed, [`Dispatcher::renew`] swaps in
//! a fresh one over the same transport and identity.
//!
//! # Listener-based Dispatch
//!
//! Each registration is independent: when a message arrives,
//!
//! 1. Listeners are visited in registration order
//! 2. Each evaluates its own predicate and pattern
//! 3. Every listener that matches runs its callback; none blocks another
//!
//! ```rust,ignore
//! use ferd_framework::{Dispatcher, Response};
//! use regex::Regex;
//!
//! let dispatcher = Dispatcher::new(transport);
//!
//! dispatcher.listen(Regex::new(r"^ping$")?, |res: Response| async move {
//!     res.send("pong").await
//! });
//!
//! dispatcher.respond(Regex::new(r"(?i)help")?, |res: Response| async move {
//!     res.send("Try `ping`.").await
//! });
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ferd_core::{
    BoxedTransport, Disposable, IdentityCell, InboundMessage, MessageStream, Subscription,
    SubscriptionId,
};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tracing::debug;

use crate::callback::{BoxedCallback, Callback, into_callback};
use crate::listener::Listener;
use crate::predicate::{self, Predicate};
use crate::session::{self, Salutations, SessionHandle, SessionHandlers};

struct DispatcherInner {
    transport: BoxedTransport,
    identity: IdentityCell,
    stream: RwLock<MessageStream>,
    salutations: Salutations,
    /// Every handle handed out, keyed by subscription id.
    registry: Mutex<BTreeMap<SubscriptionId, Subscription>>,
}

/// The listener registry and match dispatcher.
///
/// Cloning shares the registry.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync`; listeners may be registered or disposed
/// from inside a callback. Such changes apply from the next message on.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a dispatcher over a fresh stream on `transport`.
    pub fn new(transport: BoxedTransport) -> Self {
        Self::with_salutations(transport, Salutations::default())
    }

    /// Creates a dispatcher whose default session handlers use `salutations`.
    pub fn with_salutations(transport: BoxedTransport, salutations: Salutations) -> Self {
        Self::from_stream(MessageStream::new(transport), salutations)
    }

    /// Creates a dispatcher over an existing stream.
    pub fn from_stream(stream: MessageStream, salutations: Salutations) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                transport: Arc::clone(stream.transport()),
                identity: stream.identity().clone(),
                stream: RwLock::new(stream),
                salutations,
                registry: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Returns the current message stream.
    pub fn stream(&self) -> MessageStream {
        self.inner.stream.read().clone()
    }

    /// Returns the transport replies go through.
    pub fn transport(&self) -> &BoxedTransport {
        &self.inner.transport
    }

    /// Returns the bot identity cell.
    pub fn identity(&self) -> &IdentityCell {
        &self.inner.identity
    }

    /// Replaces a completed stream with a fresh one on the same transport.
    ///
    /// Returns `true` if the stream was replaced. Handles registered on the
    /// old stream stay completed; register again to listen on the new one.
    pub fn renew(&self) -> bool {
        let mut stream = self.inner.stream.write();
        if !stream.is_completed() {
            return false;
        }

        *stream = MessageStream::with_identity(
            Arc::clone(&self.inner.transport),
            self.inner.identity.clone(),
        );
        debug!(transport = self.inner.transport.name(), "Message stream renewed");
        true
    }

    /// Returns the phrases used by default session handlers.
    pub fn salutations(&self) -> &Salutations {
        &self.inner.salutations
    }

    /// Registers a listener: `callback` runs for every message accepted by
    /// `predicate` whose text matches `pattern`.
    pub fn hear<P, C>(&self, predicate: P, pattern: Regex, callback: C) -> Subscription
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        C: Callback,
    {
        self.register_boxed(predicate::from_fn(predicate), pattern, into_callback(callback))
    }

    /// Alias of [`hear`](Self::hear).
    pub fn register<P, C>(&self, predicate: P, pattern: Regex, callback: C) -> Subscription
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        C: Callback,
    {
        self.hear(predicate, pattern, callback)
    }

    /// Registers a listener for every message whose text matches `pattern`.
    pub fn listen<C: Callback>(&self, pattern: Regex, callback: C) -> Subscription {
        self.register_boxed(predicate::always(), pattern, into_callback(callback))
    }

    /// Registers a listener for messages that mention the bot and match
    /// `pattern`. Matches nothing until the bot identity is known.
    pub fn respond<C: Callback>(&self, pattern: Regex, callback: C) -> Subscription {
        self.register_boxed(
            predicate::mentions(self.identity().clone()),
            pattern,
            into_callback(callback),
        )
    }

    /// Registers a listener from already type-erased parts.
    pub fn register_boxed(
        &self,
        predicate: Predicate,
        pattern: Regex,
        callback: BoxedCallback,
    ) -> Subscription {
        let listener = Listener::new(predicate, pattern, callback, Arc::clone(self.transport()));
        let pattern = listener.pattern().as_str().to_string();
        let subscription = self.stream().subscribe(Arc::new(listener));

        debug!(
            listener_id = subscription.id(),
            pattern = %pattern,
            "Listener registered"
        );

        self.inner
            .registry
            .lock()
            .insert(subscription.id(), subscription.clone());
        subscription
    }

    /// Starts a multi-user session; see [`session`](crate::session).
    pub fn session(&self, summon: Regex, dismiss: Regex, handlers: SessionHandlers) -> SessionHandle {
        let handle = session::start(self, summon, dismiss, handlers);
        debug!(
            listeners = ?handle.listeners().iter().map(Subscription::id).collect::<Vec<_>>(),
            "Session started"
        );
        handle
    }

    /// Disposes a listener or session handle.
    pub fn ignore(&self, handle: &dyn Disposable) {
        handle.dispose();
    }

    /// Disposes every listener registered through this dispatcher.
    pub fn dispose_all(&self) {
        let registry = std::mem::take(&mut *self.inner.registry.lock());
        debug!(count = registry.len(), "Disposing all listeners");
        for subscription in registry.values() {
            subscription.dispose();
        }
    }

    /// Returns the number of registered listeners that are still active.
    pub fn listener_count(&self) -> usize {
        self.inner
            .registry
            .lock()
            .values()
            .filter(|subscription| subscription.is_active())
            .count()
    }

    /// Subscribes the stream to the transport without registering anything.
    pub fn attach(&self) {
        self.stream().attach();
    }

    /// Waits until every message delivered so far has been fully dispatched.
    pub async fn flush(&self) {
        self.stream().flush().await;
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stream", &*self.inner.stream.read())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use ferd_core::{Identity, ListenerState, MemoryTransport};

    fn setup() -> (Arc<MemoryTransport>, Dispatcher) {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = Dispatcher::new(transport.clone());
        (transport, dispatcher)
    }

    fn re(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap()
    }

    /// A callback that records `label:text` into `log`.
    fn record(
        label: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(Response) -> std::future::Ready<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |res: Response| {
            log.lock().push(format!("{label}:{}", res.text()));
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_overlapping_listeners_both_fire() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.listen(re("hello"), record("a", &log));
        dispatcher.hear(|_| true, re("^hello"), record("b", &log));

        transport.message("U1", "C1", "hello world");
        dispatcher.flush().await;

        assert_eq!(*log.lock(), vec!["a:hello world", "b:hello world"]);
    }

    #[tokio::test]
    async fn test_anchored_listen() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.listen(re("^ping$"), record("ping", &log));

        transport.message("U1", "C1", "pingpong");
        transport.message("U1", "C1", "ping");
        dispatcher.flush().await;

        assert_eq!(*log.lock(), vec!["ping:ping"]);
    }

    #[tokio::test]
    async fn test_ignore_stops_matching() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = dispatcher.listen(re(".*"), record("r", &log));

        transport.message("U1", "C1", "one");
        dispatcher.flush().await;
        dispatcher.ignore(&handle);
        dispatcher.ignore(&handle);
        transport.message("U1", "C1", "two");
        dispatcher.flush().await;

        assert_eq!(*log.lock(), vec!["r:one"]);
        assert_eq!(handle.state(), ListenerState::Disposed);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_all() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = dispatcher.listen(re(".*"), record("a", &log));
        let b = dispatcher.respond(re(".*"), record("b", &log));
        assert_eq!(dispatcher.listener_count(), 2);

        dispatcher.dispose_all();
        transport.message("U1", "C1", "anyone?");
        dispatcher.flush().await;

        assert!(log.lock().is_empty());
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_callback_is_isolated() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));

        let failing = dispatcher.listen(re("boom"), |_res: Response| async {
            Err::<(), _>(anyhow::anyhow!("callback blew up"))
        });
        dispatcher.listen(re(".*"), record("ok", &log));

        transport.message("U1", "C1", "boom");
        transport.message("U1", "C1", "boom again");
        transport.message("U1", "C1", "after");
        dispatcher.flush().await;

        assert_eq!(failing.state(), ListenerState::Failed);
        assert_eq!(*log.lock(), vec!["ok:boom", "ok:boom again", "ok:after"]);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_respond_requires_identity() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.respond(re(".*"), record("r", &log));

        transport.message("U1", "C1", "ferd, are you there?");
        transport.message("U1", "C1", "<@U0> hello");
        dispatcher.flush().await;
        assert!(log.lock().is_empty());

        transport.ready(Identity::new("ferd", "U0"));
        transport.message("U1", "C1", "Ferd, are you there?");
        transport.message("U1", "C1", "<@U0> hello");
        transport.message("U1", "C1", "nobody home");
        dispatcher.flush().await;

        assert_eq!(
            *log.lock(),
            vec!["r:Ferd, are you there?", "r:<@U0> hello"]
        );
    }

    #[tokio::test]
    async fn test_registration_inside_callback_applies_to_next_message() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_log = Arc::clone(&log);
        let registrar = dispatcher.clone();
        dispatcher.listen(re("^arm$"), move |_res: Response| {
            registrar.listen(re(".*"), record("late", &inner_log));
            std::future::ready(())
        });

        transport.message("U1", "C1", "arm");
        transport.message("U1", "C1", "next");
        dispatcher.flush().await;

        assert_eq!(*log.lock(), vec!["late:next"]);
    }

    #[tokio::test]
    async fn test_replies_go_through_transport() {
        let (transport, dispatcher) = setup();
        dispatcher.listen(re(r"^echo (.+)$"), |res: Response| async move {
            let word = res.capture(1).unwrap_or_default().to_string();
            res.send(word).await
        });

        transport.message("U1", "C1", "echo hi there");
        dispatcher.flush().await;

        assert_eq!(transport.sent_texts(), vec!["hi there"]);
    }

    #[tokio::test]
    async fn test_completion_reaches_listeners() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = dispatcher.listen(re(".*"), record("r", &log));

        transport.close();
        dispatcher.flush().await;

        assert_eq!(handle.state(), ListenerState::Completed);
        let late = dispatcher.listen(re(".*"), record("late", &log));
        assert_eq!(late.state(), ListenerState::Completed);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_replaces_completed_stream() {
        let (transport, dispatcher) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(!dispatcher.renew());

        let old = dispatcher.listen(re(".*"), record("old", &log));
        transport.close();
        dispatcher.flush().await;

        assert!(dispatcher.renew());
        dispatcher.listen(re(".*"), record("new", &log));
        transport.message("U1", "C1", "again");
        dispatcher.flush().await;

        assert_eq!(old.state(), ListenerState::Completed);
        assert_eq!(*log.lock(), vec!["new:again"]);
        assert_eq!(dispatcher.listener_count(), 1);
        assert_eq!(dispatcher.stream().observer_count(), 1);
    }
}
