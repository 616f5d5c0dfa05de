//! Multi-user conversational sessions.
//!
//! A session is three listeners sharing one [`SessionUserTable`]:
//!
//! | Listener | Pattern          | Guard                 | Action                          |
//! |----------|------------------|-----------------------|---------------------------------|
//! | dismiss  | dismiss pattern  | none                  | remove sender, run `farewell`   |
//! | converse | any text         | sender is in session  | run `converse`                  |
//! | summon   | summon pattern   | none                  | record sender, run `greeting`   |
//!
//! They are registered in that order, so a summon or dismiss message never
//! also reaches `converse` on the same message: the table change becomes
//! visible to the converse guard from the next message on.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use ferd_core::{CompositeSubscription, Disposable, Subscription};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};

use crate::callback::{BoxedCallback, Callback, into_callback};
use crate::dispatcher::Dispatcher;
use crate::predicate;
use crate::response::Response;

static MATCH_ALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?s).*").expect("match-all pattern compiles"));

// ============================================================================
// SessionUserTable
// ============================================================================

/// Users currently in a session, with the display name captured on summon.
///
/// A user is in session iff their id is a key of the table, whether or not a
/// display name could be resolved. Cloning shares the table.
#[derive(Debug, Clone, Default)]
pub struct SessionUserTable {
    users: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl SessionUserTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `user_id` is in session.
    pub fn is_present(&self, user_id: &str) -> bool {
        self.users.lock().contains_key(user_id)
    }

    /// Returns the display name recorded for `user_id`, if present and known.
    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.users.lock().get(user_id).cloned().flatten()
    }

    /// Returns the ids of all users in session, sorted.
    pub fn present_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.lock().keys().cloned().collect();
        users.sort();
        users
    }

    /// Returns the number of users in session.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    /// Returns `true` if nobody is in session.
    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    fn enter(&self, user_id: &str, display_name: Option<String>) {
        self.users.lock().insert(user_id.to_string(), display_name);
    }

    fn leave(&self, user_id: &str) -> bool {
        self.users.lock().remove(user_id).is_some()
    }
}

// ============================================================================
// Salutations - default handler phrases
// ============================================================================

/// Phrases used by the default session handlers.
///
/// Each default handler replies `"{phrase}, {name}!"`, where `name` is the
/// sender's display name or [`fallback_name`](Self::fallback_name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salutations {
    /// Phrase sent on summon.
    pub greeting: String,
    /// Phrase sent for every message while in session.
    pub converse: String,
    /// Phrase sent on dismiss.
    pub farewell: String,
    /// Name used when the sender's display name cannot be resolved.
    pub fallback_name: String,
}

impl Default for Salutations {
    fn default() -> Self {
        Self {
            greeting: "Hello".to_string(),
            converse: "Whatever".to_string(),
            farewell: "Bye".to_string(),
            fallback_name: "Buddy".to_string(),
        }
    }
}

impl Salutations {
    /// Formats the salute for `phrase` addressed to the sender of `res`.
    pub fn salute(&self, res: &Response, phrase: &str) -> String {
        let name = res
            .sender_name()
            .unwrap_or_else(|| self.fallback_name.clone());
        format!("{phrase}, {name}!")
    }

    fn handler(self: &Arc<Self>, pick: fn(&Salutations) -> &str) -> BoxedCallback {
        let salutations = Arc::clone(self);
        into_callback(move |res: Response| {
            let text = salutations.salute(&res, pick(&salutations));
            async move {
                if let Err(e) = res.send(&text).await {
                    warn!(error = %e, "Failed to send session salute");
                }
            }
        })
    }
}

// ============================================================================
// SessionHandlers
// ============================================================================

/// Overrides for the session's callbacks. Unset ones use the default salutes.
///
/// ```rust,ignore
/// let handlers = SessionHandlers::new()
///     .greeting(|res: Response| async move { res.send("Welcome!").await });
/// ```
#[derive(Clone, Default)]
pub struct SessionHandlers {
    greeting: Option<BoxedCallback>,
    converse: Option<BoxedCallback>,
    farewell: Option<BoxedCallback>,
}

impl SessionHandlers {
    /// Creates handlers that all use the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback run when a user is summoned.
    pub fn greeting<C: Callback>(mut self, callback: C) -> Self {
        self.greeting = Some(into_callback(callback));
        self
    }

    /// Sets the callback run for messages from users in session.
    pub fn converse<C: Callback>(mut self, callback: C) -> Self {
        self.converse = Some(into_callback(callback));
        self
    }

    /// Sets the callback run when a user is dismissed.
    pub fn farewell<C: Callback>(mut self, callback: C) -> Self {
        self.farewell = Some(into_callback(callback));
        self
    }
}

impl std::fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandlers")
            .field("greeting", &self.greeting.is_some())
            .field("converse", &self.converse.is_some())
            .field("farewell", &self.farewell.is_some())
            .finish()
    }
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Handle to a running session.
///
/// Disposing it switches off all three listeners before returning.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    listeners: CompositeSubscription,
    users: SessionUserTable,
}

impl SessionHandle {
    /// Returns the shared user table.
    pub fn users(&self) -> &SessionUserTable {
        &self.users
    }

    /// Returns `true` if `user_id` is in session.
    pub fn is_present(&self, user_id: &str) -> bool {
        self.users.is_present(user_id)
    }

    /// Returns the ids of all users in session, sorted.
    pub fn present_users(&self) -> Vec<String> {
        self.users.present_users()
    }

    /// Returns the underlying listener handles (dismiss, converse, summon).
    pub fn listeners(&self) -> &[Subscription] {
        self.listeners.children()
    }
}

impl Disposable for SessionHandle {
    fn dispose(&self) {
        self.listeners.dispose();
    }

    fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }
}

/// Registers the three session listeners on `dispatcher`.
pub(crate) fn start(
    dispatcher: &Dispatcher,
    summon: Regex,
    dismiss: Regex,
    handlers: SessionHandlers,
) -> SessionHandle {
    let users = SessionUserTable::new();
    let salutations = Arc::new(dispatcher.salutations().clone());

    let greeting = handlers
        .greeting
        .unwrap_or_else(|| salutations.handler(|s| s.greeting.as_str()));
    let converse = handlers
        .converse
        .unwrap_or_else(|| salutations.handler(|s| s.converse.as_str()));
    let farewell = handlers
        .farewell
        .unwrap_or_else(|| salutations.handler(|s| s.farewell.as_str()));

    let dismiss_listener = {
        let users = users.clone();
        dispatcher.register_boxed(
            predicate::always(),
            dismiss,
            into_callback(move |res: Response| {
                if let Some(user_id) = res.user_id() {
                    if users.leave(user_id) {
                        debug!(user_id = %user_id, "User left session");
                    }
                }
                let farewell = Arc::clone(&farewell);
                async move { farewell.call(res).await }
            }),
        )
    };

    let converse_listener = {
        let users = users.clone();
        dispatcher.register_boxed(
            predicate::from_fn(move |message| {
                message
                    .user_id()
                    .is_some_and(|user_id| users.is_present(user_id))
            }),
            MATCH_ALL.clone(),
            converse,
        )
    };

    let summon_listener = {
        let users = users.clone();
        dispatcher.register_boxed(
            predicate::always(),
            summon,
            into_callback(move |res: Response| {
                if let Some(user_id) = res.user_id() {
                    users.enter(user_id, res.sender_name());
                    debug!(user_id = %user_id, "User joined session");
                }
                let greeting = Arc::clone(&greeting);
                async move { greeting.call(res).await }
            }),
        )
    };

    SessionHandle {
        listeners: CompositeSubscription::new(vec![
            dismiss_listener,
            converse_listener,
            summon_listener,
        ]),
        users,
    }
}
