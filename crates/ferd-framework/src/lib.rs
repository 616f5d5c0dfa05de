//! # Ferd Framework
//!
//! Listener registration and dispatch for building conversational bots.
//!
//! This layer provides:
//! - [`Dispatcher`]: the listener registry (`hear`, `listen`, `respond`, `ignore`, `dispose_all`)
//! - [`Listener`]: a predicate, a pattern and a callback, matched per message
//! - [`Response`]: what a callback receives (captures, sender lookup, `send`)
//! - [`session`]: a per-user summon / converse / dismiss state machine
//!
//! The framework is built on the message stream from `ferd-core`; every
//! listener is one independent observer of that stream.

pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod predicate;
pub mod response;
pub mod session;

pub use callback::{BoxedCallback, Callback, CallbackResult, into_callback};
pub use dispatcher::Dispatcher;
pub use error::{ListenerError, ListenerResult};
pub use listener::Listener;
pub use predicate::Predicate;
pub use response::Response;
pub use session::{Salutations, SessionHandle, SessionHandlers, SessionUserTable};
