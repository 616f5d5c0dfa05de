//! # Ferd
//!
//! A chat bot built from many small, independent listeners over one shared
//! message stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌──────────────────────────────┐
//! │  Transport  │────▶│ MessageStream │────▶│ Listener  /^ping$/           │──▶ reply
//! │  (Slack..)  │     │  (one pump)   │────▶│ Listener  mentions + /help/  │──▶ reply
//! └─────────────┘     └───────────────┘────▶│ Session   dismiss|converse|  │──▶ reply
//!                                           │           summon             │
//!                                           └──────────────────────────────┘
//! ```
//!
//! - **Transport**: the external chat client; emits ready, message, error and close events
//! - **MessageStream**: subscribes to the transport once and fans messages out in order
//! - **Listeners**: a predicate, a pattern and a callback; each one is disposable
//! - **Sessions**: three listeners sharing a per-user presence table
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferd::prelude::*;
//!
//! fn ping(bot: &Ferd) {
//!     bot.listen(Regex::new("^ping$").unwrap(), |res: Response| async move {
//!         res.send("pong").await
//!     });
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Ferd::builder(transport).build()?;
//!     bot.add_module(ping);
//!     bot.session(
//!         Regex::new("^ferd join$")?,
//!         Regex::new("^ferd leave$")?,
//!         SessionHandlers::new(),
//!     );
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use ferd_core as core;
pub use ferd_framework as framework;
pub use ferd_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ferd::prelude::*;
/// ```
pub mod prelude {
    // Bot - main entry point
    pub use ferd_runtime::{Ferd, Module};

    // Registration and replies
    pub use ferd_framework::{Response, SessionHandle, SessionHandlers};
    pub use regex::Regex;

    // Handles
    pub use ferd_core::{Disposable, Subscription};

    // Transport contract for custom implementations
    pub use ferd_core::{Identity, InboundMessage, Transport, TransportEvent};
}
