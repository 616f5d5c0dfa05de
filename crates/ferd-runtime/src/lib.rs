//! Ferd Runtime - lifecycle, configuration and logging for Ferd bots.
//!
//! This crate provides:
//! - The [`Ferd`] bot: login/logout, modules, listener registration
//! - Layered configuration ([`ConfigLoader`], [`FerdConfig`])
//! - Logging setup ([`logging::try_init_from_config`])
//!
//! ```ignore
//! use ferd_runtime::Ferd;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Ferd::builder(Arc::new(SlackTransport::new(token))).build()?;
//!
//!     bot.add_modules([ping, greeter]);
//!     bot.session(Regex::new("^ferd join$")?, Regex::new("^ferd leave$")?, Default::default());
//!
//!     // Run until Ctrl+C
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod module;

// Re-exports
pub use bot::{Ferd, FerdBuilder};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, FerdConfig, LoggingConfig, SessionConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingError;
pub use module::Module;

// Re-export tracing for use by modules
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
