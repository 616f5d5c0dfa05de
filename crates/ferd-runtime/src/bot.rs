//! The Ferd bot.
//!
//! [`Ferd`] ties a transport to a [`Dispatcher`] and owns the connection
//! lifecycle. Listener registration is delegated to the dispatcher.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ferd_runtime::Ferd;
//!
//! // Plain bot with default settings
//! let bot = Ferd::new(transport.clone());
//!
//! // Load ferd.toml, initialize logging
//! let bot = Ferd::builder(transport).profile("production").build()?;
//!
//! bot.add_module(ping);
//! bot.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ferd_core::{BoxedTransport, Disposable, IdentityCell, InboundMessage, Subscription};
use ferd_framework::{Callback, Dispatcher, SessionHandle, SessionHandlers};
use regex::Regex;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, FerdConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::module::Module;

struct FerdInner {
    config: FerdConfig,
    dispatcher: Dispatcher,
    logged_in: AtomicBool,
}

/// A chat bot: a transport, its listeners and its sessions.
///
/// Cloning shares the bot.
#[derive(Clone)]
pub struct Ferd {
    inner: Arc<FerdInner>,
}

impl Ferd {
    /// Creates a bot on `transport` with the default configuration.
    ///
    /// Does not touch the environment or the global logger.
    pub fn new(transport: BoxedTransport) -> Self {
        Self::with_config(transport, FerdConfig::default())
    }

    /// Creates a bot on `transport` using `config`, without initializing logging.
    pub fn with_config(transport: BoxedTransport, config: FerdConfig) -> Self {
        let dispatcher = Dispatcher::with_salutations(transport, config.session.to_salutations());
        Self {
            inner: Arc::new(FerdInner {
                config,
                dispatcher,
                logged_in: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a bot from configuration and initializes logging from it.
    pub fn from_config(transport: BoxedTransport, config: &FerdConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            transport = transport.name(),
            "Bot initialized from configuration"
        );

        Self::with_config(transport, config.clone())
    }

    /// Creates a builder that loads configuration from files and environment.
    pub fn builder(transport: BoxedTransport) -> FerdBuilder {
        FerdBuilder::new(transport)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FerdConfig {
        &self.inner.config
    }

    /// Returns the listener registry.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Returns the transport.
    pub fn transport(&self) -> &BoxedTransport {
        self.inner.dispatcher.transport()
    }

    /// Returns the bot's identity cell, filled once the transport is ready.
    pub fn identity(&self) -> &IdentityCell {
        self.inner.dispatcher.identity()
    }

    /// Returns `true` between [`login`](Self::login) and [`logout`](Self::logout).
    pub fn is_logged_in(&self) -> bool {
        self.inner.logged_in.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects the transport.
    ///
    /// The message stream is attached first, so the transport's ready signal
    /// (and with it the bot identity) is never missed. If an earlier logout
    /// completed the stream, a fresh one is started.
    pub async fn login(&self) -> RuntimeResult<()> {
        if self.inner.logged_in.swap(true, Ordering::SeqCst) {
            warn!("Already logged in");
            return Ok(());
        }

        if self.inner.dispatcher.renew() {
            info!("Previous message stream completed, starting a new one");
        }
        self.inner.dispatcher.attach();

        let transport = self.transport();
        if let Err(e) = transport.connect().await {
            self.inner.logged_in.store(false, Ordering::SeqCst);
            error!(transport = transport.name(), error = %e, "Login failed");
            return Err(e.into());
        }

        info!(transport = transport.name(), "Logged in");
        Ok(())
    }

    /// Disposes every listener, then disconnects the transport and waits for
    /// the events it emitted while closing to be dispatched.
    ///
    /// Logging out twice is harmless.
    pub async fn logout(&self) -> RuntimeResult<()> {
        self.inner.dispatcher.dispose_all();

        if !self.inner.logged_in.swap(false, Ordering::SeqCst) {
            debug!("Not logged in, nothing to disconnect");
            return Ok(());
        }

        let transport = self.transport();
        transport.disconnect().await?;
        self.inner.dispatcher.flush().await;
        info!(transport = transport.name(), "Logged out");
        Ok(())
    }

    /// Logs in and runs until Ctrl+C or SIGTERM, then logs out.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Logs in and runs until `shutdown` resolves, then logs out.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.login().await?;
        info!("Ferd is now running");

        shutdown.await;

        self.logout().await
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Runs a module's setup against this bot.
    pub fn add_module<M: Module>(&self, module: M) -> &Self {
        debug!(module = module.name(), "Adding module");
        module.setup(self);
        self
    }

    /// Runs several modules' setup, in order.
    pub fn add_modules<I, M>(&self, modules: I) -> &Self
    where
        I: IntoIterator<Item = M>,
        M: Module,
    {
        for module in modules {
            self.add_module(module);
        }
        self
    }

    // =========================================================================
    // Listener registration
    // =========================================================================

    /// See [`Dispatcher::hear`].
    pub fn hear<P, C>(&self, predicate: P, pattern: Regex, callback: C) -> Subscription
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        C: Callback,
    {
        self.inner.dispatcher.hear(predicate, pattern, callback)
    }

    /// See [`Dispatcher::register`].
    pub fn register<P, C>(&self, predicate: P, pattern: Regex, callback: C) -> Subscription
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        C: Callback,
    {
        self.inner.dispatcher.register(predicate, pattern, callback)
    }

    /// See [`Dispatcher::listen`].
    pub fn listen<C: Callback>(&self, pattern: Regex, callback: C) -> Subscription {
        self.inner.dispatcher.listen(pattern, callback)
    }

    /// See [`Dispatcher::respond`].
    pub fn respond<C: Callback>(&self, pattern: Regex, callback: C) -> Subscription {
        self.inner.dispatcher.respond(pattern, callback)
    }

    /// See [`Dispatcher::session`].
    pub fn session(&self, summon: Regex, dismiss: Regex, handlers: SessionHandlers) -> SessionHandle {
        self.inner.dispatcher.session(summon, dismiss, handlers)
    }

    /// Disposes a listener or session handle.
    pub fn ignore(&self, handle: &dyn Disposable) {
        self.inner.dispatcher.ignore(handle);
    }

    /// Returns the number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.dispatcher.listener_count()
    }

    /// Waits until every message delivered so far has been fully dispatched.
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await;
    }
}

impl std::fmt::Debug for Ferd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ferd")
            .field("dispatcher", &self.inner.dispatcher)
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// FerdBuilder
// =============================================================================

/// Builder for creating a [`Ferd`] bot from layered configuration.
///
/// # Example
///
/// ```rust,ignore
/// let bot = Ferd::builder(transport)
///     .config_file("config/ferd.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct FerdBuilder {
    transport: BoxedTransport,
    config_loader: ConfigLoader,
}

impl FerdBuilder {
    /// Creates a builder searching the current directory for configuration.
    pub fn new(transport: BoxedTransport) -> Self {
        Self {
            transport,
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides configuration programmatically, above files and environment.
    pub fn merge(mut self, config: FerdConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides one dotted configuration key.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Loads and validates the configuration, then builds the bot.
    pub fn build(self) -> ConfigResult<Ferd> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(Ferd::from_config(self.transport, &config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::RuntimeError;
    use async_trait::async_trait;
    use ferd_core::{
        Identity, MemoryTransport, Transport, TransportError, TransportEvent, TransportResult,
        UserInfo,
    };
    use ferd_framework::Response;
    use tokio::sync::broadcast;

    fn re(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap()
    }

    fn setup() -> (Arc<MemoryTransport>, Ferd) {
        let transport = Arc::new(
            MemoryTransport::new()
                .with_identity(Identity::new("ferd", "U0"))
                .with_user(UserInfo::new("U1", "alice")),
        );
        let bot = Ferd::new(transport.clone());
        (transport, bot)
    }

    fn ping(bot: &Ferd) {
        bot.listen(re("^ping$"), |res: Response| async move { res.send("pong").await });
    }

    fn help(bot: &Ferd) {
        bot.respond(re("(?i)help"), |res: Response| async move {
            res.send("try ping").await
        });
    }

    #[tokio::test]
    async fn test_login_bootstraps_identity() {
        let (transport, bot) = setup();
        bot.login().await.unwrap();
        bot.flush().await;

        assert!(bot.is_logged_in());
        assert!(transport.is_connected());
        assert_eq!(bot.identity().get().map(|i| i.id.as_str()), Some("U0"));
    }

    #[tokio::test]
    async fn test_modules_register_listeners() {
        let (transport, bot) = setup();
        bot.add_modules([ping, help]);
        assert_eq!(bot.listener_count(), 2);

        bot.login().await.unwrap();
        transport.message("U1", "C1", "ping");
        transport.message("U1", "C1", "help");
        transport.message("U1", "C1", "ferd help");
        bot.flush().await;

        assert_eq!(transport.sent_texts(), vec!["pong", "try ping"]);
    }

    #[tokio::test]
    async fn test_logout_disposes_and_disconnects() {
        let (transport, bot) = setup();
        let handle = bot.listen(re(".*"), |_res: Response| async {});
        let session = bot.session(re("^join$"), re("^leave$"), SessionHandlers::new());

        bot.login().await.unwrap();
        bot.logout().await.unwrap();
        bot.logout().await.unwrap();

        assert!(!bot.is_logged_in());
        assert!(!transport.is_connected());
        assert!(handle.is_closed());
        assert!(session.is_closed());
        assert_eq!(bot.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_login_after_logout_dispatches_again() {
        let (transport, bot) = setup();
        bot.login().await.unwrap();
        bot.logout().await.unwrap();
        assert!(bot.dispatcher().stream().is_completed());

        bot.login().await.unwrap();
        bot.add_module(ping);
        transport.message("U1", "C1", "ping");
        bot.flush().await;

        assert!(bot.is_logged_in());
        assert!(!bot.dispatcher().stream().is_completed());
        assert_eq!(bot.listener_count(), 1);
        assert_eq!(bot.identity().get().map(|i| i.name.as_str()), Some("ferd"));
        assert_eq!(transport.sent_texts(), vec!["pong"]);
    }

    #[tokio::test]
    async fn test_session_uses_configured_salutations() {
        let transport = Arc::new(MemoryTransport::new());
        let config = FerdConfig {
            session: SessionConfig {
                greeting: "Yo".into(),
                fallback_name: "stranger".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let bot = Ferd::with_config(transport.clone(), config);
        bot.session(re("^join$"), re("^leave$"), SessionHandlers::new());

        bot.login().await.unwrap();
        transport.message("U5", "C1", "join");
        transport.message("U5", "C1", "leave");
        bot.flush().await;

        assert_eq!(transport.sent_texts(), vec!["Yo, stranger!", "Bye, stranger!"]);
    }

    #[tokio::test]
    async fn test_run_until_logs_in_and_out() {
        let (transport, bot) = setup();
        bot.run_until(async {}).await.unwrap();

        assert!(!bot.is_logged_in());
        assert!(!transport.is_connected());
    }

    struct Unreachable {
        events: broadcast::Sender<TransportEvent>,
    }

    #[async_trait]
    impl Transport for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }

        async fn connect(&self) -> TransportResult<()> {
            Err(TransportError::ConnectionFailed {
                reason: "invalid auth".into(),
            })
        }

        async fn disconnect(&self) -> TransportResult<()> {
            Ok(())
        }

        async fn send(&self, _channel: &str, _text: &str) -> TransportResult<()> {
            Err(TransportError::NotConnected)
        }

        fn user(&self, _user_id: &str) -> Option<UserInfo> {
            None
        }
    }

    #[tokio::test]
    async fn test_login_failure_is_reported() {
        let (events, _) = broadcast::channel(4);
        let bot = Ferd::new(Arc::new(Unreachable { events }));

        let err = bot.login().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Transport(_)));
        assert!(!bot.is_logged_in());
    }
}
