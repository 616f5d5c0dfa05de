//! Greeter Bot Example
//!
//! Runs a Ferd bot against the in-memory transport and replays a short
//! scripted conversation, printing every reply.
//!
//! # Listeners
//!
//! - `ping`: `^ping$` from anyone, answers `pong`
//! - `echo`: `^echo (.+)$`, answers with the captured text
//! - `help`: any message mentioning the bot that contains `help`
//! - a session: `ferd join` / `ferd leave`, with the default salutes
//!
//! # Usage
//!
//! ```bash
//! cargo run --package greeter-bot
//! ```

use std::sync::Arc;

use anyhow::Result;
use ferd::core::{MemoryTransport, UserInfo};
use ferd::prelude::*;
use ferd::runtime::FerdConfig;
use tracing::info;

// ============================================================================
// Modules
// ============================================================================

fn ping(bot: &Ferd) {
    bot.listen(pattern("^ping$"), |res: Response| async move {
        res.send("pong").await
    });
}

fn echo(bot: &Ferd) {
    bot.listen(pattern(r"^echo (.+)$"), |res: Response| async move {
        let text = res.capture(1).unwrap_or_default().to_string();
        res.send(text).await
    });
}

fn help(bot: &Ferd) {
    bot.respond(pattern("(?i)help"), |res: Response| async move {
        res.send("Say `ping`, `echo <text>`, or `ferd join` / `ferd leave`.")
            .await
    });
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("module patterns are valid")
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = FerdConfig::default();

    let transport = Arc::new(
        MemoryTransport::new()
            .with_identity(Identity::new("ferd", "U0"))
            .with_user(UserInfo::new("U1", "alice"))
            .with_user(UserInfo::new("U2", "bob")),
    );

    let bot = Ferd::from_config(transport.clone(), &config);
    bot.add_modules([ping, echo, help]);
    let session = bot.session(
        Regex::new("^ferd join$")?,
        Regex::new("^ferd leave$")?,
        SessionHandlers::new(),
    );

    bot.login().await?;

    let script = [
        ("U1", "ping"),
        ("U2", "ferd, help"),
        ("U1", "ferd join"),
        ("U1", "echo how are you?"),
        ("U2", "ferd join"),
        ("U1", "ferd leave"),
        ("U2", "still here"),
    ];
    for (user, text) in script {
        transport.message(user, "C1", text);
    }
    bot.flush().await;

    info!(present = ?session.present_users(), "Session state after script");
    bot.logout().await?;

    for reply in transport.sent() {
        println!("[{}] {}", reply.channel, reply.text);
    }

    Ok(())
}
