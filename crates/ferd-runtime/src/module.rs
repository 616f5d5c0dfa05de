//! Conversational modules.
//!
//! A module is a setup function that registers listeners on a bot. Any
//! `Fn(&Ferd)` is a module:
//!
//! ```rust,ignore
//! fn ping(bot: &Ferd) {
//!     bot.listen(Regex::new("^ping$").unwrap(), |res: Response| async move {
//!         res.send("pong").await
//!     });
//! }
//!
//! bot.add_modules([ping, greeter]);
//! ```

use crate::bot::Ferd;

/// Something that registers behavior on a [`Ferd`] bot.
pub trait Module {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Registers the module's listeners on `bot`.
    fn setup(&self, bot: &Ferd);
}

impl<F> Module for F
where
    F: Fn(&Ferd),
{
    fn setup(&self, bot: &Ferd) {
        self(bot)
    }
}
