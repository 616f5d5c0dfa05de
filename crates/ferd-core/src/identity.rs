//! The bot's own identity, captured once when the transport is ready.
//!
//! Until the transport's ready signal arrives the cell is empty, and anything
//! keyed on the bot's name or id (mention matching) simply does not match.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// The bot's own name and id as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name of the bot user.
    pub name: String,
    /// Transport-level id of the bot user.
    pub id: String,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Returns `true` if `text` addresses the bot.
    ///
    /// Matches, case-insensitively, either the bot's name anywhere in the
    /// text or a mention of its id (`<@ID>` or `<ID>`).
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        let id = self.id.to_lowercase();

        (!self.name.is_empty() && text.contains(&self.name.to_lowercase()))
            || (!id.is_empty()
                && (text.contains(&format!("<@{id}>")) || text.contains(&format!("<{id}>"))))
    }
}

/// A shared, write-once slot for the bot's [`Identity`].
///
/// Cloning the cell shares the slot.
#[derive(Debug, Clone, Default)]
pub struct IdentityCell {
    inner: Arc<OnceLock<Identity>>,
}

impl IdentityCell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the identity if none has been captured yet.
    ///
    /// Returns `true` when this call performed the bootstrap, `false` if an
    /// identity was already present (the new value is discarded).
    pub fn bootstrap(&self, identity: Identity) -> bool {
        self.inner.set(identity).is_ok()
    }

    /// Returns the captured identity, if any.
    pub fn get(&self) -> Option<&Identity> {
        self.inner.get()
    }

    /// Returns `true` once the identity has been captured.
    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Returns `true` if the identity is known and `text` mentions it.
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        self.get().is_some_and(|identity| identity.is_mentioned_in(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_happens_once() {
        let cell = IdentityCell::new();
        assert!(!cell.is_ready());

        assert!(cell.bootstrap(Identity::new("ferd", "U0")));
        assert!(!cell.bootstrap(Identity::new("other", "U9")));

        assert_eq!(cell.get(), Some(&Identity::new("ferd", "U0")));
    }

    #[test]
    fn test_clones_share_the_slot() {
        let cell = IdentityCell::new();
        let shared = cell.clone();
        cell.bootstrap(Identity::new("ferd", "U0"));
        assert!(shared.is_ready());
    }

    #[test]
    fn test_mention_matching() {
        let identity = Identity::new("Ferd", "U024BE7LH");

        assert!(identity.is_mentioned_in("hey ferd, what's up"));
        assert!(identity.is_mentioned_in("FERD!"));
        assert!(identity.is_mentioned_in("<@U024BE7LH> ping"));
        assert!(identity.is_mentioned_in("<u024be7lh> ping"));
        assert!(!identity.is_mentioned_in("hey fred"));
        assert!(!identity.is_mentioned_in("U024BE7LH without brackets"));
    }

    #[test]
    fn test_empty_cell_never_matches() {
        let cell = IdentityCell::new();
        assert!(!cell.is_mentioned_in("ferd"));
        assert!(!cell.is_mentioned_in(""));
    }
}
