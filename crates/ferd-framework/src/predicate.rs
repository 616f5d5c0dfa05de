//! Structural predicates evaluated before a listener's pattern.

use std::sync::Arc;

use ferd_core::{IdentityCell, InboundMessage};

/// A type-erased predicate over inbound messages.
pub type Predicate = Arc<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

/// Wraps a closure as a [`Predicate`].
pub fn from_fn<F>(f: F) -> Predicate
where
    F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Matches every message.
pub fn always() -> Predicate {
    Arc::new(|_| true)
}

/// Matches messages that mention the bot by name or id.
///
/// Never matches before the identity has been bootstrapped.
pub fn mentions(identity: IdentityCell) -> Predicate {
    Arc::new(move |message| {
        message
            .text()
            .is_some_and(|text| identity.is_mentioned_in(text))
    })
}

/// Matches messages sent by `user_id`.
pub fn from_user(user_id: impl Into<String>) -> Predicate {
    let user_id = user_id.into();
    Arc::new(move |message| message.user_id() == Some(user_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferd_core::{Identity, RawMessage};

    fn msg(user: &str, text: &str) -> InboundMessage {
        InboundMessage::from_raw(RawMessage::message(user, "C1", text)).unwrap()
    }

    #[test]
    fn test_mentions_waits_for_identity() {
        let identity = IdentityCell::new();
        let predicate = mentions(identity.clone());

        assert!(!predicate(&msg("U1", "hey ferd")));
        assert!(!predicate(&msg("U1", "<@U0> hi")));

        identity.bootstrap(Identity::new("ferd", "U0"));

        assert!(predicate(&msg("U1", "hey FERD")));
        assert!(predicate(&msg("U1", "<@U0> hi")));
        assert!(!predicate(&msg("U1", "hello world")));
    }

    #[test]
    fn test_from_user() {
        let predicate = from_user("U1");
        assert!(predicate(&msg("U1", "x")));
        assert!(!predicate(&msg("U2", "x")));
    }
}
