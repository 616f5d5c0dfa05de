//! Error types for the Ferd framework.

use thiserror::Error;

/// Errors that terminate a single listener.
///
/// A listener that produces one of these is unsubscribed by the stream; other
/// listeners never see it.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener's callback returned an error.
    #[error("listener /{pattern}/ callback failed: {error:#}")]
    Callback {
        /// Source of the listener's pattern.
        pattern: String,
        /// The error returned by the callback.
        error: anyhow::Error,
    },
}

impl ListenerError {
    /// Wraps a callback error.
    pub fn callback(pattern: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Callback {
            pattern: pattern.into(),
            error,
        }
    }
}

/// Result type for listener execution.
pub type ListenerResult<T> = Result<T, ListenerError>;
