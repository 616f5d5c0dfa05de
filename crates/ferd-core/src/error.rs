//! Unified error types for the Ferd core.
//!
//! Listener-level errors live in `ferd-framework`; this module only covers
//! what the transport contract and the message stream can report.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// The transport is not connected.
    #[error("transport is not connected")]
    NotConnected,

    /// The message being answered carries no channel to reply to.
    #[error("message has no channel to reply to")]
    MissingChannel,

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Error raised by a stream observer while handling one message.
///
/// The stream treats any such error as terminal for that observer only.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type returned by [`MessageObserver::on_next`](crate::MessageObserver::on_next).
pub type ObserverResult = Result<(), ObserverError>;
