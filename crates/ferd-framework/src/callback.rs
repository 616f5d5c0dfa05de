//! Listener callbacks.
//!
//! A callback is any async function taking a [`Response`] and returning
//! either `()` or a `Result<(), E>` with `E: Into<anyhow::Error>`:
//!
//! ```rust,ignore
//! use ferd_framework::Response;
//!
//! // Fire and forget
//! async fn log_it(res: Response) {
//!     tracing::info!(text = res.text(), "seen");
//! }
//!
//! // Fallible: an error here unsubscribes the listener
//! async fn pong(res: Response) -> anyhow::Result<()> {
//!     res.send("pong").await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::response::Response;

// ============================================================================
// CallbackResult - normalize callback return values
// ============================================================================

/// Return types a callback may produce.
pub trait CallbackResult: Send + 'static {
    /// Converts the value into the listener's outcome.
    fn into_result(self) -> anyhow::Result<()>;
}

impl CallbackResult for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> CallbackResult for Result<(), E>
where
    E: Into<anyhow::Error> + Send + 'static,
{
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Callback Trait
// ============================================================================

/// Something a listener invokes with a [`Response`] when it matches.
///
/// Blanket-implemented for `Fn(Response) -> impl Future<Output = impl CallbackResult>`.
pub trait Callback: Send + Sync + 'static {
    /// Invokes the callback.
    fn call(&self, response: Response) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut, R> Callback for F
where
    F: Fn(Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: CallbackResult,
{
    fn call(&self, response: Response) -> BoxFuture<'static, anyhow::Result<()>> {
        (self)(response).map(CallbackResult::into_result).boxed()
    }
}

/// A type-erased callback that can be shared between listeners.
pub type BoxedCallback = Arc<dyn Callback>;

/// Erases a callback's type.
pub fn into_callback<C: Callback>(callback: C) -> BoxedCallback {
    Arc::new(callback)
}
