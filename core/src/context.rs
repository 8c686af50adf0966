//! Request context with explicit cancellation.
//!
//! A [`Context`] travels with every published event and every gateway call.
//! It either follows a cancellation signal (a `watch` channel flipped to
//! `true` on shutdown or when the originating request goes away) or is a
//! background context that is never cancelled.
//!
//! Events republished after a domain write use [`Context::detached`]: their
//! lifetime is independent of the request that triggered them.

use tokio::sync::watch;

/// Cancellation signal plus tracing metadata for one unit of work.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<watch::Receiver<bool>>,
    request_id: Option<String>,
}

impl Context {
    /// A context that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled when `signal` turns `true`.
    #[must_use]
    pub const fn with_cancellation(signal: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(signal),
            request_id: None,
        }
    }

    /// Attach a request id, recorded in tracing fields.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Same metadata, no cancellation.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            cancel: None,
            request_id: self.request_id.clone(),
        }
    }

    /// Request id, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Whether cancellation has already fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|signal| *signal.borrow())
    }

    /// Resolve once cancellation fires.
    ///
    /// Never resolves for a background context, nor when the sending half
    /// was dropped without signalling.
    pub async fn cancelled(&self) {
        if let Some(signal) = &self.cancel {
            let mut signal = signal.clone();
            if signal.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
