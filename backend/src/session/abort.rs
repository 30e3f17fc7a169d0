//! Session-wide cancellation.
//!
//! One [`AbortController`] per upload session. Every transport call receives
//! an [`AbortSignal`] cloned from it and races its network I/O against the
//! signal, so firing the controller stops the in-flight transfer and keeps the
//! next queued file from starting.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{TransportError, TransportResult};

/// Owner side of the cancellation token.
#[derive(Debug, Clone)]
pub struct AbortController {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Signal handed to transports.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal { receiver: self.sender.subscribe() }
    }

    /// Fire the token. Idempotent.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the cancellation token.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// `Err(Aborted)` once the token fired.
    pub fn check(&self) -> TransportResult<()> {
        if self.is_aborted() {
            Err(TransportError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Resolves when the token fires; pends forever if it never can.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|aborted| *aborted).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the token fires first.
    ///
    /// The token is checked before polling, so an already-aborted signal never
    /// starts the operation.
    pub async fn race<F, T>(&self, fut: F) -> TransportResult<T>
    where
        F: Future<Output = TransportResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.aborted() => Err(TransportError::Aborted),
            result = fut => result,
        }
    }
}
