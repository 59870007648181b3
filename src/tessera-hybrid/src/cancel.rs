//! Cooperative cancellation of multi-group evaluation.

use tokio::sync::watch;

/// Handle for cancelling a running evaluation.
///
/// The evaluation holds the receiving side and checks it between groups,
/// never in the middle of one.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a new cancellation handle and receiver.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel_tx: tx }, rx)
    }

    /// Request cancellation. Takes effect at the next check.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Another receiver for the same signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_receivers() {
        let (handle, rx) = CancellationHandle::new();
        let late = handle.subscribe();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(*rx.borrow());
        assert!(*late.borrow());
    }

    #[test]
    fn test_cancel_without_receivers() {
        let handle = CancellationHandle::default();
        handle.cancel();
        assert!(handle.is_cancelled());
    }
}
