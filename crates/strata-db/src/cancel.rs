use tokio::sync::watch;

use crate::error::{MigrationError, Result};

/// Create a linked handle and signal. Calling [`CancelHandle::cancel`]
/// fires every clone of the signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// The owning side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observes cancellation requests. Checked synchronously at every migration
/// checkpoint, or awaited while a connection is being opened.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `Err(Canceled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(MigrationError::Canceled);
        }
        Ok(())
    }

    /// Resolves when cancellation is requested. Pending forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn never_signal_is_never_cancelled() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert!(signal.check().is_ok());
    }

    #[test]
    fn cancel_reaches_every_clone() {
        let (handle, signal) = cancel_pair();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(signal.is_cancelled());
        assert!(matches!(clone.check(), Err(MigrationError::Canceled)));
    }

    #[test]
    fn dropping_the_handle_does_not_cancel() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let (handle, signal) = cancel_pair();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::task::yield_now().await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_stays_pending_without_cancel() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
