use std::sync::Arc;

use tokio::sync::watch;

/// Creates a connected abort handle and signal.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

/// Caller side of a cancellation token.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// A pending unary call fails with `AdapterError::Cancelled`; an open
    /// stream ends without producing further events.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation token, carried in `CallOptions`.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Returns `true` once the paired handle has aborted.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the paired handle aborts.
    ///
    /// Never resolves if the handle is dropped without aborting.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl PartialEq for AbortSignal {
    fn eq(&self, other: &Self) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn abort_wakes_waiting_signal() {
        let (handle, signal) = abort_pair();
        assert!(!signal.is_aborted());
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("signal resolved")
            .expect("join");
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, signal) = abort_pair();
        drop(handle);
        let res = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(res.is_err());
    }
}
