// Cancellation of orchestrator waits
//
// Cancels the *wait*, never the remote job.

use tokio::sync::watch;

/// Cancellation signal observed by batch and job waits
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for cancellation
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Sender dropped without cancelling: never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancel sender
pub struct CancelSender {
    tx: watch::Sender<bool>,
}

impl CancelSender {
    /// Signal cancellation to every token
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancel channel
pub fn cancel_channel() -> (CancelSender, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSender { tx }, CancelToken { rx })
}
