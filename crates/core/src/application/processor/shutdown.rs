// Processor / scheduler shutdown token

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal; a dropped sender counts as shutdown
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every loop holding a token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token observing this sender
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_subscribers_observe_shutdown() {
        let (tx, token) = shutdown_channel();
        let mut other = tx.subscribe();
        tx.shutdown();

        assert!(token.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), other.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_releases_waiters() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .unwrap();
    }
}
