use std::time::Duration;
use tokio::sync::watch;

/// Receiver half of the supervisor's shutdown channel.
///
/// Every suspension point in the supervision loop sleeps through
/// [`ShutdownSignal::sleep`] so a stop request interrupts the wait
/// instead of riding it out.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Also resolves if the sender
    /// side is gone, which only happens when the supervisor is dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Sleep for `duration`, waking early on shutdown. Returns `true`
    /// when the full duration elapsed, `false` when interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.triggered() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let (_tx, mut signal) = ShutdownSignal::new();
        assert!(signal.sleep(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, mut signal) = ShutdownSignal::new();

        let waiter = tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await });

        tx.send(true).unwrap();
        let completed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("sleep did not wake on shutdown")
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_triggered_sleep_returns_immediately() {
        let (tx, mut signal) = ShutdownSignal::new();
        tx.send(true).unwrap();
        assert!(!signal.sleep(Duration::from_secs(60)).await);
    }
}
