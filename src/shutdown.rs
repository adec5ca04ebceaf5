//! Cooperative stop signal shared by the workers.
//!
//! Level-triggered: once `stop()` is called every token reports stopped
//! forever. Workers check `is_stopped()` at the top of each loop iteration
//! and may also await `stopped()` alongside a receive or a sleep to wake
//! before the timeout elapses.

use tokio::sync::watch;

/// Owning side of the stop signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

/// Cloneable observer handed to workers.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// True once the signal is raised or the `StopSignal` is dropped.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the signal is raised. Also resolves if the `StopSignal`
    /// was dropped, which is treated as a stop.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // wait_for checks the current value first, so an already-raised
        // signal resolves immediately.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
