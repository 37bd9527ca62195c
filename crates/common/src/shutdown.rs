//! Process-wide cancellation signal
//!
//! One [`ShutdownTrigger`] fans out to any number of [`ShutdownListener`]s.
//! Async loops await [`ShutdownListener::triggered`]; blocking reader threads
//! poll [`ShutdownListener::is_triggered`] between timed reads. Dropping the
//! trigger counts as a shutdown request.

use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Granularity of [`ShutdownListener::sleep`]
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Owner side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown of every listener
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Create another listener
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Listener side of the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until shutdown is requested
    pub async fn triggered(&mut self) {
        // Err means the trigger was dropped, which is also a shutdown
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Blocking sleep that returns early on shutdown
    ///
    /// Returns `true` if shutdown was requested during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Create a shutdown signal
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownListener { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_reaches_all_listeners() {
        let (trigger, listener) = shutdown_channel();
        let other = listener.clone();
        let late = trigger.subscribe();

        assert!(!listener.is_triggered());
        trigger.trigger();
        assert!(listener.is_triggered());
        assert!(other.is_triggered());
        assert!(late.is_triggered());
    }

    #[test]
    fn test_dropped_trigger_counts_as_shutdown() {
        let (trigger, listener) = shutdown_channel();
        drop(trigger);
        assert!(listener.is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_wakes() {
        let (trigger, mut listener) = shutdown_channel();

        let waiter = tokio::spawn(async move {
            listener.triggered().await;
        });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("listener did not wake")
            .unwrap();
    }

    #[test]
    fn test_sleep_interrupted() {
        let (trigger, listener) = shutdown_channel();

        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let interrupted = listener.sleep(Duration::from_secs(10));
            (interrupted, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(100));
        trigger.trigger();

        let (interrupted, elapsed) = handle.join().unwrap();
        assert!(interrupted);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let (_trigger, listener) = shutdown_channel();
        assert!(!listener.sleep(Duration::from_millis(20)));
    }
}
