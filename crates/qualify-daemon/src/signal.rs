//! Wake signal between the dispatcher and the background worker.
//!
//! The signal carries no payload. The dispatcher bumps a counter after
//! appending a mutation; the worker compares the counter with the value it
//! last saw and otherwise sleeps until the poll interval elapses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Why a wait on the [`WakeSignal`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The counter moved past the value the waiter had seen.
    Pinged,
    /// Woken without a ping, e.g. for shutdown.
    Woken,
    /// The timeout elapsed.
    Timeout,
}

/// Counter-plus-notify wake signal.
#[derive(Debug, Default)]
pub struct WakeSignal {
    pings: AtomicU64,
    notify: Notify,
}

impl WakeSignal {
    /// Creates a signal with a zero counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter and wakes the waiter. Returns the new count.
    pub fn ping(&self) -> u64 {
        let count = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify.notify_one();
        count
    }

    /// Wakes the waiter without counting a ping.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Number of pings so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Waits until the counter differs from `seen`, a wake-up arrives or
    /// `timeout` elapses.
    pub async fn wait(&self, seen: u64, timeout: Duration) -> WakeReason {
        let notified = self.notify.notified();
        if self.count() != seen {
            return WakeReason::Pinged;
        }

        tokio::select! {
            () = notified => {
                if self.count() == seen {
                    WakeReason::Woken
                } else {
                    WakeReason::Pinged
                }
            },
            () = tokio::time::sleep(timeout) => WakeReason::Timeout,
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_wait_times_out_without_ping() {
        let signal = WakeSignal::new();
        let reason = signal.wait(0, Duration::from_millis(10)).await;
        assert_eq!(reason, WakeReason::Timeout);
    }

    #[tokio::test]
    async fn test_missed_ping_returns_immediately() {
        let signal = WakeSignal::new();
        assert_eq!(signal.ping(), 1);
        let reason = signal.wait(0, Duration::from_secs(30)).await;
        assert_eq!(reason, WakeReason::Pinged);
    }

    #[tokio::test]
    async fn test_ping_wakes_waiter() {
        let signal = Arc::new(WakeSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait(0, Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.ping();

        assert_eq!(waiter.await.unwrap(), WakeReason::Pinged);
        assert_eq!(signal.count(), 1);
    }

    #[tokio::test]
    async fn test_wake_does_not_count() {
        let signal = WakeSignal::new();
        signal.wake();
        let reason = signal.wait(0, Duration::from_secs(30)).await;
        assert_eq!(reason, WakeReason::Woken);
        assert_eq!(signal.count(), 0);
    }
}
