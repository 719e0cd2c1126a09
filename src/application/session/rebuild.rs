use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Debounced "recompute this file" requests.
///
/// Holds at most one pending request: each [`RebuildSignal::signal`]
/// overwrites the previous one and restarts the quiet window. The consumer
/// gets the newest request once no signal has arrived for the whole window.
#[derive(Debug)]
pub struct RebuildSignal {
    pending: Mutex<Option<u64>>,
    notify: Notify,
    quiet: Duration,
}

impl RebuildSignal {
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            notify: Notify::new(),
            quiet,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Request a rebuild for document `version`, superseding any pending request.
    pub fn signal(&self, version: u64) {
        let superseded = self.pending.lock().replace(version);
        if let Some(previous) = superseded {
            log::debug!("rebuild request for version {previous} superseded by {version}");
        }
        self.notify.notify_one();
    }

    /// Take the pending request without waiting.
    pub fn take_pending(&self) -> Option<u64> {
        self.pending.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Wait for the next request to settle and take it.
    pub async fn next(&self) -> u64 {
        loop {
            self.notify.notified().await;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.quiet) => break,
                    _ = self.notify.notified() => continue,
                }
            }

            if let Some(version) = self.take_pending() {
                return version;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rapid_signals_coalesce_into_latest() {
        let signal = Arc::new(RebuildSignal::new(Duration::from_millis(150)));
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.next().await })
        };

        for version in 1..=5 {
            signal.signal(version);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(waiter.await.unwrap(), 5);
        assert!(!signal.has_pending());
    }

    #[tokio::test]
    async fn test_request_waits_for_quiet_window() {
        let signal = Arc::new(RebuildSignal::new(Duration::from_millis(300)));
        signal.signal(1);

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.next().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert!(signal.has_pending());

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[test]
    fn test_take_pending_empties_slot() {
        let signal = RebuildSignal::new(Duration::from_millis(10));
        assert_eq!(signal.take_pending(), None);
        signal.signal(3);
        signal.signal(4);
        assert_eq!(signal.take_pending(), Some(4));
        assert_eq!(signal.take_pending(), None);
    }
}
