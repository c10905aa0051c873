//! Staggered cache reconciliation after a backend restart
//!
//! The proxy list is refreshed twice on a fixed schedule. No readiness
//! signal from the core is awaited.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::cache::{CacheInvalidator, CLASH_CONFIG_KEY, PROXIES_KEY};

/// Delays of the proxy-list refreshes, measured from scheduling
pub const PROXY_REFRESH_DELAYS: [Duration; 2] =
    [Duration::from_millis(1000), Duration::from_millis(2000)];

#[derive(Default)]
struct PendingRound {
    sequence: u64,
    timers: Vec<JoinHandle<()>>,
    /// Set by `shutdown`; no round is scheduled until `resume`
    closed: bool,
}

impl PendingRound {
    fn abort(&mut self) -> usize {
        let mut aborted = 0;
        for timer in self.timers.drain(..) {
            if !timer.is_finished() {
                aborted += 1;
            }
            timer.abort();
        }
        aborted
    }
}

/// Issues the post-restart invalidations and owns their pending timers
pub struct ReconciliationScheduler {
    invalidator: Arc<dyn CacheInvalidator>,
    pending: Mutex<PendingRound>,
    runtime: Handle,
}

impl ReconciliationScheduler {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self::with_runtime(invalidator, Handle::current())
    }

    pub fn with_runtime(invalidator: Arc<dyn CacheInvalidator>, runtime: Handle) -> Self {
        Self {
            invalidator,
            pending: Mutex::new(PendingRound::default()),
            runtime,
        }
    }

    /// Schedule one reconciliation round for restart `sequence`.
    ///
    /// The backend configuration is invalidated immediately, the proxy list
    /// after each of [`PROXY_REFRESH_DELAYS`]. Pending timers of an older
    /// round are aborted; a round older than the current one is ignored.
    pub fn schedule(&self, sequence: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.closed {
            debug!("Scheduler shut down, round {} dropped", sequence);
            return;
        }
        if sequence < pending.sequence {
            debug!(
                "Reconciliation round {} superseded by {}, skipped",
                sequence, pending.sequence
            );
            return;
        }

        let aborted = pending.abort();
        if aborted > 0 {
            debug!("Round {} cancelled {} pending refresh(es)", sequence, aborted);
        }
        pending.sequence = sequence;

        self.invalidator.invalidate(CLASH_CONFIG_KEY);

        for delay in PROXY_REFRESH_DELAYS {
            let invalidator = Arc::clone(&self.invalidator);
            pending.timers.push(self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                invalidator.invalidate(PROXIES_KEY);
            }));
        }

        debug!("Scheduled reconciliation round {}", sequence);
    }

    /// Abort every pending refresh
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let aborted = pending.abort();
        if aborted > 0 {
            debug!("Cancelled {} pending refresh(es)", aborted);
        }
    }

    /// Abort every pending refresh and refuse later rounds
    pub fn shutdown(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.closed = true;
        let aborted = pending.abort();
        debug!("Scheduler shut down ({} pending refresh(es) cancelled)", aborted);
    }

    /// Accept rounds again after `shutdown`
    pub fn resume(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.closed = false;
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .map(|p| p.timers.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::time::Instant;

    use super::*;

    /// Records every invalidation with the (paused) clock time
    #[derive(Default)]
    pub(crate) struct RecordingInvalidator {
        pub calls: Mutex<Vec<(String, Instant)>>,
    }

    impl RecordingInvalidator {
        pub(crate) fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, key: &str) -> usize {
            self.calls().iter().filter(|(k, _)| k == key).count()
        }
    }

    impl CacheInvalidator for RecordingInvalidator {
        fn invalidate(&self, key: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((key.to_string(), Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_round_invalidates_config_now_and_proxies_twice() {
        let recorder = Arc::new(RecordingInvalidator::default());
        let scheduler = ReconciliationScheduler::new(recorder.clone());
        let start = Instant::now();

        scheduler.schedule(1);
        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(recorder.count(PROXIES_KEY), 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, CLASH_CONFIG_KEY);
        assert_eq!(calls[0].1, start);
        assert_eq!(calls[1].0, PROXIES_KEY);
        assert!(calls[1].1 - start >= Duration::from_millis(1000));
        assert!(calls[1].1 - start < Duration::from_millis(1100));
        assert_eq!(calls[2].0, PROXIES_KEY);
        assert!(calls[2].1 - start >= Duration::from_millis(2000));
        assert!(calls[2].1 - start < Duration::from_millis(2100));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_round_cancels_older_pending_refreshes() {
        let recorder = Arc::new(RecordingInvalidator::default());
        let scheduler = ReconciliationScheduler::new(recorder.clone());

        scheduler.schedule(1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.schedule(2);
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // round 1: config + first proxies refresh; round 2: all three
        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 2);
        assert_eq!(recorder.count(PROXIES_KEY), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_round_is_ignored() {
        let recorder = Arc::new(RecordingInvalidator::default());
        let scheduler = ReconciliationScheduler::new(recorder.clone());

        scheduler.schedule(5);
        scheduler.schedule(4);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(recorder.count(PROXIES_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_stops_delayed_refreshes() {
        let recorder = Arc::new(RecordingInvalidator::default());
        let scheduler = ReconciliationScheduler::new(recorder.clone());

        scheduler.schedule(1);
        scheduler.cancel_pending();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(recorder.count(PROXIES_KEY), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shut_down_scheduler_refuses_rounds_until_resumed() {
        let recorder = Arc::new(RecordingInvalidator::default());
        let scheduler = ReconciliationScheduler::new(recorder.clone());

        scheduler.schedule(1);
        scheduler.shutdown();
        scheduler.schedule(2);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(recorder.count(PROXIES_KEY), 0);

        scheduler.resume();
        scheduler.schedule(3);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(recorder.count(CLASH_CONFIG_KEY), 2);
        assert_eq!(recorder.count(PROXIES_KEY), 2);
    }
}
