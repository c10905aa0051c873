//! Backend restart bridge - reconnect then reconcile caches on `restart_clash`

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::events::{EventBus, Subscription};
use super::reconcile::ReconciliationScheduler;

/// Event emitted by the host when the proxy core restarted
pub const RESTART_EVENT: &str = "restart_clash";

/// Reacts to proxy core restarts.
///
/// Each delivery is numbered; a handler whose number was overtaken by a
/// newer delivery before its reconnect finished does not schedule
/// reconciliation. Handlers still running when the bridge is stopped are
/// aborted.
pub struct RestartBridge {
    connection: Arc<ConnectionManager>,
    scheduler: Arc<ReconciliationScheduler>,
    sequence: AtomicU64,
    stopped: AtomicBool,
    handlers: Mutex<HashMap<u64, JoinHandle<()>>>,
    runtime: Handle,
}

impl RestartBridge {
    pub fn new(connection: Arc<ConnectionManager>, scheduler: Arc<ReconciliationScheduler>) -> Self {
        Self {
            connection,
            scheduler,
            sequence: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            runtime: Handle::current(),
        }
    }

    /// Register the single `restart_clash` listener
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        self.stopped.store(false, Ordering::Release);
        let bridge = Arc::clone(self);
        bus.listen(RESTART_EVENT, move |_event| {
            bridge.on_restart();
        })
    }

    /// Latest delivery number
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Abort in-flight handlers; later deliveries are ignored until the
    /// bridge is attached again
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let mut handlers = self.lock_handlers();
        let aborted = handlers.len();
        for (_, handler) in handlers.drain() {
            handler.abort();
        }
        debug!("Restart bridge stopped ({} handler(s) aborted)", aborted);
    }

    pub fn in_flight(&self) -> usize {
        self.lock_handlers()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle one delivery without blocking the bus
    pub fn on_restart(self: &Arc<Self>) {
        if self.is_stopped() {
            debug!("Restart bridge stopped, event ignored");
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        info!("Proxy core restarted (event #{})", sequence);

        let bridge = Arc::clone(self);
        let handler = self.runtime.spawn(async move {
            match bridge.connection.reconnect(true).await {
                Ok(handle) => debug!(
                    "Event #{}: connection rebuilt for {}",
                    sequence,
                    handle.base_url()
                ),
                // The core is expected to come back on its own; the staggered
                // refreshes below retry once it has warmed up.
                Err(e) => warn!("Event #{}: {}", sequence, e),
            }

            if bridge.is_stopped() {
                return;
            }
            if bridge.sequence() != sequence {
                debug!("Event #{} superseded before reconciliation", sequence);
                return;
            }
            bridge.scheduler.schedule(sequence);
        });

        let mut handlers = self.lock_handlers();
        handlers.retain(|_, h| !h.is_finished());
        if self.is_stopped() {
            handler.abort();
        } else {
            handlers.insert(sequence, handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::core::cache::{CLASH_CONFIG_KEY, PROXIES_KEY};
    use crate::core::connection::tests::FakeDiscovery;
    use crate::core::reconcile::tests::RecordingInvalidator;

    struct Harness {
        bus: EventBus,
        discovery: Arc<FakeDiscovery>,
        recorder: Arc<RecordingInvalidator>,
        scheduler: Arc<ReconciliationScheduler>,
        bridge: Arc<RestartBridge>,
    }

    fn harness(discovery: FakeDiscovery) -> Harness {
        let discovery = Arc::new(discovery);
        let recorder = Arc::new(RecordingInvalidator::default());
        let connection = Arc::new(ConnectionManager::new(
            discovery.clone(),
            Duration::from_secs(5),
        ));
        let scheduler = Arc::new(ReconciliationScheduler::new(recorder.clone()));
        Harness {
            bus: EventBus::new(),
            discovery,
            recorder,
            scheduler: Arc::clone(&scheduler),
            bridge: Arc::new(RestartBridge::new(connection, scheduler)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_restart_event_reconnects_once_and_reconciles_on_schedule() {
        let h = harness(FakeDiscovery::new());
        let _sub = h.bridge.attach(&h.bus);
        let start = Instant::now();

        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(3000)).await;

        assert_eq!(h.discovery.calls(), 1);
        let calls = h.recorder.calls();
        let keys: Vec<&str> = calls.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![CLASH_CONFIG_KEY, PROXIES_KEY, PROXIES_KEY]);

        assert!(calls[0].1 - start < Duration::from_millis(50));
        assert!(calls[1].1 - start >= Duration::from_millis(1000));
        assert!(calls[1].1 - start < Duration::from_millis(1100));
        assert!(calls[2].1 - start >= Duration::from_millis(2000));
        assert!(calls[2].1 - start < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_failure_is_swallowed_and_caches_still_refresh() {
        let discovery = FakeDiscovery::new();
        discovery.fail.store(true, Ordering::SeqCst);
        let h = harness(discovery);
        let _sub = h.bridge.attach(&h.bus);

        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(h.discovery.calls(), 1);
        assert_eq!(h.recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(h.recorder.count(PROXIES_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_restarts_reconcile_only_the_latest() {
        let h = harness(FakeDiscovery::with_delay(Duration::from_millis(300)));
        let _sub = h.bridge.attach(&h.bus);

        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(4000)).await;

        assert_eq!(h.bridge.sequence(), 2);
        assert_eq!(h.recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(h.recorder.count(PROXIES_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_reconnect_schedules_nothing() {
        let h = harness(FakeDiscovery::with_delay(Duration::from_millis(300)));
        let mut sub = h.bridge.attach(&h.bus);

        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.bridge.in_flight(), 1);

        sub.stop();
        h.bridge.stop();
        h.scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(3000)).await;

        assert_eq!(h.bridge.in_flight(), 0);
        assert!(h.recorder.calls().is_empty());
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reattached_bridge_handles_restarts_again() {
        let h = harness(FakeDiscovery::new());
        let sub = h.bridge.attach(&h.bus);
        drop(sub);
        h.bridge.stop();
        h.scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.scheduler.resume();
        let _sub = h.bridge.attach(&h.bus);
        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(h.recorder.count(CLASH_CONFIG_KEY), 1);
        assert_eq!(h.recorder.count(PROXIES_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn released_subscription_ignores_restarts() {
        let h = harness(FakeDiscovery::new());
        let sub = h.bridge.attach(&h.bus);
        drop(sub);
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.bus.emit(RESTART_EVENT, None);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(h.discovery.calls(), 0);
        assert!(h.recorder.calls().is_empty());
    }
}
