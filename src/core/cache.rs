//! Keyed query cache - fetch-and-cache slots with manual invalidation

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::error::{ShellError, ShellResult};

/// Cache key of the shell settings document
pub const VERGE_CONFIG_KEY: &str = "getVergeConfig";
/// Cache key of the proxy list
pub const PROXIES_KEY: &str = "getProxies";
/// Cache key of the backend configuration
pub const CLASH_CONFIG_KEY: &str = "getClashConfig";

/// Produces the value of one cache slot
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Anything that can mark a named slot stale and trigger a refetch
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &str);
}

/// Observable state of one cache slot
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    /// Last successfully fetched value
    pub data: Option<Arc<Value>>,
    /// Error of the most recent fetch, cleared on success
    pub error: Option<String>,
    /// Set by invalidation until the next fetch completes
    pub stale: bool,
    /// A fetch is in flight
    pub validating: bool,
    /// Bumped on every completed fetch
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SlotState {
    pub fn is_fresh(&self) -> bool {
        self.data.is_some() && !self.stale
    }
}

struct Slot {
    tx: watch::Sender<SlotState>,
    in_flight: bool,
    refetch_requested: bool,
}

impl Slot {
    fn new() -> Self {
        let (tx, _) = watch::channel(SlotState::default());
        Self {
            tx,
            in_flight: false,
            refetch_requested: false,
        }
    }
}

struct Inner {
    slots: Mutex<HashMap<String, Slot>>,
    fetchers: RwLock<HashMap<String, Fetcher>>,
    runtime: Handle,
}

/// Process-wide cache of backend-derived values, keyed by name
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Create a cache bound to the current tokio runtime
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                fetchers: RwLock::new(HashMap::new()),
                runtime,
            }),
        }
    }

    /// Register the fetcher backing `key`
    pub fn register<F, Fut>(&self, key: &str, fetcher: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || Box::pin(fetcher()));
        if let Ok(mut fetchers) = self.inner.fetchers.write() {
            fetchers.insert(key.to_string(), fetcher);
        }
    }

    /// Watch a slot; the receiver sees every state change
    pub fn subscribe(&self, key: &str) -> watch::Receiver<SlotState> {
        let mut slots = self.lock_slots();
        slots
            .entry(key.to_string())
            .or_insert_with(Slot::new)
            .tx
            .subscribe()
    }

    /// Current state of a slot
    pub fn snapshot(&self, key: &str) -> SlotState {
        self.lock_slots()
            .get(key)
            .map(|slot| slot.tx.borrow().clone())
            .unwrap_or_default()
    }

    /// Return fresh cached data, or revalidate and wait for the result
    pub async fn fetch(&self, key: &str) -> ShellResult<Arc<Value>> {
        if !self.has_fetcher(key) {
            return Err(ShellError::UnknownCacheKey(key.to_string()));
        }

        let mut rx = self.subscribe(key);
        let start_revision = {
            let state = rx.borrow_and_update();
            if let (true, Some(data)) = (state.is_fresh(), state.data.as_ref()) {
                return Ok(Arc::clone(data));
            }
            state.revision
        };

        self.start_if_idle(key);

        loop {
            {
                let state = rx.borrow_and_update();
                if state.revision > start_revision && !state.validating {
                    return match (&state.error, &state.data) {
                        (Some(reason), _) => Err(ShellError::CacheFetchFailed {
                            key: key.to_string(),
                            reason: reason.clone(),
                        }),
                        (None, Some(data)) => Ok(Arc::clone(data)),
                        (None, None) => Err(ShellError::CacheFetchFailed {
                            key: key.to_string(),
                            reason: "fetch produced no value".to_string(),
                        }),
                    };
                }
            }
            if rx.changed().await.is_err() {
                return Err(ShellError::CacheFetchFailed {
                    key: key.to_string(),
                    reason: "cache dropped".to_string(),
                });
            }
        }
    }

    /// Start a fetch for `key` unless one is already in flight
    fn start_if_idle(&self, key: &str) {
        let idle = self
            .lock_slots()
            .get(key)
            .map(|slot| !slot.in_flight)
            .unwrap_or(true);
        if idle {
            self.revalidate(key);
        }
    }

    /// Start a fetch for `key` unless the slot already has data or a fetch
    pub fn prefetch(&self, key: &str) {
        let needs_fetch = {
            let slots = self.lock_slots();
            slots
                .get(key)
                .map(|slot| !slot.in_flight && slot.tx.borrow().data.is_none())
                .unwrap_or(true)
        };
        if needs_fetch {
            self.revalidate(key);
        }
    }

    /// Run the fetcher for `key` in the background.
    ///
    /// A request made while a fetch is in flight is folded into one extra
    /// fetch after the current one completes.
    pub fn revalidate(&self, key: &str) {
        let Some(fetcher) = self.fetcher(key) else {
            debug!("No fetcher for '{}', revalidation skipped", key);
            return;
        };

        {
            let mut slots = self.lock_slots();
            let slot = slots.entry(key.to_string()).or_insert_with(Slot::new);
            if slot.in_flight {
                slot.refetch_requested = true;
                return;
            }
            slot.in_flight = true;
            slot.tx.send_modify(|state| state.validating = true);
        }

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.inner.runtime.spawn(async move {
            loop {
                let result = fetcher().await;
                if !inner.complete(&key, result) {
                    break;
                }
            }
        });
    }

    fn fetcher(&self, key: &str) -> Option<Fetcher> {
        self.inner
            .fetchers
            .read()
            .ok()
            .and_then(|fetchers| fetchers.get(key).cloned())
    }

    fn has_fetcher(&self, key: &str) -> bool {
        self.fetcher(key).is_some()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.lock_slots()
    }
}

impl Inner {
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // A panic while holding the lock leaves the map consistent
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a fetch result. Returns true when another fetch was requested
    /// in the meantime and should run now.
    fn complete(&self, key: &str, result: anyhow::Result<Value>) -> bool {
        let mut slots = self.lock_slots();
        let slot = slots.entry(key.to_string()).or_insert_with(Slot::new);
        let again = std::mem::take(&mut slot.refetch_requested);
        slot.in_flight = again;

        slot.tx.send_modify(|state| {
            match result {
                Ok(value) => {
                    state.data = Some(Arc::new(value));
                    state.error = None;
                    state.stale = again;
                    state.updated_at = Some(Utc::now());
                }
                Err(e) => {
                    warn!("Fetch for '{}' failed: {:#}", key, e);
                    state.error = Some(format!("{:#}", e));
                }
            }
            state.validating = again;
            state.revision += 1;
        });

        debug!("Cache slot '{}' updated (refetch queued: {})", key, again);
        again
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate(&self, key: &str) {
        {
            let mut slots = self.lock_slots();
            let slot = slots.entry(key.to_string()).or_insert_with(Slot::new);
            slot.tx.send_modify(|state| state.stale = true);
        }
        debug!("Invalidated '{}'", key);
        self.revalidate(key);
    }
}
