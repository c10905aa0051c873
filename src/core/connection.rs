//! Backend connection - discovery and single-flight rebuild of the controller client

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::ShellConfig;
use super::error::{ShellError, ShellResult};
use crate::persistence::Database;

/// Controller address and secret as recorded by the proxy core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClashInfo {
    /// `host:port` of the external controller
    pub server: String,
    #[serde(default)]
    pub secret: Option<String>,
}

/// A discovered, reachable controller endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub base_url: String,
    pub secret: Option<String>,
}

/// Locates the running proxy core and checks that it answers
#[async_trait]
pub trait BackendDiscovery: Send + Sync {
    async fn discover(&self) -> ShellResult<BackendEndpoint>;
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unconnected => "Unconnected",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
        }
    }
}

/// HTTP client bound to one controller endpoint
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    endpoint: BackendEndpoint,
    client: reqwest::Client,
    created_at: DateTime<Utc>,
}

impl ConnectionHandle {
    fn connect(id: u64, endpoint: BackendEndpoint, timeout: Duration) -> ShellResult<Self> {
        let client = build_client(endpoint.secret.as_deref(), timeout)?;
        Ok(Self {
            id,
            endpoint,
            client,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// GET a controller path and decode the JSON body
    pub async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.endpoint.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("controller rejected {}", url))?;
        let body = response
            .json::<Value>()
            .await
            .with_context(|| format!("invalid JSON from {}", url))?;
        Ok(body)
    }
}

fn build_client(secret: Option<&str>, timeout: Duration) -> ShellResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {}", secret))
            .map_err(|e| ShellError::unreachable(format!("invalid controller secret: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(ShellError::unreachable)
}

/// Turn a controller `server` value into an HTTP base URL
pub fn normalize_base_url(server: &str) -> String {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }

    // `:9090` and `0.0.0.0:9090` bind every interface; talk to loopback
    let host_port = if let Some(port) = trimmed.strip_prefix(':') {
        format!("127.0.0.1:{}", port)
    } else if let Some(port) = trimmed.strip_prefix("0.0.0.0:") {
        format!("127.0.0.1:{}", port)
    } else {
        trimmed.to_string()
    };
    format!("http://{}", host_port)
}

/// Discovery backed by the config store, verified with a `/version` probe
pub struct ControllerDiscovery {
    database: Arc<Database>,
    config: ShellConfig,
}

impl ControllerDiscovery {
    pub fn new(database: Arc<Database>, config: ShellConfig) -> Self {
        Self { database, config }
    }

    fn resolve_info(&self) -> ClashInfo {
        match self.database.load_clash_info() {
            Ok(Some(info)) => info,
            Ok(None) => self.fallback_info(),
            Err(e) => {
                warn!("Failed to read controller info, using defaults: {}", e);
                self.fallback_info()
            }
        }
    }

    fn fallback_info(&self) -> ClashInfo {
        ClashInfo {
            server: self.config.default_controller.clone(),
            secret: self.config.default_secret.clone(),
        }
    }
}

#[async_trait]
impl BackendDiscovery for ControllerDiscovery {
    async fn discover(&self) -> ShellResult<BackendEndpoint> {
        let info = self.resolve_info();
        let endpoint = BackendEndpoint {
            base_url: normalize_base_url(&info.server),
            secret: info.secret.filter(|s| !s.is_empty()),
        };

        let probe = build_client(endpoint.secret.as_deref(), self.config.probe_timeout())?;
        let url = format!("{}/version", endpoint.base_url);
        let response = probe
            .get(&url)
            .send()
            .await
            .map_err(|e| ShellError::unreachable(format!("{}: {}", url, e)))?;
        response
            .error_for_status()
            .map_err(|e| ShellError::unreachable(format!("{}: {}", url, e)))?;

        debug!("Controller answered at {}", endpoint.base_url);
        Ok(endpoint)
    }
}

/// Owns the single live [`ConnectionHandle`].
///
/// Rebuilds are serialized: callers that queued behind an in-flight rebuild
/// receive its result instead of starting another discovery.
pub struct ConnectionManager {
    discovery: Arc<dyn BackendDiscovery>,
    request_timeout: Duration,
    slot: Mutex<Option<Arc<ConnectionHandle>>>,
    current: RwLock<Option<Arc<ConnectionHandle>>>,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(discovery: Arc<dyn BackendDiscovery>, request_timeout: Duration) -> Self {
        Self {
            discovery,
            request_timeout,
            slot: Mutex::new(None),
            current: RwLock::new(None),
            state: RwLock::new(ConnectionState::Unconnected),
            generation: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the live handle, rebuilding it when `force_refresh` is set or
    /// no handle exists yet.
    pub async fn reconnect(&self, force_refresh: bool) -> ShellResult<Arc<ConnectionHandle>> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(handle) = slot.as_ref() {
            let rebuilt_while_waiting = self.generation.load(Ordering::Acquire) != observed;
            if !force_refresh || rebuilt_while_waiting {
                return Ok(Arc::clone(handle));
            }
        }

        let prior = self.state();
        self.set_state(if slot.is_some() {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Unconnected
        });

        let endpoint = match self.discovery.discover().await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.set_state(prior);
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = match ConnectionHandle::connect(id, endpoint, self.request_timeout) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                self.set_state(prior);
                return Err(e);
            }
        };

        *slot = Some(Arc::clone(&handle));
        if let Ok(mut current) = self.current.write() {
            *current = Some(Arc::clone(&handle));
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.set_state(ConnectionState::Connected);

        info!("Connected to controller at {} (handle {})", handle.base_url(), id);
        Ok(handle)
    }

    /// The live handle without triggering discovery
    pub fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Unconnected)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Discovery double that counts calls and can be told to fail
    pub(crate) struct FakeDiscovery {
        pub calls: AtomicUsize,
        pub fail: std::sync::atomic::AtomicBool,
        pub delay: Duration,
    }

    impl FakeDiscovery {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendDiscovery for FakeDiscovery {
        async fn discover(&self) -> ShellResult<BackendEndpoint> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ShellError::unreachable("core still starting"));
            }
            Ok(BackendEndpoint {
                base_url: "http://127.0.0.1:9090".to_string(),
                secret: Some("secret".to_string()),
            })
        }
    }

    fn manager(discovery: Arc<FakeDiscovery>) -> ConnectionManager {
        ConnectionManager::new(discovery, Duration::from_secs(5))
    }

    #[test]
    fn base_url_normalization() {
        assert_eq!(normalize_base_url("127.0.0.1:9090"), "http://127.0.0.1:9090");
        assert_eq!(normalize_base_url(":9097"), "http://127.0.0.1:9097");
        assert_eq!(normalize_base_url("0.0.0.0:9090"), "http://127.0.0.1:9090");
        assert_eq!(normalize_base_url("https://core.lan/"), "https://core.lan");
    }

    #[tokio::test]
    async fn first_call_discovers_and_connects() {
        let discovery = Arc::new(FakeDiscovery::new());
        let manager = manager(Arc::clone(&discovery));
        assert_eq!(manager.state(), ConnectionState::Unconnected);

        let handle = manager.reconnect(false).await.unwrap();
        assert_eq!(handle.base_url(), "http://127.0.0.1:9090");
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(discovery.calls(), 1);
    }

    #[tokio::test]
    async fn non_forced_reconnect_reuses_live_handle() {
        let discovery = Arc::new(FakeDiscovery::new());
        let manager = manager(Arc::clone(&discovery));

        let first = manager.reconnect(false).await.unwrap();
        let second = manager.reconnect(false).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discovery.calls(), 1);
    }

    #[tokio::test]
    async fn forced_reconnect_replaces_handle() {
        let discovery = Arc::new(FakeDiscovery::new());
        let manager = manager(Arc::clone(&discovery));

        let first = manager.reconnect(false).await.unwrap();
        let second = manager.reconnect(true).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &second));
        assert_eq!(discovery.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_forced_reconnects_share_one_discovery() {
        let discovery = Arc::new(FakeDiscovery::with_delay(Duration::from_millis(200)));
        let manager = Arc::new(manager(Arc::clone(&discovery)));
        manager.reconnect(false).await.unwrap();

        let a = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.reconnect(true).await }
        });
        let b = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.reconnect(true).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(discovery.calls(), 2);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_handle_and_state() {
        let discovery = Arc::new(FakeDiscovery::new());
        let manager = manager(Arc::clone(&discovery));
        let first = manager.reconnect(false).await.unwrap();

        discovery.fail.store(true, Ordering::SeqCst);
        let err = manager.reconnect(true).await.unwrap_err();

        assert!(err.is_unreachable());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &first));
    }

    #[tokio::test]
    async fn failed_first_discovery_stays_unconnected() {
        let discovery = Arc::new(FakeDiscovery::new());
        discovery.fail.store(true, Ordering::SeqCst);
        let manager = manager(Arc::clone(&discovery));

        assert!(manager.reconnect(false).await.is_err());
        assert_eq!(manager.state(), ConnectionState::Unconnected);
        assert!(manager.current().is_none());
    }

    #[test]
    fn stored_controller_info_replaces_the_configured_default() {
        let database = Database::open_in_memory().unwrap();
        database.initialize().unwrap();
        let database = Arc::new(database);
        let discovery = ControllerDiscovery::new(Arc::clone(&database), ShellConfig::default());
        assert_eq!(discovery.resolve_info().server, "127.0.0.1:9090");

        let info = ClashInfo {
            server: ":9097".to_string(),
            secret: Some("s3cret".to_string()),
        };
        database.save_clash_info(&info).unwrap();
        assert_eq!(discovery.resolve_info(), info);
    }
}
