//! Application state - wiring of the synchronization core

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use super::cache::{CacheInvalidator, QueryCache, CLASH_CONFIG_KEY, PROXIES_KEY, VERGE_CONFIG_KEY};
use super::config::ShellConfig;
use super::connection::{BackendDiscovery, ClashInfo, ConnectionManager, ControllerDiscovery};
use super::events::{EventBus, Subscription};
use super::reconcile::ReconciliationScheduler;
use super::restart::{RestartBridge, RESTART_EVENT};
use super::settings::VergeConfig;
use super::theme_state::ThemeState;
use super::theme_sync::ThemeSynchronizer;
use crate::persistence::Database;

/// Central application state.
///
/// Must be created inside a tokio runtime context.
#[derive(Clone)]
pub struct AppState {
    /// Shell configuration
    pub config: ShellConfig,
    /// Config store
    pub database: Arc<Database>,
    /// Host event bus
    pub bus: EventBus,
    /// Backend-derived data caches
    pub cache: QueryCache,
    /// Controller connection
    pub connection: Arc<ConnectionManager>,
    /// Shared palette mode and blur cells
    pub theme: ThemeState,
    scheduler: Arc<ReconciliationScheduler>,
    restart: Arc<RestartBridge>,
}

impl AppState {
    /// Create a new application state using store-backed controller discovery
    pub fn new(config: ShellConfig, database: Database) -> Result<Self> {
        let database = Arc::new(database);
        let discovery = Arc::new(ControllerDiscovery::new(
            Arc::clone(&database),
            config.clone(),
        ));
        Ok(Self::with_discovery(config, database, discovery))
    }

    pub fn with_discovery(
        config: ShellConfig,
        database: Arc<Database>,
        discovery: Arc<dyn BackendDiscovery>,
    ) -> Self {
        let cache = QueryCache::new();
        let connection = Arc::new(ConnectionManager::new(discovery, config.request_timeout()));
        let scheduler = Arc::new(ReconciliationScheduler::new(Arc::new(cache.clone())));
        let restart = Arc::new(RestartBridge::new(
            Arc::clone(&connection),
            Arc::clone(&scheduler),
        ));

        let state = Self {
            config,
            database,
            bus: EventBus::new(),
            cache,
            connection,
            theme: ThemeState::new(),
            scheduler,
            restart,
        };
        state.register_fetchers();
        state
    }

    fn register_fetchers(&self) {
        let database = Arc::clone(&self.database);
        self.cache.register(VERGE_CONFIG_KEY, move || {
            let database = Arc::clone(&database);
            async move {
                let config = database.load_verge_config()?.unwrap_or_default();
                Ok(config.to_value()?)
            }
        });

        for (key, path) in [(PROXIES_KEY, "/proxies"), (CLASH_CONFIG_KEY, "/configs")] {
            let connection = Arc::clone(&self.connection);
            self.cache.register(key, move || {
                let connection = Arc::clone(&connection);
                async move {
                    let handle = connection.reconnect(false).await?;
                    handle.get_json(path).await
                }
            });
        }
    }

    /// Start the synchronization core; it runs until the guard is dropped
    pub fn start_sync(&self) -> SyncGuard {
        self.scheduler.resume();
        let subscription = self.restart.attach(&self.bus);
        let theme_task = ThemeSynchronizer::new(self.cache.clone(), self.theme.clone()).spawn();
        info!("Synchronization core started");

        SyncGuard {
            subscription,
            theme_task,
            restart: Arc::clone(&self.restart),
            scheduler: Arc::clone(&self.scheduler),
        }
    }

    /// Merge `patch` into the settings document and refetch it
    pub fn patch_verge_config(&self, patch: &Value) -> Result<VergeConfig> {
        let patched = self.database.patch_verge_config(patch)?;
        self.cache.invalidate(VERGE_CONFIG_KEY);
        Ok(patched)
    }

    /// Stored controller address, if one was saved
    pub fn controller_info(&self) -> Result<Option<ClashInfo>> {
        self.database.load_clash_info()
    }

    /// Save a new controller address and force a reconnect to it
    pub fn update_controller(&self, server: &str, secret: Option<&str>) -> Result<ClashInfo> {
        let server = server.trim();
        if server.is_empty() {
            bail!("Controller address must not be empty");
        }
        let info = ClashInfo {
            server: server.to_string(),
            secret: secret.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        };
        self.database.save_clash_info(&info)?;
        info!("Controller set to {}", info.server);

        self.notify_core_restarted();
        Ok(info)
    }

    /// Announce a proxy core restart on the bus
    pub fn notify_core_restarted(&self) {
        self.bus.emit(RESTART_EVENT, None);
    }

    /// Number of restart events handled so far
    pub fn restart_count(&self) -> u64 {
        self.restart.sequence()
    }
}

/// Keeps the synchronization core alive; releases it on drop
pub struct SyncGuard {
    subscription: Subscription,
    theme_task: JoinHandle<()>,
    restart: Arc<RestartBridge>,
    scheduler: Arc<ReconciliationScheduler>,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.subscription.stop();
        self.restart.stop();
        self.theme_task.abort();
        self.scheduler.shutdown();
        info!("Synchronization core stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::core::connection::tests::FakeDiscovery;
    use crate::core::settings::PaletteMode;

    fn state() -> AppState {
        let database = Database::open_in_memory().unwrap();
        database.initialize().unwrap();
        AppState::with_discovery(
            ShellConfig::default(),
            Arc::new(database),
            Arc::new(FakeDiscovery::new()),
        )
    }

    #[tokio::test]
    async fn settings_patch_reaches_theme_state() {
        let state = state();
        let _guard = state.start_sync();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.theme.palette_mode(), PaletteMode::Light);

        state
            .patch_verge_config(&json!({ "theme_mode": "dark", "theme_blur": true }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(state.theme.palette_mode(), PaletteMode::Dark);
        assert!(state.theme.theme_blur());
    }

    #[tokio::test]
    async fn settings_fetch_serves_stored_document() {
        let state = state();
        state
            .database
            .patch_verge_config(&json!({ "language": "en" }))
            .unwrap();

        let value = state.cache.fetch(VERGE_CONFIG_KEY).await.unwrap();
        assert_eq!(value["language"], "en");
    }

    #[tokio::test]
    async fn controller_update_is_stored_and_forces_reconnect() {
        let state = state();
        let _guard = state.start_sync();

        let info = state.update_controller("  :9097 ", Some("")).unwrap();
        assert_eq!(info.server, ":9097");
        assert_eq!(info.secret, None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(state.controller_info().unwrap(), Some(info));
        assert_eq!(state.restart_count(), 1);
    }

    #[tokio::test]
    async fn empty_controller_address_is_rejected() {
        let state = state();
        assert!(state.update_controller("   ", None).is_err());
        assert!(state.controller_info().unwrap().is_none());
        assert_eq!(state.restart_count(), 0);
    }

    #[tokio::test]
    async fn dropping_guard_releases_restart_listener() {
        let state = state();
        let guard = state.start_sync();
        assert_eq!(state.bus.listener_count(), 1);

        drop(guard);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.bus.listener_count(), 0);

        state.notify_core_restarted();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.restart_count(), 0);
    }
}
