//! Shell configuration loaded from the environment

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default address of the proxy core's external controller
pub const DEFAULT_CONTROLLER: &str = "127.0.0.1:9090";

const ENV_DATA_DIR: &str = "VERGE_SHELL_DATA_DIR";
const ENV_CONTROLLER: &str = "VERGE_SHELL_CONTROLLER";
const ENV_SECRET: &str = "VERGE_SHELL_SECRET";
const ENV_PROBE_TIMEOUT: &str = "VERGE_SHELL_PROBE_TIMEOUT_MS";
const ENV_REQUEST_TIMEOUT: &str = "VERGE_SHELL_REQUEST_TIMEOUT_MS";

/// Process-wide shell configuration
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Directory holding the config store
    pub data_directory: Option<PathBuf>,
    /// Controller address used when the store has no controller info
    pub default_controller: String,
    /// Secret used when the store has no controller info
    pub default_secret: Option<String>,
    /// Timeout for the discovery probe against the controller
    pub probe_timeout_ms: u64,
    /// Timeout for regular controller requests
    pub request_timeout_ms: u64,
    /// UI repaint interval
    pub repaint_interval_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            data_directory: None,
            default_controller: DEFAULT_CONTROLLER.to_string(),
            default_secret: None,
            probe_timeout_ms: 3000,
            request_timeout_ms: 5000,
            repaint_interval_ms: 250,
        }
    }
}

impl ShellConfig {
    /// Build the configuration from `VERGE_SHELL_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            config.data_directory = Some(PathBuf::from(dir));
        }
        if let Some(controller) = lookup(ENV_CONTROLLER).filter(|v| !v.trim().is_empty()) {
            config.default_controller = controller.trim().to_string();
        }
        config.default_secret = lookup(ENV_SECRET).filter(|v| !v.is_empty());

        if let Some(raw) = lookup(ENV_PROBE_TIMEOUT) {
            match raw.trim().parse() {
                Ok(ms) => config.probe_timeout_ms = ms,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_PROBE_TIMEOUT, raw, e),
            }
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            match raw.trim().parse() {
                Ok(ms) => config.request_timeout_ms = ms,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_REQUEST_TIMEOUT, raw, e),
            }
        }

        config.validate();
        config
    }

    /// Get the data directory, using default if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("VergeShell")
        })
    }

    /// Path of the SQLite config store
    pub fn get_database_path(&self) -> PathBuf {
        self.get_data_directory().join("verge-shell.db")
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn repaint_interval(&self) -> Duration {
        Duration::from_millis(self.repaint_interval_ms)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.probe_timeout_ms = self.probe_timeout_ms.clamp(100, 60_000);
        self.request_timeout_ms = self.request_timeout_ms.clamp(100, 120_000);
        self.repaint_interval_ms = self.repaint_interval_ms.clamp(16, 5_000);
        if self.default_controller.is_empty() {
            self.default_controller = DEFAULT_CONTROLLER.to_string();
        }
    }
}
