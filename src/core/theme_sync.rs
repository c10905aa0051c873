//! Projects the settings snapshot onto the shared theme state

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::{QueryCache, SlotState, VERGE_CONFIG_KEY};
use super::error::{ShellError, ShellResult};
use super::settings::VergeConfig;
use super::theme_state::ThemeState;

/// Write the snapshot's theme fields into the shared cells
pub fn apply_settings(config: &VergeConfig, state: &ThemeState) {
    state.apply(config.palette_mode(), config.blur_enabled());
}

/// Decode the settings slot; `SettingsUnavailable` while nothing was fetched
pub fn settings_from_slot(slot: &SlotState) -> ShellResult<VergeConfig> {
    match slot.data.as_deref() {
        Some(value) => VergeConfig::from_value(value),
        None => Err(ShellError::SettingsUnavailable),
    }
}

/// Keeps [`ThemeState`] in step with the `getVergeConfig` cache slot
pub struct ThemeSynchronizer {
    cache: QueryCache,
    state: ThemeState,
}

impl ThemeSynchronizer {
    pub fn new(cache: QueryCache, state: ThemeState) -> Self {
        Self { cache, state }
    }

    /// Fetch the settings once and follow every later refetch
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.cache.subscribe(VERGE_CONFIG_KEY);
        self.cache.prefetch(VERGE_CONFIG_KEY);

        tokio::spawn(async move {
            let mut applied_revision = None;
            loop {
                {
                    let slot = rx.borrow_and_update();
                    if applied_revision != Some(slot.revision) {
                        match settings_from_slot(&slot) {
                            Ok(config) => {
                                apply_settings(&config, &self.state);
                                applied_revision = Some(slot.revision);
                            }
                            // Defaults stay in place until the first fetch lands
                            Err(ShellError::SettingsUnavailable) => {}
                            Err(e) => {
                                warn!("Ignoring settings snapshot: {}", e);
                                applied_revision = Some(slot.revision);
                            }
                        }
                    }
                }
                if rx.changed().await.is_err() {
                    debug!("Settings slot closed, theme synchronizer stopping");
                    break;
                }
            }
        })
    }
}
