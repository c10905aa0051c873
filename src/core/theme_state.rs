//! Shared theme state - the palette mode and blur cells read by the UI

use tokio::sync::watch;
use tracing::debug;

use super::settings::PaletteMode;

/// Two independent reactive cells.
///
/// Any component may read or watch them; the settings synchronizer is the
/// only writer.
#[derive(Clone)]
pub struct ThemeState {
    palette_mode: watch::Sender<PaletteMode>,
    theme_blur: watch::Sender<bool>,
}

impl Default for ThemeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ThemeState {
    /// Cells start at light mode without blur
    pub fn new() -> Self {
        let (palette_mode, _) = watch::channel(PaletteMode::Light);
        let (theme_blur, _) = watch::channel(false);
        Self {
            palette_mode,
            theme_blur,
        }
    }

    pub fn palette_mode(&self) -> PaletteMode {
        *self.palette_mode.borrow()
    }

    pub fn theme_blur(&self) -> bool {
        *self.theme_blur.borrow()
    }

    pub fn watch_palette_mode(&self) -> watch::Receiver<PaletteMode> {
        self.palette_mode.subscribe()
    }

    pub fn watch_theme_blur(&self) -> watch::Receiver<bool> {
        self.theme_blur.subscribe()
    }

    /// Write both cells; watchers are only notified for cells that changed
    pub fn apply(&self, mode: PaletteMode, blur: bool) {
        let mode_changed = self.palette_mode.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            *current = mode;
            true
        });
        let blur_changed = self.theme_blur.send_if_modified(|current| {
            if *current == blur {
                return false;
            }
            *current = blur;
            true
        });

        if mode_changed || blur_changed {
            debug!("Theme state updated: mode={:?} blur={}", mode, blur);
        }
    }
}
