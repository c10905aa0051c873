//! Core module - backend synchronization, caches and theme state

mod app_state;
pub mod cache;
pub mod config;
pub mod connection;
pub mod drag;
mod error;
pub mod events;
pub mod reconcile;
pub mod restart;
pub mod settings;
pub mod theme;
mod theme_state;
pub mod theme_sync;

pub use app_state::{AppState, SyncGuard};
pub use config::ShellConfig;
pub use connection::{ClashInfo, ConnectionState};
pub use error::{ShellError, ShellResult};
pub use settings::{PaletteMode, VergeConfig};
pub use theme_state::ThemeState;
