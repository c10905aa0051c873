//! Verge Shell - desktop shell for a Clash-compatible proxy core
//!
//! Keeps the controller connection, the backend caches and the window theme
//! in step with the proxy core and the stored shell settings.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
#![allow(dead_code)] // Parts of the core API are only exercised by tests

mod core;
mod persistence;
mod platform;
mod ui;

use anyhow::Result;
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{AppState, ShellConfig};
use crate::persistence::Database;
use crate::ui::VergeShellApp;

/// Application name constant
pub const APP_NAME: &str = "Verge Shell";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    init_logging();

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Ensure only one shell is running
    let instance = SingleInstance::new("verge-shell")
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        eprintln!("{} is already running!", APP_NAME);
        return Ok(());
    }

    let mut config = ShellConfig::from_env();
    config.validate();

    let db = Database::open(&config.get_database_path())?;
    db.initialize()?;
    info!("Database initialized");

    // Background tasks (restart bridge, timers, fetches) live on this runtime
    let runtime = tokio::runtime::Runtime::new()?;
    let _enter = runtime.enter();

    let app_state = AppState::new(config, db)?;
    let sync = app_state.start_sync();
    info!("Application state initialized");

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_NAME)
            .with_inner_size([1000.0, 680.0])
            .with_min_inner_size([640.0, 480.0])
            .with_decorations(false)
            .with_transparent(true),
        ..Default::default()
    };

    info!("Starting GUI...");
    eframe::run_native(
        APP_NAME,
        native_options,
        Box::new(|cc| Ok(Box::new(VergeShellApp::new(cc, app_state, sync)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Initialize the logging system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("verge_shell=info,eframe=warn,egui=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
