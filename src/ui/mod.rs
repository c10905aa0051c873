//! User interface module - egui-based window shell

mod app;
mod panels;
mod theme;

pub use app::VergeShellApp;
