//! Host window control - the native viewport behind the shell frame

use tracing::debug;

/// Window operations the shell asks of its host
pub trait HostWindow {
    /// Hide the window, keeping the process alive
    fn hide(&self);
    /// Begin an interactive move following the pointer
    fn start_drag(&self);
    fn minimize(&self);
    fn toggle_maximize(&self);
}

/// [`HostWindow`] backed by the eframe root viewport
pub struct ViewportWindow<'a> {
    ctx: &'a egui::Context,
}

impl<'a> ViewportWindow<'a> {
    pub fn new(ctx: &'a egui::Context) -> Self {
        Self { ctx }
    }
}

impl HostWindow for ViewportWindow<'_> {
    fn hide(&self) {
        debug!("Hiding main window");
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::Visible(false));
    }

    fn start_drag(&self) {
        self.ctx.send_viewport_cmd(egui::ViewportCommand::StartDrag);
    }

    fn minimize(&self) {
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::Minimized(true));
    }

    fn toggle_maximize(&self) {
        let maximized = self.ctx.input(|i| i.viewport().maximized.unwrap_or(false));
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::Maximized(!maximized));
    }
}

/// Global key handling: Escape hides the window. Returns true if handled.
pub fn handle_key(key: egui::Key, window: &dyn HostWindow) -> bool {
    match key {
        egui::Key::Escape => {
            window.hide();
            true
        }
        _ => false,
    }
}
