//! Main application UI - the window frame around the routed pages

use std::time::{Duration, Instant};

use egui::{CentralPanel, Context, SidePanel, TopBottomPanel};
use tracing::{debug, info};

use super::panels;
use super::theme::{Icons, Theme};
use crate::core::drag;
use crate::core::theme::{RootStyle, ThemeCache, ThemeDescriptor, PRIMARY_MAIN, TEXT_SECONDARY};
use crate::core::{AppState, PaletteMode, SyncGuard};
use crate::platform::{self, HostWindow, ViewportWindow};

/// Routed page in the main panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Proxies,
    Clash,
    Settings,
}

impl Route {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proxies => "Proxies",
            Self::Clash => "Clash",
            Self::Settings => "Settings",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Proxies => Icons::PROXIES,
            Self::Clash => Icons::CLASH,
            Self::Settings => Icons::SETTINGS,
        }
    }

    pub fn all() -> &'static [Route] {
        &[Route::Proxies, Route::Clash, Route::Settings]
    }
}

/// Notification message
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub created_at: Instant,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            message: message.into(),
            level,
            created_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Main application struct
pub struct VergeShellApp {
    state: AppState,
    /// Keeps the restart listener and theme synchronizer alive
    _sync: SyncGuard,
    route: Route,
    theme_cache: ThemeCache,
    root_style: RootStyle,
    theme: ThemeDescriptor,
    applied_blur: Option<bool>,
    notifications: Vec<Notification>,
    controller_form: panels::settings::ControllerForm,
    repaint_interval: Duration,
}

impl VergeShellApp {
    pub fn new(cc: &eframe::CreationContext<'_>, state: AppState, sync: SyncGuard) -> Self {
        let mut theme_cache = ThemeCache::default();
        let mut root_style = RootStyle::default();
        let (theme, _) = theme_cache.get(state.theme.palette_mode(), &mut root_style);
        let blur = state.theme.theme_blur();
        Theme::apply(&cc.egui_ctx, &theme, &root_style, blur);
        let repaint_interval = state.config.repaint_interval();

        Self {
            state,
            _sync: sync,
            route: Route::default(),
            theme_cache,
            root_style,
            theme,
            applied_blur: Some(blur),
            notifications: Vec::new(),
            controller_form: Default::default(),
            repaint_interval,
        }
    }

    /// Rebuild the theme on a palette mode change; re-style on a blur change
    fn sync_theme(&mut self, ctx: &Context) {
        let mode = self.state.theme.palette_mode();
        let blur = self.state.theme.theme_blur();
        let (theme, rebuilt) = self.theme_cache.get(mode, &mut self.root_style);

        if rebuilt || self.applied_blur != Some(blur) {
            debug!("Applying theme: mode={}, blur={}", mode.as_str(), blur);
            self.theme = theme;
            self.applied_blur = Some(blur);
            Theme::apply(ctx, &theme, &self.root_style, blur);
        }
    }

    fn mode(&self) -> PaletteMode {
        self.theme.palette.mode
    }

    fn handle_keys(&mut self, ctx: &Context) {
        let pressed: Vec<egui::Key> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key, pressed: true, ..
                    } => Some(*key),
                    _ => None,
                })
                .collect()
        });

        let window = ViewportWindow::new(ctx);
        for key in pressed {
            platform::handle_key(key, &window);
        }
    }

    fn cleanup_notifications(&mut self) {
        let timeout = Duration::from_secs(5);
        self.notifications
            .retain(|n| n.created_at.elapsed() < timeout);
    }

    /// Treats `ui`'s area as a drag region once its children are laid out.
    ///
    /// A primary press inside it moves the window unless it landed on one of
    /// `controls` or on a layer above the panel.
    fn drag_region(ui: &egui::Ui, controls: &[egui::Rect]) {
        let Some(pos) = ui.input(|i| {
            i.pointer
                .primary_pressed()
                .then(|| i.pointer.interact_pos())
                .flatten()
        }) else {
            return;
        };
        if !ui.max_rect().contains(pos) || ui.ctx().layer_id_at(pos) != Some(ui.layer_id()) {
            return;
        }

        let path = drag::path_at(pos, controls);
        if drag::on_pointer_down(&path, &ViewportWindow::new(ui.ctx())) {
            debug!("Window drag started at {:?}", pos);
        }
    }

    /// Render the sidebar: logo, route menu, traffic area
    fn render_sidebar(&mut self, ctx: &Context) {
        let mode = self.mode();
        SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(200.0)
            .frame(
                egui::Frame::none()
                    .fill(self.theme.frame_fill(self.applied_blur.unwrap_or(false)))
                    .stroke(egui::Stroke::new(1.0, Theme::border(mode))),
            )
            .show(ctx, |ui| {
                let mut controls = Vec::new();
                ui.add_space(20.0);

                // Logo
                ui.horizontal(|ui| {
                    ui.add_space(16.0);
                    ui.label(egui::RichText::new(Icons::LOGO).size(24.0).color(PRIMARY_MAIN));
                    ui.add_space(8.0);
                    ui.label(egui::RichText::new(crate::APP_NAME).size(18.0).strong());
                });

                ui.add_space(24.0);

                for route in Route::all() {
                    let selected = self.route == *route;
                    let bg_color = if selected {
                        PRIMARY_MAIN.linear_multiply(0.15)
                    } else {
                        egui::Color32::TRANSPARENT
                    };
                    let text_color = if selected {
                        PRIMARY_MAIN
                    } else {
                        TEXT_SECONDARY
                    };

                    let frame = egui::Frame::none()
                        .fill(bg_color)
                        .rounding(egui::Rounding::same(8.0))
                        .inner_margin(egui::Margin::symmetric(16.0, 10.0));

                    let response = frame.show(ui, |ui| {
                        ui.set_width(ui.available_width() - 16.0);
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new(route.icon()).size(16.0).color(text_color));
                            ui.add_space(12.0);
                            ui.label(egui::RichText::new(route.label()).size(14.0).color(text_color));
                        });
                    });

                    // Menu items keep the click; they never start a window move
                    let item = response.response.interact(egui::Sense::click());
                    controls.push(item.rect);
                    if item.clicked() {
                        self.route = *route;
                    }
                    if item.hovered() && !selected {
                        ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
                    }

                    ui.add_space(2.0);
                }

                // Traffic area at the bottom
                ui.with_layout(egui::Layout::bottom_up(egui::Align::LEFT), |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.add_space(16.0);
                        ui.label(
                            egui::RichText::new(format!("v{}", crate::APP_VERSION))
                                .small()
                                .color(TEXT_SECONDARY),
                        );
                    });
                    ui.horizontal(|ui| {
                        ui.add_space(16.0);
                        let state = self.state.connection.state();
                        ui.label(
                            egui::RichText::new(format!("{} {}", Icons::TRAFFIC, state.label()))
                                .small()
                                .color(TEXT_SECONDARY),
                        );
                    });
                });

                Self::drag_region(ui, &controls);
            });
    }

    /// Render the top bar with the page title and window controls
    fn render_top_bar(&mut self, ctx: &Context) {
        let mode = self.mode();
        TopBottomPanel::top("top_bar")
            .frame(
                egui::Frame::none()
                    .fill(self.theme.frame_fill(self.applied_blur.unwrap_or(false)))
                    .stroke(egui::Stroke::new(1.0, Theme::border(mode)))
                    .inner_margin(egui::Margin::symmetric(20.0, 10.0)),
            )
            .show(ctx, |ui| {
                let mut controls = Vec::new();
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(self.route.label()).size(22.0).strong());

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let window = ViewportWindow::new(ctx);
                        let close = ui.button(Icons::CLOSE).on_hover_text("Hide");
                        if close.clicked() {
                            window.hide();
                        }
                        let maximize = ui.button(Icons::MAXIMIZE);
                        if maximize.clicked() {
                            window.toggle_maximize();
                        }
                        let minimize = ui.button(Icons::MINIMIZE);
                        if minimize.clicked() {
                            window.minimize();
                        }
                        controls.extend([close.rect, maximize.rect, minimize.rect]);
                    });
                });

                Self::drag_region(ui, &controls);
            });
    }

    fn render_main_content(&mut self, ctx: &Context) {
        let mode = self.mode();
        let fill = self.theme.frame_fill(self.applied_blur.unwrap_or(false));
        CentralPanel::default()
            .frame(
                egui::Frame::none()
                    .fill(fill)
                    .inner_margin(egui::Margin::same(20.0)),
            )
            .show(ctx, |ui| match self.route {
                Route::Proxies => panels::proxies::render(ui, &self.state, mode),
                Route::Clash => panels::clash::render(ui, &self.state, mode),
                Route::Settings => panels::settings::render(
                    ui,
                    &self.state,
                    mode,
                    &mut self.controller_form,
                    &mut self.notifications,
                ),
            });
    }

    fn render_notifications(&mut self, ctx: &Context) {
        if self.notifications.is_empty() {
            return;
        }

        egui::Area::new(egui::Id::new("notifications"))
            .fixed_pos(egui::pos2(ctx.screen_rect().width() - 340.0, 70.0))
            .show(ctx, |ui| {
                for notification in &self.notifications {
                    let accent = match notification.level {
                        NotificationLevel::Info => PRIMARY_MAIN,
                        NotificationLevel::Error => Theme::ERROR,
                    };

                    egui::Frame::none()
                        .fill(self.theme.palette.paper)
                        .rounding(egui::Rounding::same(10.0))
                        .stroke(egui::Stroke::new(1.0, accent.linear_multiply(0.5)))
                        .inner_margin(egui::Margin::same(14.0))
                        .show(ui, |ui| {
                            ui.set_width(300.0);
                            ui.label(
                                egui::RichText::new(&notification.message)
                                    .size(13.0)
                                    .color(self.theme.palette.text.primary),
                            );
                        });
                    ui.add_space(8.0);
                }
            });
    }
}

impl eframe::App for VergeShellApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.sync_theme(ctx);
        self.handle_keys(ctx);
        self.cleanup_notifications();

        // Background tasks publish through watch cells; poll them
        ctx.request_repaint_after(self.repaint_interval);

        self.render_sidebar(ctx);
        self.render_top_bar(ctx);
        self.render_main_content(ctx);
        self.render_notifications(ctx);
    }

    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        Theme::clear_color(&self.root_style)
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Application exiting");
    }
}
