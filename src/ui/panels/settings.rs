//! Settings panel

use egui::{Color32, Ui, Vec2};
use serde_json::json;
use tracing::{error, warn};

use crate::core::cache::VERGE_CONFIG_KEY;
use crate::core::theme::{PRIMARY_MAIN, TEXT_SECONDARY};
use crate::core::theme_sync::settings_from_slot;
use crate::core::{AppState, PaletteMode};
use crate::ui::app::{Notification, NotificationLevel};
use crate::ui::theme::{Icons, Theme};

/// Custom toggle switch widget
fn toggle_switch(ui: &mut Ui, on: &mut bool, mode: PaletteMode) -> egui::Response {
    let desired_size = Vec2::new(44.0, 24.0);
    let (rect, mut response) = ui.allocate_exact_size(desired_size, egui::Sense::click());

    if response.clicked() {
        *on = !*on;
        response.mark_changed();
    }

    if ui.is_rect_visible(rect) {
        let how_on = ui.ctx().animate_bool_responsive(response.id, *on);

        let track_color = if *on {
            PRIMARY_MAIN.linear_multiply(0.9 + 0.1 * how_on)
        } else {
            Theme::bg_secondary(mode)
        };
        ui.painter().rect(
            rect,
            egui::Rounding::same(12.0),
            track_color,
            egui::Stroke::new(1.0, if *on { PRIMARY_MAIN } else { Theme::border(mode) }),
        );

        let circle_x = egui::lerp((rect.left() + 12.0)..=(rect.right() - 12.0), how_on);
        ui.painter().circle(
            egui::pos2(circle_x, rect.center().y),
            9.0,
            Color32::WHITE,
            egui::Stroke::NONE,
        );
    }

    response
}

fn section_header(ui: &mut Ui, icon: &str, title: &str) {
    ui.add_space(8.0);
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(icon).size(20.0).color(PRIMARY_MAIN));
        ui.add_space(8.0);
        ui.label(egui::RichText::new(title).size(17.0).strong());
    });
    ui.add_space(12.0);
}

/// Setting row with label, description, and custom widget
fn setting_row(ui: &mut Ui, label: &str, description: &str, add_widget: impl FnOnce(&mut Ui)) {
    ui.horizontal(|ui| {
        ui.with_layout(egui::Layout::left_to_right(egui::Align::Center), |ui| {
            ui.vertical(|ui| {
                ui.add_space(2.0);
                ui.label(egui::RichText::new(label).size(14.0));
                ui.label(
                    egui::RichText::new(description)
                        .size(12.0)
                        .color(TEXT_SECONDARY),
                );
            });
        });
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            add_widget(ui);
        });
    });
    ui.add_space(14.0);
}

fn section_frame(ui: &mut Ui, mode: PaletteMode, add_contents: impl FnOnce(&mut Ui)) {
    egui::Frame::none()
        .fill(Theme::bg_secondary(mode))
        .rounding(egui::Rounding::same(12.0))
        .stroke(egui::Stroke::new(1.0, Theme::border(mode)))
        .inner_margin(egui::Margin::same(20.0))
        .outer_margin(egui::Margin::symmetric(0.0, 4.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            add_contents(ui);
        });
}

/// Edit buffer for the controller address, filled from the store once
#[derive(Debug, Default)]
pub struct ControllerForm {
    server: String,
    secret: String,
    loaded: bool,
}

impl ControllerForm {
    fn load(&mut self, state: &AppState) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        match state.controller_info() {
            Ok(Some(info)) => {
                self.server = info.server;
                self.secret = info.secret.unwrap_or_default();
            }
            Ok(None) => {
                self.server = state.config.default_controller.clone();
                self.secret = state.config.default_secret.clone().unwrap_or_default();
            }
            Err(e) => warn!("Failed to read controller info: {:#}", e),
        }
    }

    fn save(&self, state: &AppState, notifications: &mut Vec<Notification>) {
        match state.update_controller(&self.server, Some(&self.secret)) {
            Ok(info) => notifications.push(Notification::new(
                format!("Connecting to {}...", info.server),
                NotificationLevel::Info,
            )),
            Err(e) => {
                error!("Failed to save controller: {:#}", e);
                notifications.push(Notification::new(
                    format!("Failed to save controller: {}", e),
                    NotificationLevel::Error,
                ));
            }
        }
    }
}

fn apply_patch(state: &AppState, patch: serde_json::Value, notifications: &mut Vec<Notification>) {
    if let Err(e) = state.patch_verge_config(&patch) {
        error!("Failed to save settings: {:#}", e);
        notifications.push(Notification::new(
            format!("Failed to save settings: {}", e),
            NotificationLevel::Error,
        ));
    }
}

pub fn render(
    ui: &mut Ui,
    state: &AppState,
    mode: PaletteMode,
    form: &mut ControllerForm,
    notifications: &mut Vec<Notification>,
) {
    form.load(state);

    // The store document is only shown once it has been fetched
    let config = settings_from_slot(&state.cache.snapshot(VERGE_CONFIG_KEY)).unwrap_or_default();

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            ui.vertical_centered(|ui| {
                ui.set_max_width(680.0);

                ui.add_space(12.0);
                ui.label(egui::RichText::new("Settings").size(26.0).strong());
                ui.add_space(24.0);

                section_header(ui, "\u{1F3A8}", "Appearance");
                section_frame(ui, mode, |ui| {
                    let current = config.palette_mode();
                    setting_row(ui, "Theme", "Color scheme of the window", |ui| {
                        egui::ComboBox::from_id_salt("theme_mode_select")
                            .width(130.0)
                            .selected_text(current.label())
                            .show_ui(ui, |ui| {
                                for candidate in PaletteMode::all() {
                                    let selected = current == *candidate;
                                    if ui.selectable_label(selected, candidate.label()).clicked()
                                        && !selected
                                    {
                                        apply_patch(
                                            state,
                                            json!({ "theme_mode": candidate.as_str() }),
                                            notifications,
                                        );
                                    }
                                }
                            });
                    });

                    let mut blur = config.blur_enabled();
                    setting_row(
                        ui,
                        "Background blur",
                        "Let the desktop show through the window",
                        |ui| {
                            if toggle_switch(ui, &mut blur, mode).changed() {
                                apply_patch(state, json!({ "theme_blur": blur }), notifications);
                            }
                        },
                    );
                });

                ui.add_space(20.0);

                section_header(ui, Icons::CLASH, "Core");
                section_frame(ui, mode, |ui| {
                    setting_row(ui, "Controller", "External controller address", |ui| {
                        ui.add(
                            egui::TextEdit::singleline(&mut form.server)
                                .hint_text("127.0.0.1:9090")
                                .desired_width(180.0),
                        );
                    });

                    setting_row(ui, "Secret", "Controller API secret", |ui| {
                        ui.add(
                            egui::TextEdit::singleline(&mut form.secret)
                                .password(true)
                                .desired_width(180.0),
                        );
                    });

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Save and reconnect").clicked() {
                            form.save(state, notifications);
                        }
                    });
                    ui.add_space(14.0);

                    setting_row(
                        ui,
                        "Restart core connection",
                        "Reconnect to the controller and reload proxies",
                        |ui| {
                            if ui.button(format!("{} Restart", Icons::RESTART)).clicked() {
                                state.notify_core_restarted();
                                notifications.push(Notification::new(
                                    "Reconnecting to the core...",
                                    NotificationLevel::Info,
                                ));
                            }
                        },
                    );

                    setting_row(ui, "Data directory", "Where settings are stored", |ui| {
                        ui.label(
                            egui::RichText::new(
                                state.config.get_data_directory().display().to_string(),
                            )
                            .monospace()
                            .color(TEXT_SECONDARY),
                        );
                    });
                });

                ui.add_space(20.0);
                ui.label(
                    egui::RichText::new(format!("{} v{}", crate::APP_NAME, crate::APP_VERSION))
                        .size(13.0)
                        .color(TEXT_SECONDARY),
                );
                ui.add_space(24.0);
            });
        });
}
