//! Clash panel - controller connection and core configuration

use egui::Ui;
use serde_json::Value;

use crate::core::cache::{CacheInvalidator, CLASH_CONFIG_KEY};
use crate::core::theme::TEXT_SECONDARY;
use crate::core::{AppState, ConnectionState, PaletteMode};
use crate::ui::theme::{Icons, Theme};

const CONFIG_FIELDS: &[(&str, &str)] = &[
    ("mode", "Mode"),
    ("mixed-port", "Mixed port"),
    ("port", "HTTP port"),
    ("socks-port", "SOCKS port"),
    ("allow-lan", "Allow LAN"),
    ("log-level", "Log level"),
    ("ipv6", "IPv6"),
];

/// Labelled values of the known `/configs` fields that are present
pub fn config_rows(value: &Value) -> Vec<(&'static str, String)> {
    CONFIG_FIELDS
        .iter()
        .filter_map(|(key, label)| {
            let field = value.get(*key)?;
            let text = match field {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((*label, text))
        })
        .collect()
}

pub fn render(ui: &mut Ui, state: &AppState, mode: PaletteMode) {
    let slot = state.cache.snapshot(CLASH_CONFIG_KEY);
    if slot.data.is_none() && !slot.validating && slot.error.is_none() {
        state.cache.prefetch(CLASH_CONFIG_KEY);
    }

    ui.heading("Controller");
    ui.add_space(8.0);

    egui::Frame::none()
        .fill(Theme::bg_secondary(mode))
        .rounding(egui::Rounding::same(12.0))
        .stroke(egui::Stroke::new(1.0, Theme::border(mode)))
        .inner_margin(egui::Margin::same(16.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            let connection_state = state.connection.state();
            let color = match connection_state {
                ConnectionState::Connected => Theme::SUCCESS,
                ConnectionState::Reconnecting => Theme::WARNING,
                ConnectionState::Unconnected => Theme::ERROR,
            };
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("●").color(color));
                ui.label(connection_state.label());
                if let Some(handle) = state.connection.current() {
                    ui.label(
                        egui::RichText::new(handle.base_url())
                            .monospace()
                            .color(TEXT_SECONDARY),
                    );
                }
            });
            ui.label(
                egui::RichText::new(format!("Core restarts seen: {}", state.restart_count()))
                    .small()
                    .color(TEXT_SECONDARY),
            );
        });

    ui.add_space(16.0);
    ui.horizontal(|ui| {
        ui.heading("Core Configuration");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui
                .add_enabled(!slot.validating, egui::Button::new(Icons::RESTART))
                .on_hover_text("Refresh")
                .clicked()
            {
                state.cache.invalidate(CLASH_CONFIG_KEY);
            }
            if slot.validating {
                ui.spinner();
            }
        });
    });
    ui.add_space(8.0);

    if let Some(error) = &slot.error {
        ui.label(egui::RichText::new(format!("⚠ {}", error)).color(Theme::ERROR));
    }

    if let Some(value) = slot.data.as_deref() {
        egui::Grid::new("clash_config")
            .num_columns(2)
            .spacing([24.0, 8.0])
            .striped(true)
            .show(ui, |ui| {
                for (label, text) in config_rows(value) {
                    ui.label(egui::RichText::new(label).color(TEXT_SECONDARY));
                    ui.label(text);
                    ui.end_row();
                }
            });
    }
}
