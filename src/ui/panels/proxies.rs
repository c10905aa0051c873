//! Proxies panel - proxy groups reported by the controller

use egui::Ui;
use serde_json::Value;

use crate::core::cache::{CacheInvalidator, PROXIES_KEY};
use crate::core::theme::{PRIMARY_MAIN, TEXT_SECONDARY};
use crate::core::{AppState, PaletteMode};
use crate::ui::theme::{Icons, Theme};

/// One entry of the `/proxies` listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRow {
    pub name: String,
    pub kind: String,
    /// Selected member, for groups
    pub now: Option<String>,
    pub members: usize,
}

impl ProxyRow {
    pub fn is_group(&self) -> bool {
        self.now.is_some() || self.members > 0
    }
}

/// Flatten a `/proxies` response, groups first, then by name
pub fn proxy_rows(value: &Value) -> Vec<ProxyRow> {
    let Some(proxies) = value.get("proxies").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut rows: Vec<ProxyRow> = proxies
        .iter()
        .map(|(name, entry)| ProxyRow {
            name: name.clone(),
            kind: entry
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            now: entry.get("now").and_then(Value::as_str).map(str::to_string),
            members: entry
                .get("all")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
        })
        .collect();

    rows.sort_by(|a, b| b.is_group().cmp(&a.is_group()).then(a.name.cmp(&b.name)));
    rows
}

pub fn render(ui: &mut Ui, state: &AppState, mode: PaletteMode) {
    let slot = state.cache.snapshot(PROXIES_KEY);
    if slot.data.is_none() && !slot.validating && slot.error.is_none() {
        state.cache.prefetch(PROXIES_KEY);
    }

    ui.horizontal(|ui| {
        ui.heading("Proxy Groups");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui
                .add_enabled(!slot.validating, egui::Button::new(Icons::RESTART))
                .on_hover_text("Refresh")
                .clicked()
            {
                state.cache.invalidate(PROXIES_KEY);
            }
            if slot.validating {
                ui.spinner();
            }
        });
    });
    ui.add_space(8.0);

    if let Some(error) = &slot.error {
        ui.label(egui::RichText::new(format!("⚠ {}", error)).color(Theme::ERROR));
        ui.add_space(8.0);
    }

    let rows = slot.data.as_deref().map(proxy_rows).unwrap_or_default();
    if rows.is_empty() {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.label(egui::RichText::new("No proxies loaded").color(TEXT_SECONDARY));
        });
        return;
    }

    egui::ScrollArea::vertical().show(ui, |ui| {
        for row in &rows {
            egui::Frame::none()
                .fill(Theme::bg_secondary(mode))
                .rounding(egui::Rounding::same(8.0))
                .stroke(egui::Stroke::new(1.0, Theme::border(mode)))
                .inner_margin(egui::Margin::symmetric(16.0, 10.0))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(&row.name).strong());
                        ui.label(
                            egui::RichText::new(&row.kind)
                                .small()
                                .color(TEXT_SECONDARY),
                        );
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if let Some(now) = &row.now {
                                ui.label(
                                    egui::RichText::new(format!("{} · {} members", now, row.members))
                                        .color(PRIMARY_MAIN),
                                );
                            }
                        });
                    });
                });
            ui.add_space(4.0);
        }
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn groups_sort_before_plain_proxies() {
        let value = json!({
            "proxies": {
                "DIRECT": { "type": "Direct" },
                "Proxy": { "type": "Selector", "now": "HK-01", "all": ["HK-01", "JP-01"] },
                "HK-01": { "type": "Shadowsocks" },
                "Auto": { "type": "URLTest", "now": "JP-01", "all": ["HK-01", "JP-01"] }
            }
        });

        let rows = proxy_rows(&value);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Auto", "Proxy", "DIRECT", "HK-01"]);
        assert_eq!(rows[1].now.as_deref(), Some("HK-01"));
        assert_eq!(rows[1].members, 2);
        assert!(!rows[2].is_group());
    }

    #[test]
    fn malformed_listing_yields_no_rows() {
        assert!(proxy_rows(&json!({})).is_empty());
        assert!(proxy_rows(&json!({ "proxies": [] })).is_empty());
    }

    #[test]
    fn missing_type_is_reported_as_unknown() {
        let rows = proxy_rows(&json!({ "proxies": { "x": {} } }));
        assert_eq!(rows[0].kind, "Unknown");
    }
}
