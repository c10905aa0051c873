//! Theme and styling for the UI

use egui::{Color32, FontFamily, FontId, Rounding, Stroke, TextStyle, Visuals};

use crate::core::theme::{RootStyle, ThemeDescriptor};
use crate::core::PaletteMode;

/// Surface colors layered on top of the derived palette
pub struct Theme;

impl Theme {
    // Dark surfaces
    pub const DARK_BG_SECONDARY: Color32 = Color32::from_rgb(30, 30, 34);
    pub const DARK_BG_TERTIARY: Color32 = Color32::from_rgb(44, 44, 50);
    pub const DARK_BG_HOVER: Color32 = Color32::from_rgb(56, 56, 64);
    pub const DARK_BORDER: Color32 = Color32::from_rgb(58, 58, 66);

    // Light surfaces
    pub const LIGHT_BG_SECONDARY: Color32 = Color32::from_rgb(244, 245, 247);
    pub const LIGHT_BG_TERTIARY: Color32 = Color32::from_rgb(232, 234, 238);
    pub const LIGHT_BG_HOVER: Color32 = Color32::from_rgb(214, 217, 224);
    pub const LIGHT_BORDER: Color32 = Color32::from_rgb(220, 223, 230);

    pub const SUCCESS: Color32 = Color32::from_rgb(16, 185, 129);
    pub const WARNING: Color32 = Color32::from_rgb(245, 158, 11);
    pub const ERROR: Color32 = Color32::from_rgb(244, 63, 94);

    /// Sidebar and card background for `mode`
    pub fn bg_secondary(mode: PaletteMode) -> Color32 {
        match mode {
            PaletteMode::Light => Self::LIGHT_BG_SECONDARY,
            PaletteMode::Dark => Self::DARK_BG_SECONDARY,
        }
    }

    pub fn border(mode: PaletteMode) -> Color32 {
        match mode {
            PaletteMode::Light => Self::LIGHT_BORDER,
            PaletteMode::Dark => Self::DARK_BORDER,
        }
    }

    /// Apply a derived theme to egui.
    ///
    /// The window clear color comes from `root`; the panels are painted with
    /// the paper color at the blur alpha so the native backdrop shows through.
    pub fn apply(ctx: &egui::Context, theme: &ThemeDescriptor, root: &RootStyle, blur: bool) {
        let mut style = (*ctx.style()).clone();
        let palette = &theme.palette;
        let fill = theme.frame_fill(blur);

        let (mut visuals, bg_tertiary, bg_hover, border) = match palette.mode {
            PaletteMode::Dark => (
                Visuals::dark(),
                Self::DARK_BG_TERTIARY,
                Self::DARK_BG_HOVER,
                Self::DARK_BORDER,
            ),
            PaletteMode::Light => (
                Visuals::light(),
                Self::LIGHT_BG_TERTIARY,
                Self::LIGHT_BG_HOVER,
                Self::LIGHT_BORDER,
            ),
        };

        visuals.panel_fill = fill;
        visuals.window_fill = palette.paper;
        visuals.extreme_bg_color = palette.paper;
        visuals.faint_bg_color = Self::bg_secondary(palette.mode);

        // Labels and other non-interactive widgets
        visuals.widgets.noninteractive.bg_fill = Self::bg_secondary(palette.mode);
        visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, palette.text.primary);
        visuals.widgets.noninteractive.bg_stroke = Stroke::new(0.5, border);
        visuals.widgets.noninteractive.rounding = Rounding::same(6.0);

        visuals.widgets.inactive.bg_fill = bg_tertiary;
        visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, palette.text.secondary);
        visuals.widgets.inactive.bg_stroke = Stroke::new(0.5, border);
        visuals.widgets.inactive.rounding = Rounding::same(6.0);

        visuals.widgets.hovered.bg_fill = bg_hover;
        visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, palette.text.primary);
        visuals.widgets.hovered.bg_stroke = Stroke::new(1.0, palette.primary.linear_multiply(0.6));
        visuals.widgets.hovered.rounding = Rounding::same(6.0);
        visuals.widgets.hovered.expansion = 1.0;

        visuals.widgets.active.bg_fill = palette.primary;
        visuals.widgets.active.fg_stroke = Stroke::new(1.0, Color32::WHITE);
        visuals.widgets.active.bg_stroke = Stroke::new(1.0, palette.primary);
        visuals.widgets.active.rounding = Rounding::same(6.0);

        visuals.widgets.open.bg_fill = palette.paper;
        visuals.widgets.open.fg_stroke = Stroke::new(1.0, palette.text.primary);
        visuals.widgets.open.bg_stroke = Stroke::new(1.0, palette.primary.linear_multiply(0.5));
        visuals.widgets.open.rounding = Rounding::same(6.0);

        // Selected text follows the root selection color
        let selection = root.selection_color().unwrap_or(palette.primary);
        visuals.selection.bg_fill = selection;
        visuals.selection.stroke = Stroke::new(1.0, palette.primary);

        visuals.window_rounding = Rounding::same(10.0);
        visuals.window_stroke = Stroke::new(0.5, border);
        visuals.menu_rounding = Rounding::same(8.0);

        style.visuals = visuals;

        style.text_styles = [
            (
                TextStyle::Small,
                FontId::new(12.0, FontFamily::Proportional),
            ),
            (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
            (
                TextStyle::Button,
                FontId::new(14.0, FontFamily::Proportional),
            ),
            (
                TextStyle::Heading,
                FontId::new(20.0, FontFamily::Proportional),
            ),
            (
                TextStyle::Monospace,
                FontId::new(13.0, FontFamily::Monospace),
            ),
        ]
        .into();

        style.spacing.item_spacing = egui::vec2(8.0, 8.0);
        style.spacing.window_margin = egui::Margin::same(16.0);
        style.spacing.button_padding = egui::vec2(14.0, 8.0);
        style.spacing.indent = 20.0;
        style.spacing.combo_width = 120.0;

        style.interaction.tooltip_delay = 0.3;

        ctx.set_style(style);
    }

    /// Clear color of the native window, taken from the root background
    pub fn clear_color(root: &RootStyle) -> [f32; 4] {
        root.background
            .map(|c| egui::Rgba::from(c).to_array())
            .unwrap_or([0.0; 4])
    }
}

/// Icon characters (using Unicode symbols)
pub struct Icons;

impl Icons {
    pub const LOGO: &'static str = "◈";
    pub const PROXIES: &'static str = "🌐";
    pub const CLASH: &'static str = "⚡";
    pub const SETTINGS: &'static str = "⚙";
    pub const RESTART: &'static str = "↻";
    pub const MINIMIZE: &'static str = "—";
    pub const MAXIMIZE: &'static str = "☐";
    pub const CLOSE: &'static str = "✕";
    pub const TRAFFIC: &'static str = "⇅";
}
