//! Theme derivation from the palette mode

use std::collections::BTreeMap;

use egui::Color32;

use super::settings::PaletteMode;

/// Root style property consumed by text selection
pub const SELECTION_COLOR_PROPERTY: &str = "--selection-color";

/// Accent color shared by both palettes (#5b5c9d)
pub const PRIMARY_MAIN: Color32 = Color32::from_rgb(0x5b, 0x5c, 0x9d);
/// #637381
pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(0x63, 0x73, 0x81);
/// #909399
pub const TEXT_SECONDARY: Color32 = Color32::from_rgb(0x90, 0x93, 0x99);

/// #f5f5f5
pub const SELECTION_LIGHT: Color32 = Color32::from_rgb(0xf5, 0xf5, 0xf5);
/// #d5d5d5
pub const SELECTION_DARK: Color32 = Color32::from_rgb(0xd5, 0xd5, 0xd5);

const PAPER_LIGHT: Color32 = Color32::WHITE;
const PAPER_DARK: Color32 = Color32::from_rgb(0x12, 0x12, 0x12);

/// Background alpha with blur enabled
pub const BLUR_ALPHA: f32 = 0.85;

/// Layout breakpoints in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoints {
    pub xs: u32,
    pub sm: u32,
    pub md: u32,
    pub lg: u32,
    pub xl: u32,
}

impl Breakpoints {
    pub const DEFAULT: Breakpoints = Breakpoints {
        xs: 0,
        sm: 650,
        md: 900,
        lg: 1200,
        xl: 1536,
    };

    /// Name of the largest breakpoint not wider than `width`
    pub fn classify(&self, width: f32) -> &'static str {
        let width = width.max(0.0) as u32;
        if width >= self.xl {
            "xl"
        } else if width >= self.lg {
            "lg"
        } else if width >= self.md {
            "md"
        } else if width >= self.sm {
            "sm"
        } else {
            "xs"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextColors {
    pub primary: Color32,
    pub secondary: Color32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub mode: PaletteMode,
    pub primary: Color32,
    pub text: TextColors,
    pub paper: Color32,
}

/// Theme description derived from a palette mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeDescriptor {
    pub breakpoints: Breakpoints,
    pub palette: Palette,
}

impl ThemeDescriptor {
    /// Pure derivation, no side effects
    pub fn for_mode(mode: PaletteMode) -> Self {
        Self {
            breakpoints: Breakpoints::DEFAULT,
            palette: Palette {
                mode,
                primary: PRIMARY_MAIN,
                text: TextColors {
                    primary: TEXT_PRIMARY,
                    secondary: TEXT_SECONDARY,
                },
                paper: match mode {
                    PaletteMode::Light => PAPER_LIGHT,
                    PaletteMode::Dark => PAPER_DARK,
                },
            },
        }
    }

    /// Paper background with the blur alpha applied
    pub fn frame_fill(&self, blur: bool) -> Color32 {
        with_alpha(self.palette.paper, background_alpha(blur))
    }
}

/// Background alpha for the root container
pub fn background_alpha(blur: bool) -> f32 {
    if blur {
        BLUR_ALPHA
    } else {
        1.0
    }
}

/// Replace the alpha channel of `color`
pub fn with_alpha(color: Color32, alpha: f32) -> Color32 {
    let [r, g, b, _] = color.to_array();
    Color32::from_rgba_unmultiplied(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Style surface outside the themed widget tree
pub trait StyleRoot {
    fn set_background(&mut self, color: Color32);
    fn set_property(&mut self, name: &str, value: Color32);
}

/// Root style written by [`build_theme`] and read by the window shell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootStyle {
    pub background: Option<Color32>,
    pub properties: BTreeMap<String, Color32>,
}

impl RootStyle {
    pub fn property(&self, name: &str) -> Option<Color32> {
        self.properties.get(name).copied()
    }

    pub fn selection_color(&self) -> Option<Color32> {
        self.property(SELECTION_COLOR_PROPERTY)
    }
}

impl StyleRoot for RootStyle {
    fn set_background(&mut self, color: Color32) {
        self.background = Some(color);
    }

    fn set_property(&mut self, name: &str, value: Color32) {
        self.properties.insert(name.to_string(), value);
    }
}

/// Build the theme for `mode` and write the root style side channel:
/// a transparent background and the mode's selection color.
pub fn build_theme(mode: PaletteMode, root: &mut dyn StyleRoot) -> ThemeDescriptor {
    let selection = match mode {
        PaletteMode::Light => SELECTION_LIGHT,
        PaletteMode::Dark => SELECTION_DARK,
    };
    root.set_background(Color32::TRANSPARENT);
    root.set_property(SELECTION_COLOR_PROPERTY, selection);

    ThemeDescriptor::for_mode(mode)
}

/// Rebuilds the theme only when the palette mode changes
#[derive(Debug, Default)]
pub struct ThemeCache {
    current: Option<ThemeDescriptor>,
}

impl ThemeCache {
    /// Returns the theme for `mode` and whether it was rebuilt
    pub fn get(&mut self, mode: PaletteMode, root: &mut dyn StyleRoot) -> (ThemeDescriptor, bool) {
        match self.current {
            Some(theme) if theme.palette.mode == mode => (theme, false),
            _ => {
                let theme = build_theme(mode, root);
                self.current = Some(theme);
                (theme, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_carries_requested_mode_and_fixed_constants() {
        for &mode in PaletteMode::all() {
            let mut root = RootStyle::default();
            let theme = build_theme(mode, &mut root);

            assert_eq!(theme.palette.mode, mode);
            assert_eq!(theme.palette.primary, Color32::from_rgb(91, 92, 157));
            assert_eq!(theme.palette.text.primary, Color32::from_rgb(99, 115, 129));
            assert_eq!(theme.palette.text.secondary, Color32::from_rgb(144, 147, 153));
            assert_eq!(theme.breakpoints, Breakpoints::DEFAULT);
            assert_eq!(root.background, Some(Color32::TRANSPARENT));
        }
    }

    #[test]
    fn selection_color_follows_mode() {
        let mut root = RootStyle::default();
        build_theme(PaletteMode::Light, &mut root);
        assert_eq!(root.selection_color(), Some(SELECTION_LIGHT));

        build_theme(PaletteMode::Dark, &mut root);
        assert_eq!(root.selection_color(), Some(SELECTION_DARK));
        assert_ne!(root.selection_color(), Some(SELECTION_LIGHT));
    }

    #[test]
    fn background_alpha_depends_only_on_blur() {
        assert_eq!(background_alpha(true), 0.85);
        assert_eq!(background_alpha(false), 1.0);

        let theme = ThemeDescriptor::for_mode(PaletteMode::Light);
        assert_eq!(theme.frame_fill(false).a(), 255);
        assert_eq!(theme.frame_fill(true).a(), 217);
    }

    #[test]
    fn theme_cache_rebuilds_only_on_mode_change() {
        let mut cache = ThemeCache::default();
        let mut root = RootStyle::default();

        let (_, rebuilt) = cache.get(PaletteMode::Light, &mut root);
        assert!(rebuilt);
        let (_, rebuilt) = cache.get(PaletteMode::Light, &mut root);
        assert!(!rebuilt);
        let (theme, rebuilt) = cache.get(PaletteMode::Dark, &mut root);
        assert!(rebuilt);
        assert_eq!(theme.palette.mode, PaletteMode::Dark);
    }

    #[test]
    fn breakpoint_classification() {
        let bp = Breakpoints::DEFAULT;
        assert_eq!(bp.classify(0.0), "xs");
        assert_eq!(bp.classify(649.0), "xs");
        assert_eq!(bp.classify(650.0), "sm");
        assert_eq!(bp.classify(1280.0), "lg");
        assert_eq!(bp.classify(2000.0), "xl");
    }
}
