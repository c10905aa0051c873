//! Shell settings document as stored in the config store

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::error::ShellResult;

/// Light or dark palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaletteMode {
    #[default]
    Light,
    Dark,
}

impl PaletteMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Dark => "Dark",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn all() -> &'static [PaletteMode] {
        &[PaletteMode::Light, PaletteMode::Dark]
    }

    /// Resolve a stored `theme_mode` value; absent or unknown means light
    pub fn from_setting(value: Option<&str>) -> Self {
        match value {
            None => Self::Light,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "light" => Self::Light,
                "dark" => Self::Dark,
                other => {
                    warn!("Unknown theme_mode {:?}, falling back to light", other);
                    Self::Light
                }
            },
        }
    }
}

/// Settings snapshot fetched under `getVergeConfig`.
///
/// Replaced wholesale on every refetch. Fields the shell does not interpret
/// are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VergeConfig {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "truthy",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_blur: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub language: Option<String>,
    #[serde(
        default,
        deserialize_with = "truthy",
        skip_serializing_if = "Option::is_none"
    )]
    pub traffic_graph: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Loose boolean reading of a stored flag: `null`, `false`, `0` and `""` are
/// false, any other value is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| is_truthy(&v)))
}

/// A non-string value is dropped rather than failing the whole document
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Ok(Some(s)),
        None | Some(Value::Null) => Ok(None),
        Some(other) => {
            warn!("Ignoring non-string settings value {}", other);
            Ok(None)
        }
    }
}

impl VergeConfig {
    pub fn from_value(value: &Value) -> ShellResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> ShellResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Palette mode this snapshot asks for; never outside light/dark
    pub fn palette_mode(&self) -> PaletteMode {
        PaletteMode::from_setting(self.theme_mode.as_deref())
    }

    /// Whether the background should be translucent
    pub fn blur_enabled(&self) -> bool {
        self.theme_blur.unwrap_or(false)
    }

    /// Apply a partial document on top of this one.
    ///
    /// Keys in `patch` replace existing keys; `null` clears them.
    pub fn patched(&self, patch: &Value) -> ShellResult<Self> {
        let mut merged = match self.to_value()? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Value::Object(patch) = patch {
            for (key, value) in patch {
                if value.is_null() {
                    merged.remove(key);
                } else {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Self::from_value(&Value::Object(merged))
    }
}
