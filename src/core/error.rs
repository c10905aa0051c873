//! Error types for the synchronization core

use thiserror::Error;

/// Errors raised by the backend synchronization layer.
///
/// None of these are fatal to the shell: the proxy core is a separate
/// process that may restart at any time.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Controller discovery or connection rebuild failed
    #[error("backend unreachable: {reason}")]
    BackendUnreachable { reason: String },

    /// A named cache slot failed to refetch
    #[error("cache fetch for '{key}' failed: {reason}")]
    CacheFetchFailed { key: String, reason: String },

    /// The settings snapshot has not been fetched yet
    #[error("settings are not available yet")]
    SettingsUnavailable,

    /// The settings document could not be decoded
    #[error("invalid settings document: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// No fetcher is registered for the requested cache key
    #[error("no fetcher registered for cache key '{0}'")]
    UnknownCacheKey(String),
}

impl ShellError {
    pub fn unreachable(reason: impl std::fmt::Display) -> Self {
        Self::BackendUnreachable {
            reason: reason.to_string(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::BackendUnreachable { .. })
    }
}

pub type ShellResult<T> = std::result::Result<T, ShellError>;
