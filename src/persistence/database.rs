//! SQLite config store holding the shell settings and controller info

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::{ClashInfo, VergeConfig};

const VERGE_CONFIG: &str = "verge_config";
const CLASH_INFO: &str = "clash_info";

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .context(format!("Failed to open database at {:?}", path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!("Database opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    fn load_document(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let raw: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;

        raw.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("Failed to deserialize {}", key))
        })
        .transpose()
    }

    fn save_document(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value.to_string(), chrono::Utc::now().to_rfc3339()],
        )?;
        debug!("Saved {}", key);
        Ok(())
    }

    // === Shell settings ===

    /// Load the settings document, if one was saved
    pub fn load_verge_config(&self) -> Result<Option<VergeConfig>> {
        match self.load_document(VERGE_CONFIG)? {
            Some(value) => {
                let config = VergeConfig::from_value(&value)
                    .context("Failed to deserialize verge config")?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Replace the settings document
    pub fn save_verge_config(&self, config: &VergeConfig) -> Result<()> {
        let value = config.to_value().context("Failed to serialize verge config")?;
        self.save_document(VERGE_CONFIG, &value)
    }

    /// Merge `patch` into the stored settings document
    pub fn patch_verge_config(&self, patch: &Value) -> Result<VergeConfig> {
        let current = self.load_verge_config()?.unwrap_or_default();
        let patched = current
            .patched(patch)
            .context("Patch produced an invalid verge config")?;
        self.save_verge_config(&patched)?;
        Ok(patched)
    }

    // === Controller info ===

    pub fn load_clash_info(&self) -> Result<Option<ClashInfo>> {
        self.load_document(CLASH_INFO)?
            .map(|value| serde_json::from_value(value).context("Failed to deserialize clash info"))
            .transpose()
    }

    pub fn save_clash_info(&self, info: &ClashInfo) -> Result<()> {
        let value = serde_json::to_value(info)?;
        self.save_document(CLASH_INFO, &value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::settings::PaletteMode;

    fn store() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn empty_store_has_no_documents() {
        let db = store();
        assert!(db.load_verge_config().unwrap().is_none());
        assert!(db.load_clash_info().unwrap().is_none());
    }

    #[test]
    fn patch_creates_and_updates_settings() {
        let db = store();
        db.patch_verge_config(&json!({ "theme_mode": "dark" })).unwrap();
        db.patch_verge_config(&json!({ "theme_blur": true })).unwrap();

        let config = db.load_verge_config().unwrap().unwrap();
        assert_eq!(config.palette_mode(), PaletteMode::Dark);
        assert!(config.blur_enabled());
    }

    #[test]
    fn clash_info_round_trips() {
        let db = store();
        let info = ClashInfo {
            server: "127.0.0.1:9097".to_string(),
            secret: Some("abc".to_string()),
        };
        db.save_clash_info(&info).unwrap();
        assert_eq!(db.load_clash_info().unwrap(), Some(info));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shell.db");
        {
            let db = Database::open(&path).unwrap();
            db.initialize().unwrap();
            db.patch_verge_config(&json!({ "language": "zh" })).unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        let config = db.load_verge_config().unwrap().unwrap();
        assert_eq!(config.language.as_deref(), Some("zh"));
    }
}
