//! Sqlite-backed persistence.

use std::path::Path;

use anyhow::Context as _;
use folio_core::StatePersistence;
use rusqlite::{Connection, OptionalExtension as _};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        tracing::info!(path = %path.as_ref().display(), "opened storage");
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
            )
            .context("migrate records table")?;
        Ok(())
    }

    pub fn load_record(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("load record {key}"))?;
        Ok(value)
    }

    pub fn save_record(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
            INSERT INTO records (key, value, updated_at) VALUES (?, ?, unixepoch())
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
                (key, value),
            )
            .with_context(|| format!("save record {key}"))?;
        Ok(())
    }

    pub fn delete_record(&self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM records WHERE key = ?", [key])
            .with_context(|| format!("delete record {key}"))?;
        Ok(())
    }
}

impl StatePersistence for Storage {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.load_record(key)
    }

    fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.save_record(key, value)
    }
}
