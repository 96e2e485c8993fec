//! Persistent settings store.
//!
//! Backs the [`ConfigStore`] contract with a separate SQLite file so
//! middleware configuration (retry-policy knobs, port limits) is isolated
//! from whatever stores the backends keep.

use crate::contracts::ConfigStore;
use crate::error::{BrokerError, BrokerResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Persistent key/value settings backed by SQLite.
pub struct SettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsStore {
    /// Opens (or creates) a settings store at the given path.
    pub fn new(path: &str) -> BrokerResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| BrokerError::Storage(format!("failed to open settings store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory settings store (for testing).
    pub fn open_in_memory() -> BrokerResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            BrokerError::Storage(format!("failed to open in-memory settings store: {e}"))
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> BrokerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                domain TEXT NOT NULL,
                path TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE(domain, path)
            );
            ",
        )
        .map_err(|e| BrokerError::Storage(format!("failed to init settings schema: {e}")))?;
        Ok(())
    }

    /// All (path, value) pairs under a domain.
    pub fn entries(&self, domain: &str) -> BrokerResult<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT path, value FROM settings WHERE domain = ?1 ORDER BY path")
            .map_err(|e| BrokerError::Storage(format!("failed to prepare settings query: {e}")))?;

        let rows = stmt
            .query_map(params![domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| BrokerError::Storage(format!("failed to query settings: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            result
                .push(row.map_err(|e| BrokerError::Storage(format!("failed to read row: {e}")))?);
        }
        Ok(result)
    }

    /// Typed read of a u64 knob; unparseable values read as `None`.
    pub fn get_u64(&self, domain: &str, path: &str) -> BrokerResult<Option<u64>> {
        Ok(self.get(domain, path)?.and_then(|v| v.parse().ok()))
    }
}

impl ConfigStore for SettingsStore {
    fn get(&self, domain: &str, path: &str) -> BrokerResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE domain = ?1 AND path = ?2",
            params![domain, path],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| BrokerError::Storage(format!("failed to read setting: {e}")))
    }

    fn set(&self, domain: &str, path: &str, value: &str) -> BrokerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (domain, path, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(domain, path) DO UPDATE SET value = excluded.value",
            params![domain, path, value],
        )
        .map_err(|e| BrokerError::Storage(format!("failed to write setting: {e}")))?;
        Ok(())
    }

    fn remove(&self, domain: &str, path: &str) -> BrokerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM settings WHERE domain = ?1 AND path = ?2",
            params![domain, path],
        )
        .map_err(|e| BrokerError::Storage(format!("failed to delete setting: {e}")))?;
        Ok(())
    }
}
