//! SQLite-backed cache store.
//!
//! A single `kv` table at `~/.config/cadence/cadence.db` keeps the
//! operational cache across restarts within a day.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::store::CacheStore;
use crate::error::CacheError;
use crate::storage::data_dir;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at `<data_dir>/<file_name>`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default(file_name: &str) -> Result<Self, CacheError> {
        let dir = data_dir().map_err(|e| CacheError::DataDir(e.to_string()))?;
        Self::open(&dir.join(file_name))
    }

    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(|source| CacheError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // `watch` reads while `complete` writes from another process.
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(indoc::indoc! {"
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "})?;
        Ok(())
    }
}

impl CacheStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, bytes],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let mut store = SqliteStore::open_memory().unwrap();
        assert!(store.load("test").unwrap().is_none());
        store.save("test", b"hello").unwrap();
        assert_eq!(store.load("test").unwrap().unwrap(), b"hello".to_vec());
        store.remove("test").unwrap();
        assert!(store.load("test").unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.save("ledger:2026-01-01", b"[]").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load("ledger:2026-01-01").unwrap().unwrap(), b"[]".to_vec());
    }
}
