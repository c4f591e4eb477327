pub mod models;

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Logical names of the persisted blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    ChatMessages,
    Chats,
    ActivePdf,
    ActiveChat,
    ApiKey,
    Theme,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::ChatMessages => "chat_messages",
            StorageKey::Chats => "chats",
            StorageKey::ActivePdf => "active_pdf",
            StorageKey::ActiveChat => "active_chat",
            StorageKey::ApiKey => "api_key",
            StorageKey::Theme => "theme",
        }
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(app_dir)?;
        let db_path = app_dir.join("pdf-brain.db");
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    pub fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: StorageKey) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key.as_str()])?;
        Ok(())
    }

    /// Reads a JSON blob. A value that no longer parses is treated as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "discarding unreadable stored value");
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::models::Chat;
    use super::*;

    #[test]
    fn test_get_missing_key_is_none() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get(StorageKey::ApiKey).unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_and_remove_clears() {
        let db = Database::in_memory().unwrap();
        db.set(StorageKey::ApiKey, "k1").unwrap();
        db.set(StorageKey::ApiKey, "k2").unwrap();
        assert_eq!(db.get(StorageKey::ApiKey).unwrap().as_deref(), Some("k2"));
        db.remove(StorageKey::ApiKey).unwrap();
        assert_eq!(db.get(StorageKey::ApiKey).unwrap(), None);
    }

    #[test]
    fn test_corrupt_json_reads_as_absent() {
        let db = Database::in_memory().unwrap();
        db.set(StorageKey::Chats, "{not json").unwrap();
        let chats: Option<Vec<Chat>> = db.get_json(StorageKey::Chats).unwrap();
        assert!(chats.is_none());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let chats = vec![Chat::new("Chat 1")];
        {
            let db = Database::new(dir.path()).unwrap();
            db.set_json(StorageKey::Chats, &chats).unwrap();
        }
        let db = Database::new(dir.path()).unwrap();
        let back: Vec<Chat> = db.get_json(StorageKey::Chats).unwrap().unwrap();
        assert_eq!(back, chats);
    }
}
