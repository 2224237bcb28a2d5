use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::store::Storage;

/// SQLite-backed key-value storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT
            );
            "#,
        )?;
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}

impl Storage for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AssignmentsStore, ASSIGNMENTS_KEY};

    #[test]
    fn set_overwrites_and_remove_clears() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get("zoomLink").unwrap(), None);

        db.set("zoomLink", "https://example.com/a").unwrap();
        db.set("zoomLink", "https://example.com/b").unwrap();
        assert_eq!(db.get("zoomLink").unwrap().as_deref(), Some("https://example.com/b"));
        assert_eq!(db.keys().unwrap(), vec!["zoomLink".to_string()]);

        db.remove("zoomLink").unwrap();
        assert_eq!(db.get("zoomLink").unwrap(), None);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new(path).unwrap();
            db.set(ASSIGNMENTS_KEY, "[]").unwrap();
        }

        let mut store = AssignmentsStore::new(Database::new(path).unwrap());
        store.hydrate();
        assert_eq!(store.snapshot().ready().map(|items| items.len()), Some(0));
    }
}
