//! SQLite-backed persistence for cache entries.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;

/// Bytes charged per entry on top of its key and value text, standing in
/// for the row's integer columns.
pub const ENTRY_OVERHEAD: u64 = 16;

/// How long a writer waits for another process holding the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the current Unix timestamp in seconds.
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Accounted size of one entry.
pub fn entry_size(path: &str, version: &str, facet: &str, value: &str) -> u64 {
    (path.len() + version.len() + facet.len() + value.len()) as u64 + ENTRY_OVERHEAD
}

/// What eviction needs to know about a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Insertion sequence; lower is older.
    pub seq: i64,
    pub size: u64,
    /// Unix seconds of the last write.
    pub created_at: i64,
}

/// Entry store over a single SQLite database file.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at the given path and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema. This is idempotent.
    fn init(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                version TEXT NOT NULL,
                facet TEXT NOT NULL,
                value TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(path, version, facet)
            );
            ",
        )?;
        Ok(())
    }

    /// Point lookup of the serialized value for a key.
    pub fn get(
        &self,
        path: &str,
        version: &str,
        facet: &str,
    ) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM entries WHERE path = ?1 AND version = ?2 AND facet = ?3",
                params![path, version, facet],
                |row| row.get(0),
            )
            .optional()
    }

    /// Insert or replace an entry. A replaced entry counts as newly written.
    pub fn put(
        &self,
        path: &str,
        version: &str,
        facet: &str,
        value: &str,
    ) -> Result<(), rusqlite::Error> {
        let size = entry_size(path, version, facet, value);
        self.conn.execute(
            "INSERT OR REPLACE INTO entries (path, version, facet, value, size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![path, version, facet, value, size as i64, now_unix()],
        )?;
        Ok(())
    }

    /// Total accounted size of all entries.
    pub fn total_size(&self) -> Result<u64, rusqlite::Error> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM entries",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    pub fn len(&self) -> Result<u64, rusqlite::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All entries, oldest first.
    pub fn entries_by_age(&self) -> Result<Vec<EntryMeta>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, size, created_at
             FROM entries
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(EntryMeta {
                seq: row.get(0)?,
                size: row.get::<_, i64>(1)? as u64,
                created_at: row.get(2)?,
            })
        })?;

        rows.collect()
    }

    /// Delete the given entries in one transaction.
    pub fn delete(&mut self, seqs: &[i64]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM entries WHERE seq = ?1")?;
            for seq in seqs {
                stmt.execute(params![seq])?;
            }
        }
        tx.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_put_and_get() {
        let (store, _dir) = create_test_store();
        store.put("/file", "1", "info", "{\"a\":1}").unwrap();

        assert_eq!(
            store.get("/file", "1", "info").unwrap(),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(store.get("/file", "2", "info").unwrap(), None);
        assert_eq!(store.get("/file", "1", "log").unwrap(), None);
    }

    #[test]
    fn test_size_accounting() {
        let (store, _dir) = create_test_store();
        store.put("/foo", "0", "data", "1").unwrap();
        store.put("/foo", "1", "data", "0.1").unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(
            store.total_size().unwrap(),
            entry_size("/foo", "0", "data", "1") + entry_size("/foo", "1", "data", "0.1")
        );
    }

    #[test]
    fn test_replace_moves_entry_to_newest() {
        let (mut store, _dir) = create_test_store();
        store.put("/a", "1", "data", "1").unwrap();
        store.put("/b", "1", "data", "2").unwrap();
        store.put("/a", "1", "data", "3").unwrap();

        let entries = store.entries_by_age().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].seq < entries[1].seq);
        assert!(entries[1].created_at > 0);
        assert_eq!(store.get("/a", "1", "data").unwrap(), Some("3".to_string()));

        // The oldest entry is now /b.
        store.delete(&[entries[0].seq]).unwrap();
        assert_eq!(store.get("/b", "1", "data").unwrap(), None);
        assert_eq!(store.get("/a", "1", "data").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn test_delete() {
        let (mut store, _dir) = create_test_store();
        store.put("/a", "1", "data", "1").unwrap();
        store.put("/b", "1", "data", "2").unwrap();

        let first = store.entries_by_age().unwrap()[0].seq;
        store.delete(&[first]).unwrap();

        assert_eq!(store.get("/a", "1", "data").unwrap(), None);
        assert!(store.get("/b", "1", "data").unwrap().is_some());
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("test.db");
        {
            let store = Store::open(&db).unwrap();
            store.put("/a", "", "info", "true").unwrap();
        }
        let store = Store::open(&db).unwrap();
        assert_eq!(store.get("/a", "", "info").unwrap(), Some("true".to_string()));
    }
}
