use std::path::Path;

use rusqlite::{params, Connection};

use system::PersistedImage;

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS dragged_images (
    id        TEXT PRIMARY KEY,
    url       TEXT NOT NULL,
    x         REAL NOT NULL,
    y         REAL NOT NULL,
    timestamp INTEGER NOT NULL
);
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Milliseconds since the epoch, the unit of the `timestamp` column.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resting state of dropped images. Rooms commit through this seam only,
/// so the write policy can change without touching the drag lifecycle.
pub trait ImageStore: Send {
    fn upsert(&mut self, image: &PersistedImage) -> Result<(), StoreError>;

    /// Returns the number of rows removed.
    fn delete(&mut self, image_id: &str) -> Result<usize, StoreError>;

    fn delete_all(&mut self) -> Result<usize, StoreError>;

    /// All persisted images, most recently dropped first.
    fn list(&self) -> Result<Vec<PersistedImage>, StoreError>;
}

pub struct SqliteImageStore {
    conn: Connection,
}

impl SqliteImageStore {
    /// Opens or creates the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        Self::prepare(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {}", e)))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StoreError::Database(format!("schema: {}", e)))?;
        Ok(Self { conn })
    }
}

impl ImageStore for SqliteImageStore {
    fn upsert(&mut self, image: &PersistedImage) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO dragged_images (id, url, x, y, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![image.id, image.url, image.x, image.y, image.timestamp],
        )?;
        Ok(())
    }

    fn delete(&mut self, image_id: &str) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM dragged_images WHERE id = ?1", params![image_id])?;
        Ok(removed)
    }

    fn delete_all(&mut self) -> Result<usize, StoreError> {
        let removed = self.conn.execute("DELETE FROM dragged_images", [])?;
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<PersistedImage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, x, y, timestamp FROM dragged_images ORDER BY timestamp DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PersistedImage {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    x: row.get(2)?,
                    y: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, timestamp: i64) -> PersistedImage {
        PersistedImage {
            id: id.into(),
            url: format!("https://example.test/{}.png", id),
            x: 0.5,
            y: 0.5,
            timestamp,
        }
    }

    #[test]
    fn it_lists_newest_first() {
        let mut store = SqliteImageStore::in_memory().expect("in-memory store");
        store.upsert(&image("a", 100)).expect("upsert");
        store.upsert(&image("b", 300)).expect("upsert");
        store.upsert(&image("c", 200)).expect("upsert");

        let ids: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|image| image.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn it_replaces_rows_with_the_same_id() {
        let mut store = SqliteImageStore::in_memory().expect("in-memory store");
        store.upsert(&image("a", 100)).expect("upsert");

        let mut moved = image("a", 200);
        moved.x = 0.9;
        store.upsert(&moved).expect("upsert");

        let images = store.list().expect("list");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].x, 0.9);
        assert_eq!(images[0].timestamp, 200);
    }

    #[test]
    fn it_deletes_one_or_all() {
        let mut store = SqliteImageStore::in_memory().expect("in-memory store");
        store.upsert(&image("a", 100)).expect("upsert");
        store.upsert(&image("b", 200)).expect("upsert");

        assert_eq!(store.delete("a").expect("delete"), 1);
        assert_eq!(store.delete("a").expect("delete"), 0);
        assert_eq!(store.delete_all().expect("delete all"), 1);
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn it_survives_reopening_the_same_file() {
        let dir = std::env::temp_dir().join(format!(
            "image-store-test-{}-{}",
            std::process::id(),
            now_ms()
        ));
        let path = dir.join("room.db");

        {
            let mut store = SqliteImageStore::open(&path).expect("open store");
            store.upsert(&image("a", 100)).expect("upsert");
        }
        {
            let store = SqliteImageStore::open(&path).expect("reopen store");
            let images = store.list().expect("list");
            assert_eq!(images.len(), 1);
            assert_eq!(images[0].id, "a");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
