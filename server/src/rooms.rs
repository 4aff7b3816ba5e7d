use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::room::{spawn_room, RoomTx};
use crate::store::{SqliteImageStore, StoreError};

/// Room joined by connections that do not name one.
pub const DEFAULT_ROOM: &str = "main";

struct RoomHandle {
    tx: RoomTx,
    alive: Arc<AtomicBool>,
}

/// Process-wide index of live rooms. The lock guards handle lookup only;
/// room state is owned by each room's event loop.
#[derive(Clone)]
pub struct Rooms {
    handles: Arc<Mutex<HashMap<String, RoomHandle>>>,
    data_dir: PathBuf,
}

impl Rooms {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
            data_dir,
        }
    }

    /// Room keys double as database file names.
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Hands out the command channel of the live room for `key`, spawning
    /// its event loop first when there is none. A room that terminated
    /// comes back on the same database file, state intact.
    pub fn obtain(&self, key: &str) -> Result<RoomTx, StoreError> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = handles.get(key) {
            if handle.alive.load(Ordering::Acquire) {
                return Ok(handle.tx.clone());
            }
            log::info!("room {} wound down earlier, respawning", key);
        }

        let store = SqliteImageStore::open(&self.database_path(key))?;
        let (tx, alive) = spawn_room(key.to_owned(), store);
        handles.insert(
            key.to_owned(),
            RoomHandle {
                tx: tx.clone(),
                alive,
            },
        );
        Ok(tx)
    }

    /// Lookup that never spawns. Administrative callers observe rooms;
    /// they do not bring them into existence.
    pub fn get(&self, key: &str) -> Option<RoomTx> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.get(key).and_then(|handle| {
            if handle.alive.load(Ordering::Acquire) {
                Some(handle.tx.clone())
            } else {
                None
            }
        })
    }

    fn database_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_plain_keys_only() {
        assert!(Rooms::is_valid_key("main"));
        assert!(Rooms::is_valid_key("team-42_b"));
        assert!(!Rooms::is_valid_key(""));
        assert!(!Rooms::is_valid_key("a/b"));
        assert!(!Rooms::is_valid_key(".."));
        assert!(!Rooms::is_valid_key("a room"));
    }
}
