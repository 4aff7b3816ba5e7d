use std::collections::HashMap;

use crate::connection::ConnectionEvent;
use crate::registry::ConnectionId;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    /// Delivers one event. `false` means the receiving side is gone and
    /// the event was dropped; callers decide whether that matters.
    pub async fn send(&mut self, to: &ConnectionId, message: ConnectionEvent) -> bool {
        if let Some(tx) = self.connection_txs.get_mut(to) {
            if tx.send(message).await.is_err() {
                log::debug!("connection {} is gone, dropping event", to);
                return false;
            }
            true
        } else {
            log::warn!("no tx for connection {}", to);
            false
        }
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connection_txs.keys().copied().collect()
    }
}
