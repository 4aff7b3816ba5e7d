use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{channel, Sender};

use system::{DraggedImage, PersistedImage, Session, SessionId, WsMessage};

use crate::admin::{AdminCommand, RoomDescription};
use crate::connection::{ConnectionEvent, RoomCommand};
use crate::connection_tx_storage::{ConnectionTx, ConnectionTxStorage};
use crate::registry::{ConnectionId, SessionRegistry};
use crate::store::{now_ms, ImageStore};

pub type RoomTx = Sender<RoomCommand>;

/// Image id wildcard that clears the whole store.
const DELETE_ALL: &str = "*";

struct Room<S: ImageStore> {
    key: String,
    registry: SessionRegistry,
    store: S,
    connections: ConnectionTxStorage,
}

impl<S: ImageStore> Room<S> {
    fn new(key: String, store: S) -> Self {
        Self {
            key,
            registry: SessionRegistry::new(),
            store,
            connections: ConnectionTxStorage::new(),
        }
    }

    async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect {
                tx,
                session_id,
                resume,
            } => self.connect(tx, session_id, resume).await,
            RoomCommand::Disconnect { from } => self.disconnect(&from).await,
            RoomCommand::Incoming { from, message } => self.handle_message(&from, message).await,
            RoomCommand::Admin(AdminCommand::CloseSessions { tx }) => {
                let closed = self.close_sessions().await;
                if tx.send(closed).is_err() {
                    log::debug!("room {}: close-sessions caller went away", self.key);
                }
            }
            RoomCommand::Admin(AdminCommand::Describe { tx }) => {
                if tx.send(self.describe()).is_err() {
                    log::debug!("room {}: describe caller went away", self.key);
                }
            }
        }
    }

    async fn connect(&mut self, tx: ConnectionTx, session_id: SessionId, resume: Option<Session>) {
        let connection_id = self.registry.new_connection_id();
        self.connections.insert(connection_id, tx);

        let resumed = resume.is_some();
        let session = resume.unwrap_or_else(|| Session::new(session_id));
        if let Err(err) = self.registry.create(connection_id, session.clone()) {
            log::warn!(
                "room {}: rejecting connection {}: {:?}",
                self.key,
                connection_id,
                err
            );
            if let Some(mut tx) = self.connections.remove(&connection_id) {
                let _ = tx.try_send(ConnectionEvent::Disconnected);
            }
            return;
        }

        let delivered = self
            .connections
            .send(
                &connection_id,
                ConnectionEvent::Connected {
                    connection_id,
                    session: session.clone(),
                },
            )
            .await;
        if !delivered {
            // The socket died before it heard back, so its own
            // disconnect report is never coming. Nobody saw a join;
            // nobody gets a quit.
            log::info!(
                "room {}: connection {} died before registration",
                self.key,
                connection_id
            );
            self.connections.remove(&connection_id);
            self.registry.remove(&connection_id);
            return;
        }

        log::info!(
            "room {}: connection {} registered as {} (resumed: {})",
            self.key,
            connection_id,
            session.id,
            resumed
        );
        // A resumed session already announced itself to the room once.
        if !resumed {
            let message = WsMessage::Join {
                id: session.id.clone(),
            };
            self.broadcast(&message, Some(&session.id)).await;
        }
    }

    async fn disconnect(&mut self, from: &ConnectionId) {
        if let Some(mut tx) = self.connections.remove(from) {
            let _ = tx.try_send(ConnectionEvent::Disconnected);
        }
        // `remove` returning None means this connection was never
        // registered or its quit was already announced.
        if let Some(session) = self.registry.remove(from) {
            log::info!("room {}: connection {} left", self.key, from);
            let message = WsMessage::Quit {
                id: session.id.clone(),
            };
            self.broadcast(&message, Some(&session.id)).await;
        }
    }

    async fn handle_message(&mut self, from: &ConnectionId, message: WsMessage) {
        if self.registry.get(from).is_none() {
            log::debug!("room {}: frame from unknown connection {}", self.key, from);
            return;
        }

        match &message {
            WsMessage::Message { .. } => {
                if let Some(without) = self.registry.get(from).map(|s| s.id.clone()) {
                    self.broadcast(&message, Some(&without)).await;
                }
            }
            WsMessage::Move { x, y, .. } => {
                if let Some(session) = self.registry.get_mut(from) {
                    session.x = *x;
                    session.y = *y;
                    let snapshot = session.clone();
                    let without = snapshot.id.clone();
                    self.connections
                        .send(from, ConnectionEvent::Snapshot(snapshot))
                        .await;
                    self.broadcast(&message, Some(&without)).await;
                }
            }
            WsMessage::StartDrag {
                image_id,
                image_url,
                x,
                y,
                ..
            } => {
                if let Some(session) = self.registry.get_mut(from) {
                    // Starting over an unfinished drag just replaces it.
                    session.x = *x;
                    session.y = *y;
                    session.dragged_image = Some(DraggedImage {
                        id: image_id.clone(),
                        url: image_url.clone(),
                        x: *x,
                        y: *y,
                    });
                    let snapshot = session.clone();
                    let without = snapshot.id.clone();
                    self.connections
                        .send(from, ConnectionEvent::Snapshot(snapshot))
                        .await;
                    self.broadcast(&message, Some(&without)).await;
                }
            }
            WsMessage::DragMove { x, y, .. } => {
                let snapshot = match self.registry.get_mut(from) {
                    Some(session) if session.dragged_image.is_some() => {
                        session.x = *x;
                        session.y = *y;
                        if let Some(image) = session.dragged_image.as_mut() {
                            image.x = *x;
                            image.y = *y;
                        }
                        Some(session.clone())
                    }
                    // No drag in progress; the frame never happened.
                    _ => None,
                };
                if let Some(snapshot) = snapshot {
                    let without = snapshot.id.clone();
                    self.connections
                        .send(from, ConnectionEvent::Snapshot(snapshot))
                        .await;
                    self.broadcast(&message, Some(&without)).await;
                }
            }
            WsMessage::EndDrag { .. } => self.end_drag(from, &message).await,
            WsMessage::GetCursors => {
                let sessions: Vec<Session> = self.registry.sessions().cloned().collect();
                self.connections
                    .send(
                        from,
                        ConnectionEvent::Frame(WsMessage::GetCursorsResponse { sessions }),
                    )
                    .await;
            }
            WsMessage::GetImages => match self.store.list() {
                Ok(images) => {
                    self.connections
                        .send(
                            from,
                            ConnectionEvent::Frame(WsMessage::GetImagesResponse { images }),
                        )
                        .await;
                }
                // The requester just never gets a reply; it can ask again.
                Err(err) => log::error!("room {}: failed to list images: {}", self.key, err),
            },
            WsMessage::DeletePersistedImage { image_id } => {
                let result = if image_id.as_str() == DELETE_ALL {
                    self.store.delete_all()
                } else {
                    self.store.delete(image_id)
                };
                match result {
                    Ok(removed) => {
                        log::info!("room {}: removed {} persisted image(s)", self.key, removed)
                    }
                    Err(err) => {
                        log::error!("room {}: failed to delete {}: {}", self.key, image_id, err)
                    }
                }
                // Everyone re-fetches, the sender included.
                self.broadcast(&message, None).await;
            }
            // Server-to-client shapes bounced back by a confused client.
            _ => log::debug!("room {}: ignoring inbound {:?}", self.key, message),
        }
    }

    /// Commits a finished drag. The drop is confirmed to everyone, then
    /// the session goes idle and the gesture itself is rebroadcast. The
    /// idle transition happens even when the write fails; clients
    /// reconcile through get-images.
    async fn end_drag(&mut self, from: &ConnectionId, message: &WsMessage) {
        let (dropped, snapshot) = match self.registry.get_mut(from) {
            Some(session) => {
                let dropped = session.dragged_image.take().map(|image| PersistedImage {
                    id: image.id,
                    url: image.url,
                    x: image.x,
                    y: image.y,
                    timestamp: now_ms(),
                });
                (dropped, session.clone())
            }
            None => return,
        };

        if let Some(image) = dropped {
            match self.store.upsert(&image) {
                Ok(()) => {
                    let confirmation = WsMessage::ImagePersisted { image };
                    self.broadcast(&confirmation, None).await;
                }
                Err(err) => {
                    log::error!(
                        "room {}: failed to persist image {}: {}",
                        self.key,
                        image.id,
                        err
                    );
                }
            }
        }

        let without = snapshot.id.clone();
        self.connections
            .send(from, ConnectionEvent::Snapshot(snapshot))
            .await;
        self.broadcast(message, Some(&without)).await;
    }

    /// Fans a frame out to every registered connection, skipping sessions
    /// whose id matches `without`.
    async fn broadcast(&mut self, message: &WsMessage, without: Option<&SessionId>) {
        for (connection_id, session) in self.registry.sessions_with_ids() {
            if without.map_or(false, |id| &session.id == id) {
                continue;
            }
            self.connections
                .send(&connection_id, ConnectionEvent::Frame(message.clone()))
                .await;
        }
    }

    async fn close_sessions(&mut self) -> usize {
        let mut closed = 0;
        for connection_id in self.connections.connection_ids() {
            let delivered = self
                .connections
                .send(&connection_id, ConnectionEvent::Disconnected)
                .await;
            if delivered {
                closed += 1;
            } else {
                // A dead channel cannot answer with its own disconnect
                // report; purge it here as if one had arrived.
                self.disconnect(&connection_id).await;
            }
        }
        log::info!("room {}: force-closed {} connection(s)", self.key, closed);
        closed
    }

    fn describe(&self) -> RoomDescription {
        RoomDescription {
            key: self.key.clone(),
            sessions: self.registry.len(),
            images: self.store.list().map(|images| images.len()).unwrap_or_else(
                |err| {
                    log::error!("room {}: failed to count images: {}", self.key, err);
                    0
                },
            ),
        }
    }
}

/// Spawns a room's event loop and returns its command channel plus a
/// liveness flag that flips to false once the loop has terminated.
///
/// The loop runs until the last session leaves; commands already queued
/// behind that departure are still handled before it winds down.
pub fn spawn_room<S>(key: String, store: S) -> (RoomTx, Arc<AtomicBool>)
where
    S: ImageStore + 'static,
{
    let (room_tx, mut room_rx) = channel::<RoomCommand>(64);
    let alive = Arc::new(AtomicBool::new(true));
    let alive_in_loop = alive.clone();

    tokio::spawn(async move {
        let _guard = AliveGuard(alive_in_loop);
        let mut room = Room::new(key, store);
        log::info!("room {} - started", room.key);

        'recv: while let Some(command) = room_rx.recv().await {
            let leaving = matches!(
                command,
                RoomCommand::Disconnect { .. }
                    | RoomCommand::Admin(AdminCommand::CloseSessions { .. })
            );
            room.handle_command(command).await;
            if leaving {
                while room.registry.is_empty() {
                    match room_rx.try_recv() {
                        Ok(command) => room.handle_command(command).await,
                        Err(_) => break 'recv,
                    }
                }
            }
        }

        log::info!("room {} - terminated", room.key);
    });

    (room_tx, alive)
}

struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
