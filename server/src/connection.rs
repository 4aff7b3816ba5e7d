use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tokio::sync::mpsc::error::TrySendError;

use system::{Session, SessionId, WsMessage};

use crate::admin::AdminCommand;
use crate::connection_tx_storage::ConnectionTx;
use crate::registry::ConnectionId;
use crate::room::RoomTx;
use crate::rooms::{Rooms, DEFAULT_ROOM};

/// Frames queued while the connection is not registered with a room yet.
const MAX_PENDING_FRAMES: usize = 64;

#[derive(Debug)]
pub enum RoomCommand {
    Connect {
        tx: ConnectionTx,
        session_id: SessionId,
        /// Snapshot carried over by a connection that outlived its room.
        resume: Option<Session>,
    },
    Disconnect {
        from: ConnectionId,
    },
    Incoming {
        from: ConnectionId,
        message: WsMessage,
    },
    Admin(AdminCommand),
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected {
        connection_id: ConnectionId,
        session: Session,
    },
    /// Fresh session snapshot for the actor to hold on to.
    Snapshot(Session),
    Frame(WsMessage),
    Disconnected,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Connected(ConnectionId),
}

struct ConnectionActor {
    state: ConnectionState,
    rooms: Rooms,
    room_key: String,
    room_tx: RoomTx,
    session_id: SessionId,
    /// Last session snapshot the room pushed down. Survives the room, so
    /// a respawned room can pick up where the old one stopped.
    attachment: Option<Session>,
    events_tx: Option<ConnectionTx>,
    pending: Vec<WsMessage>,
}

impl ConnectionActor {
    fn new(rooms: Rooms, room_key: String, session_id: SessionId, room_tx: RoomTx) -> Self {
        Self {
            state: ConnectionState::Idle,
            rooms,
            room_key,
            room_tx,
            session_id,
            attachment: None,
            events_tx: None,
            pending: Vec::new(),
        }
    }

    fn connect_command(&self) -> Option<RoomCommand> {
        self.events_tx.as_ref().map(|tx| RoomCommand::Connect {
            tx: tx.clone(),
            session_id: self.session_id.clone(),
            resume: self.attachment.clone(),
        })
    }

    /// Forwards a command to the room. A closed channel means the room
    /// terminated while this socket stayed open; re-register against a
    /// fresh room using the held snapshot, dropping this one command.
    fn send_to_room(&mut self, command: RoomCommand) {
        match self.room_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                log::warn!(
                    "room {} is not keeping up, dropping {:?}",
                    self.room_key,
                    command
                );
            }
            Err(TrySendError::Closed(command)) => {
                log::info!(
                    "room {} is gone, re-registering connection (lost {:?})",
                    self.room_key,
                    command
                );
                self.state = ConnectionState::Idle;
                match self.rooms.obtain(&self.room_key) {
                    Ok(room_tx) => {
                        self.room_tx = room_tx;
                        if let Some(connect) = self.connect_command() {
                            if self.room_tx.try_send(connect).is_err() {
                                log::error!("room {} refused re-registration", self.room_key);
                            }
                        }
                    }
                    Err(err) => {
                        log::error!("cannot respawn room {}: {}", self.room_key, err);
                    }
                }
            }
        }
    }

    fn forward_or_queue(&mut self, message: WsMessage) {
        match self.state {
            ConnectionState::Connected(from) => {
                self.send_to_room(RoomCommand::Incoming { from, message });
            }
            ConnectionState::Idle => {
                if self.pending.len() < MAX_PENDING_FRAMES {
                    self.pending.push(message);
                } else {
                    log::warn!("dropping frame queued before registration");
                }
            }
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);
        self.events_tx = Some(tx);

        let addr = ctx.address().recipient();
        tokio::spawn(async move {
            log::debug!("connection green thread - started");
            while let Some(event) = rx.recv().await {
                if addr.do_send(ConnectionActorMessage(event)).is_err() {
                    break;
                }
            }
            log::debug!("connection green thread - terminated");
        });

        if let Some(connect) = self.connect_command() {
            self.send_to_room(connect);
        }
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(from) = self.state {
            if self.room_tx.try_send(RoomCommand::Disconnect { from }).is_err() {
                log::debug!("room {} is already gone", self.room_key);
            }
        }
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => match WsMessage::decode(&text) {
                Ok(message) => self.forward_or_queue(message),
                // Anything unparseable never happened.
                Err(err) => log::debug!("dropping malformed frame: {}", err),
            },
            Ok(ws::Message::Close(_)) => ctx.stop(),
            _ => (),
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        match msg.0 {
            ConnectionEvent::Connected {
                connection_id,
                session,
            } => {
                self.state = ConnectionState::Connected(connection_id);
                self.attachment = Some(session);
                for message in std::mem::take(&mut self.pending) {
                    self.send_to_room(RoomCommand::Incoming {
                        from: connection_id,
                        message,
                    });
                }
            }
            ConnectionEvent::Snapshot(session) => {
                self.attachment = Some(session);
            }
            ConnectionEvent::Frame(message) => match message.encode() {
                Ok(text) => ctx.text(text),
                Err(err) => log::error!("failed to encode frame: {}", err),
            },
            ConnectionEvent::Disconnected => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

#[derive(Deserialize)]
pub struct ConnectQuery {
    id: Option<SessionId>,
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    rooms: web::Data<Rooms>,
) -> Result<HttpResponse, Error> {
    let session_id = match query.into_inner().id {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(HttpResponse::BadRequest().body("Missing id")),
    };
    let room_key = req
        .match_info()
        .get("room")
        .unwrap_or(DEFAULT_ROOM)
        .to_owned();
    if !Rooms::is_valid_key(&room_key) {
        return Ok(HttpResponse::BadRequest().body("Invalid room"));
    }

    let rooms = rooms.get_ref().clone();
    let room_tx = match rooms.obtain(&room_key) {
        Ok(room_tx) => room_tx,
        Err(err) => {
            log::error!("cannot open room {}: {}", room_key, err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    ws::start(
        ConnectionActor::new(rooms, room_key, session_id, room_tx),
        &req,
        stream,
    )
}
