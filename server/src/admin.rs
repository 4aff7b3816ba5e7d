use serde::Serialize;
use tokio::sync::oneshot::Sender;

/// Out-of-band requests a room answers over a oneshot channel. These run
/// on the room's own event loop, so they see settled state.
#[derive(Debug)]
pub enum AdminCommand {
    /// Force-close every live connection. Replies with how many sockets
    /// were told to close; repeating the call is harmless.
    CloseSessions { tx: Sender<usize> },
    Describe { tx: Sender<RoomDescription> },
}

/// Point-in-time view of one live room.
#[derive(Debug, Serialize)]
pub struct RoomDescription {
    pub key: String,
    pub sessions: usize,
    pub images: usize,
}
