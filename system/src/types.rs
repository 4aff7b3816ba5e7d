use serde::{Deserialize, Serialize};

/// Identifier a client picks for itself before connecting. Uniqueness is
/// the client's problem; the server only routes on it.
pub type SessionId = String;

/// Cursor position that means "has not moved yet". Clients are expected
/// to hide cursors parked here.
pub const UNPLACED: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub x: f64,
    pub y: f64,
    #[serde(
        rename = "draggedImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub dragged_image: Option<DraggedImage>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            x: UNPLACED,
            y: UNPLACED,
            dragged_image: None,
        }
    }
}

/// An image some session is holding mid-drag. Lives only in memory; it
/// becomes a [`PersistedImage`] once dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraggedImage {
    pub id: String,
    pub url: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedImage {
    pub id: String,
    pub url: String,
    pub x: f64,
    pub y: f64,
    /// Milliseconds since the epoch, set at drop time.
    pub timestamp: i64,
}
