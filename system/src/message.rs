use serde::{Deserialize, Serialize};

use crate::{PersistedImage, Session, SessionId};

/// Every frame that crosses the wire, in both directions. The `type` tag
/// and field casing match what the browser client sends verbatim, since
/// most client frames are rebroadcast without rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsMessage {
    Message {
        data: String,
    },
    Quit {
        id: SessionId,
    },
    Join {
        id: SessionId,
    },
    Move {
        id: SessionId,
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    StartDrag {
        id: SessionId,
        image_id: String,
        image_url: String,
        x: f64,
        y: f64,
    },
    DragMove {
        id: SessionId,
        x: f64,
        y: f64,
    },
    EndDrag {
        id: SessionId,
    },
    GetCursors,
    GetCursorsResponse {
        sessions: Vec<Session>,
    },
    GetImages,
    GetImagesResponse {
        images: Vec<PersistedImage>,
    },
    #[serde(rename_all = "camelCase")]
    DeletePersistedImage {
        image_id: String,
    },
    ImagePersisted {
        image: PersistedImage,
    },
}

impl WsMessage {
    /// Parses one inbound text frame. Callers treat an error as "this
    /// frame never happened" and drop it without closing the connection.
    pub fn decode(raw: &str) -> Result<WsMessage, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_rejects_frames_that_are_not_messages() {
        assert!(WsMessage::decode("").is_err());
        assert!(WsMessage::decode("hello").is_err());
        assert!(WsMessage::decode("{\"x\":1}").is_err());
        assert!(WsMessage::decode("{\"type\":\"warp\"}").is_err());
        // Known tag, missing fields.
        assert!(WsMessage::decode("{\"type\":\"move\",\"id\":\"u1\",\"x\":0.5}").is_err());
        // Known tag, wrong field type.
        assert!(WsMessage::decode("{\"type\":\"move\",\"id\":\"u1\",\"x\":\"a\",\"y\":0.5}").is_err());
    }

    #[test]
    fn it_decodes_tagged_frames() {
        let message = WsMessage::decode("{\"type\":\"move\",\"id\":\"u1\",\"x\":0.25,\"y\":0.75}")
            .expect("valid move frame");
        assert_eq!(
            message,
            WsMessage::Move {
                id: "u1".into(),
                x: 0.25,
                y: 0.75
            }
        );

        let message = WsMessage::decode("{\"type\":\"get-cursors\"}").expect("valid bare frame");
        assert_eq!(message, WsMessage::GetCursors);
    }

    #[test]
    fn it_decodes_camel_case_drag_fields() {
        let raw = "{\"type\":\"start-drag\",\"id\":\"u1\",\"imageId\":\"img-1\",\
                   \"imageUrl\":\"https://example.test/cat.png\",\"x\":0.1,\"y\":0.2}";
        let message = WsMessage::decode(raw).expect("valid start-drag frame");
        assert_eq!(
            message,
            WsMessage::StartDrag {
                id: "u1".into(),
                image_id: "img-1".into(),
                image_url: "https://example.test/cat.png".into(),
                x: 0.1,
                y: 0.2
            }
        );
    }
}
