//! JSON control messages exchanged over the WebSocket alongside binary
//! sync frames (§6). Binary frames carry snapshot/delta payloads
//! (encoded by `dullahan_core::sync_encoder`); everything else — input,
//! resize, scroll, focus, master requests, window management, and their
//! server-side acks — is a small tagged JSON object.

use serde::{Deserialize, Serialize};

pub type PaneId = u64;
pub type WindowId = u64;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        #[serde(default)]
        resume_pane: Option<PaneId>,
    },
    Ping,
    /// Client acknowledges the generation it last applied, used to detect
    /// a stalled resync loop (§4.6).
    Sync { pane_id: PaneId, generation: u64 },
    Resync { pane_id: PaneId },
    Key {
        pane_id: PaneId,
        bytes: String, // base64-encoded raw bytes to write to the pty
    },
    Text {
        pane_id: PaneId,
        text: String,
    },
    Resize {
        pane_id: PaneId,
        rows: u16,
        cols: u16,
    },
    Scroll {
        pane_id: PaneId,
        delta_rows: i64,
    },
    Focus {
        pane_id: PaneId,
    },
    RequestMaster,
    ReleaseMaster,
    NewWindow {
        #[serde(default)]
        cwd: Option<String>,
    },
    CloseWindow {
        window_id: WindowId,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    Title {
        pane_id: PaneId,
        title: String,
    },
    Bell {
        pane_id: PaneId,
    },
    Focus {
        pane_id: PaneId,
    },
    MasterChanged {
        master: Option<u64>,
    },
    Layout {
        windows: Vec<WindowView>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowView {
    pub id: WindowId,
    pub title: String,
    pub active_pane_id: Option<PaneId>,
    pub pane_ids: Vec<PaneId>,
}

impl From<dullahan_core::session::Window> for WindowView {
    fn from(w: dullahan_core::session::Window) -> Self {
        Self {
            id: w.id,
            title: w.title,
            active_pane_id: w.active_pane_id,
            pane_ids: w.pane_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resize_message() {
        let json = r#"{"type":"resize","pane_id":3,"rows":40,"cols":120}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Resize { pane_id, rows, cols } => {
                assert_eq!(pane_id, 3);
                assert_eq!(rows, 40);
                assert_eq!(cols, 120);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let json = r#"{"type":"not_a_real_message"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn server_message_serializes_with_tag() {
        let msg = ServerMessage::Bell { pane_id: 7 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"bell\""));
    }
}
