//! Per-client WebSocket session: the axum route handler plus the send/
//! receive loop described in §4.5/§4.7. One client connection gets one
//! `ClientId`, one outgoing `ServerMessage` queue (for control messages
//! broadcast from elsewhere, e.g. another client's `master_changed`), and
//! wakes on the shared notify pipe via `tokio::io::unix::AsyncFd` to scan
//! every pane's generation for new binary sync frames to send.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use dullahan_core::pane::PaneId;
use dullahan_core::sync_encoder::{encode_delta, encode_snapshot};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::unix::AsyncFd;
use tracing::{info, warn};

use crate::protocol::{ClientMessage, ServerMessage, WindowView};
use crate::state::AppState;

type Sink = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct NotifyFd(Arc<dullahan_core::notify_pipe::NotifyPipe>);

impl AsRawFd for NotifyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.read_fd()
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (client_id, mut control_rx) = state.register_client();
    info!(client_id, "client connected");

    let async_fd = match AsyncFd::new(NotifyFd(state.notify.clone())) {
        Ok(fd) => fd,
        Err(e) => {
            warn!(client_id, error = %e, "failed to watch notify pipe");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let mut last_sent: HashMap<PaneId, u64> = HashMap::new();

    for pane_id in state.session.pane_ids() {
        if send_full_sync(&state, &mut sink, pane_id, &mut last_sent).await.is_err() {
            state.unregister_client(client_id);
            return;
        }
    }
    let _ = send_layout(&state, &mut sink).await;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_client_message(&state, client_id, &text, &mut sink, &mut last_sent).await {
                            warn!(client_id, error = %e, "dropping malformed client message");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            guard = async_fd.readable() => {
                let Ok(mut guard) = guard else { break };
                state.notify.drain();
                guard.clear_ready();
                for pane_id in state.session.pane_ids() {
                    if send_delta_or_snapshot(&state, &mut sink, pane_id, &mut last_sent).await.is_err() {
                        break;
                    }
                }
            }
            control = control_rx.recv() => {
                match control {
                    Some(msg) => {
                        if send_control(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister_client(client_id);
    info!(client_id, "client disconnected");
}

async fn send_binary(sink: &mut Sink, bytes: Vec<u8>) -> Result<(), ()> {
    sink.send(Message::Binary(bytes.into())).await.map_err(|_| ())
}

async fn send_full_sync(
    state: &AppState,
    sink: &mut Sink,
    pane_id: PaneId,
    last_sent: &mut HashMap<PaneId, u64>,
) -> Result<(), ()> {
    let Some(pane) = state.session.pane(pane_id) else {
        return Ok(());
    };
    let Ok(bytes) = encode_snapshot(&pane) else {
        return Ok(());
    };
    last_sent.insert(pane_id, pane.generation());
    send_binary(sink, bytes).await
}

async fn send_delta_or_snapshot(
    state: &AppState,
    sink: &mut Sink,
    pane_id: PaneId,
    last_sent: &mut HashMap<PaneId, u64>,
) -> Result<(), ()> {
    let Some(pane) = state.session.pane(pane_id) else {
        return Ok(());
    };
    let current_gen = pane.generation();
    let from_gen = *last_sent.get(&pane_id).unwrap_or(&0);
    if current_gen == from_gen {
        return Ok(());
    }
    match encode_delta(&pane, from_gen, state.config) {
        Ok(Some(bytes)) => {
            last_sent.insert(pane_id, current_gen);
            send_binary(sink, bytes).await
        }
        Ok(None) => send_full_sync(state, sink, pane_id, last_sent).await,
        Err(_) => Ok(()),
    }
}

async fn send_control(sink: &mut Sink, message: &ServerMessage) -> Result<(), ()> {
    let Ok(json) = serde_json::to_string(message) else {
        return Ok(());
    };
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn send_layout(state: &AppState, sink: &mut Sink) -> Result<(), ()> {
    let windows: Vec<WindowView> = state.session.windows().into_iter().map(Into::into).collect();
    send_control(sink, &ServerMessage::Layout { windows }).await
}

async fn handle_client_message(
    state: &Arc<AppState>,
    client_id: u64,
    text: &str,
    sink: &mut Sink,
    last_sent: &mut HashMap<PaneId, u64>,
) -> anyhow::Result<()> {
    let message: ClientMessage = serde_json::from_str(text)?;
    let is_master = state.master.is_master(client_id);
    match message {
        ClientMessage::Ping => {
            let _ = send_control(sink, &ServerMessage::Pong).await;
        }
        ClientMessage::Sync { pane_id, .. } | ClientMessage::Resync { pane_id } => {
            let _ = send_full_sync(state, sink, pane_id, last_sent).await;
        }
        ClientMessage::Focus { pane_id } => {
            state.broadcast(ServerMessage::Focus { pane_id });
        }
        ClientMessage::RequestMaster => {
            if let Some(transition) = state.master.request(client_id) {
                state.broadcast(ServerMessage::MasterChanged {
                    master: transition.new_master,
                });
            }
        }
        ClientMessage::ReleaseMaster => {
            if let Some(transition) = state.master.release(client_id) {
                state.broadcast(ServerMessage::MasterChanged {
                    master: transition.new_master,
                });
            }
        }
        ClientMessage::Key { pane_id, bytes } if is_master => {
            let raw = base64::engine::general_purpose::STANDARD.decode(bytes)?;
            state.session.write_input(pane_id, &raw)?;
        }
        ClientMessage::Text { pane_id, text } if is_master => {
            state.session.write_input(pane_id, text.as_bytes())?;
        }
        ClientMessage::Resize { pane_id, rows, cols } if is_master => {
            state.session.resize_pane(pane_id, rows, cols)?;
        }
        ClientMessage::Scroll { pane_id, delta_rows } if is_master => {
            if let Some(pane) = state.session.pane(pane_id) {
                pane.scroll(delta_rows)?;
            }
        }
        ClientMessage::NewWindow { cwd } if is_master => {
            let cwd = cwd.map(std::path::PathBuf::from);
            state.session.new_pane(None, 24, 80, cwd)?;
            let _ = send_layout(state, sink).await;
        }
        ClientMessage::CloseWindow { window_id } if is_master => {
            for window in state.session.windows() {
                if window.id == window_id {
                    for pane_id in window.pane_ids {
                        state.session.close_pane(pane_id);
                    }
                }
            }
            let _ = send_layout(state, sink).await;
        }
        ClientMessage::Key { .. }
        | ClientMessage::Text { .. }
        | ClientMessage::Resize { .. }
        | ClientMessage::Scroll { .. }
        | ClientMessage::NewWindow { .. }
        | ClientMessage::CloseWindow { .. } => {
            let _ = send_control(
                sink,
                &ServerMessage::Error {
                    message: "rejected: master session required".to_string(),
                },
            )
            .await;
        }
        ClientMessage::Hello { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping_round_trip() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert!(json.contains("pong"));
        let _: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
    }
}
