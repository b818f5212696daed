//! Unix-domain-socket control channel (§SPEC_FULL IPC): a minimal
//! newline-delimited JSON protocol for out-of-band daemon control —
//! `ping`, `status`, `quit`, `help` — independent of the WebSocket sync
//! protocol, so an operator can probe or stop the daemon without a
//! terminal client attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dullahan_core::shutdown::ShutdownHandle;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum IpcCommand {
    Ping,
    Status,
    Quit,
    Help,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum IpcReply {
    Pong { pong: bool },
    Status { panes: usize, windows: usize, port: u16 },
    Bye { bye: bool },
    Help { commands: Vec<&'static str> },
    Error { error: String },
}

/// Bind the control socket at `path`, removing a stale file left by a
/// previous unclean shutdown before binding.
pub async fn serve(
    path: PathBuf,
    state: Arc<AppState>,
    shutdown: ShutdownHandle,
) -> std::io::Result<()> {
    if path.exists() {
        let _ = std::fs::remove_file(&path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&path)?;
    info!(path = %path.display(), "ipc control socket listening");

    while shutdown.is_running() {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => continue,
        };
        let (stream, _) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "ipc accept failed");
                continue;
            }
        };
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state, shutdown).await {
                warn!(error = %e, "ipc connection error");
            }
        });
    }
    let _ = std::fs::remove_file(&path);
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    state: Arc<AppState>,
    shutdown: ShutdownHandle,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<IpcCommand>(&line) {
            Ok(IpcCommand::Ping) => IpcReply::Pong { pong: true },
            Ok(IpcCommand::Status) => IpcReply::Status {
                panes: state.session.pane_ids().len(),
                windows: state.session.windows().len(),
                port: state.config.port,
            },
            Ok(IpcCommand::Quit) => {
                shutdown.request_shutdown();
                IpcReply::Bye { bye: true }
            }
            Ok(IpcCommand::Help) => IpcReply::Help {
                commands: vec!["ping", "status", "quit", "help"],
            },
            Err(e) => IpcReply::Error {
                error: e.to_string(),
            },
        };
        let mut json = serde_json::to_string(&reply).unwrap_or_default();
        json.push('\n');
        write_half.write_all(json.as_bytes()).await?;
        if matches!(reply, IpcReply::Bye { .. }) {
            break;
        }
    }
    Ok(())
}

pub fn default_socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join("dullahan.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_reply_lists_all_commands() {
        let reply = IpcReply::Help {
            commands: vec!["ping", "status", "quit", "help"],
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("ping"));
        assert!(json.contains("quit"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = serde_json::from_str::<IpcCommand>(r#"{"command":"reboot"}"#).unwrap_err();
        assert!(err.to_string().len() > 0);
    }
}
