//! Dullahan daemon: axum HTTP/WebSocket front end over `dullahan-core`'s
//! pane registry and sync engine, plus a small IPC control socket.

pub mod ipc;
pub mod logging;
pub mod protocol;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use dullahan_core::pane::PaneEvent;
use dullahan_core::shutdown::ShutdownHandle;
use tokio::sync::mpsc;

use state::AppState;

/// Build the axum router: `/ws` for the sync protocol, `/healthz` for a
/// liveness probe.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Run the daemon: bind the WebSocket server and the IPC control socket,
/// and return once `shutdown` is requested and both have wound down.
/// `state` is built by the caller (`main`) so logging can be wired to the
/// debug pane before anything starts emitting events; `pane_events` is the
/// receiving half of the channel `state` was built with, handed back here
/// because spawning its forwarding task needs a runtime context `main`
/// doesn't have yet when it calls `AppState::new`.
pub async fn run(
    state: Arc<AppState>,
    pane_events: mpsc::UnboundedReceiver<PaneEvent>,
    shutdown: ShutdownHandle,
) -> anyhow::Result<()> {
    let config = state.config;
    let app = router(state.clone());

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "dullahan listening");

    tokio::spawn(state::broadcast_pane_events(state.clone(), pane_events));

    let socket_path = ipc::default_socket_path(&config.state_dir);
    let ipc_state = state.clone();
    let ipc_shutdown = shutdown.clone();
    let ipc_task = tokio::spawn(async move { ipc::serve(socket_path, ipc_state, ipc_shutdown).await });

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while serve_shutdown.is_running() {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        })
        .await?;

    shutdown.request_shutdown();
    let _ = ipc_task.await;
    Ok(())
}
