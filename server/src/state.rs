//! Shared server state: the pane/window registry, the master arbiter,
//! and the client registry used to fan out control messages (title/bell/
//! focus/master_changed/layout, §6). One instance lives behind an
//! `axum::Extension`/`State`, mirroring the teacher's `Registry` shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use dullahan_core::config::Config;
use dullahan_core::master::{ClientId, MasterArbiter};
use dullahan_core::notify_pipe::NotifyPipe;
use dullahan_core::pane::PaneEvent;
use dullahan_core::session::Session;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

pub struct AppState {
    pub session: Arc<Session>,
    pub master: Arc<MasterArbiter>,
    pub notify: Arc<NotifyPipe>,
    pub config: &'static Config,
    clients: DashMap<ClientId, mpsc::UnboundedSender<ServerMessage>>,
    next_client_id: AtomicU64,
}

impl AppState {
    /// Builds the state and returns the receiving end of the `PaneEvent`
    /// channel alongside it. `tokio::spawn` needs a runtime context that
    /// doesn't exist yet this early in `main` (before `Runtime::block_on`),
    /// so the caller is responsible for spawning [`broadcast_pane_events`]
    /// once one does — see `dullahan_server::run`.
    pub fn new(config: &'static Config) -> (Arc<Self>, mpsc::UnboundedReceiver<PaneEvent>) {
        let notify = Arc::new(NotifyPipe::new().expect("create notify pipe"));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            session: Session::with_events(
                notify.clone(),
                config.scrollback_lines,
                config.dirty_set_viewport_ratio,
                events_tx,
            ),
            master: Arc::new(MasterArbiter::new()),
            notify,
            config,
            clients: DashMap::new(),
            next_client_id: AtomicU64::new(1),
        });
        (state, events_rx)
    }

    pub fn register_client(&self) -> (ClientId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: ClientId) {
        self.clients.remove(&id);
        if let Some(transition) = self.master.release(id) {
            self.broadcast(ServerMessage::MasterChanged {
                master: transition.new_master,
            });
        }
    }

    /// Send a control message to every connected client, dropping it for
    /// any client whose queue is gone (disconnected but not yet reaped).
    pub fn broadcast(&self, message: ServerMessage) {
        self.clients.retain(|_, tx| tx.send(message.clone()).is_ok());
    }
}

/// Forward `PaneEvent`s emitted by PTY reader threads into `bell`/`title`
/// control messages on every connected client (§6). Runs for the lifetime
/// of the daemon; ends when every `Session` holding the paired sender is
/// dropped.
pub async fn broadcast_pane_events(
    state: Arc<AppState>,
    mut events: mpsc::UnboundedReceiver<PaneEvent>,
) {
    while let Some(event) = events.recv().await {
        let message = match event {
            PaneEvent::TitleChanged { pane_id, title } => ServerMessage::Title { pane_id, title },
            PaneEvent::Bell { pane_id } => ServerMessage::Bell { pane_id },
        };
        state.broadcast(message);
    }
}
