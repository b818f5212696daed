//! `dullahand`: the Dullahan terminal-multiplexer daemon binary.

use clap::Parser;
use dullahan_core::config::{self, Config};
use dullahan_core::session::DEBUG_PANE_ID;
use dullahan_core::shutdown::ShutdownHandle;
use dullahan_server::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "dullahand", about = "Terminal multiplexer sync daemon")]
struct Args {
    /// WebSocket listen port (overrides dullahan.json).
    #[arg(long)]
    port: Option<u16>,

    /// State directory holding dullahan.json and the IPC control socket.
    #[arg(long)]
    state_dir: Option<std::path::PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut loaded = config::ensure_loaded().clone();
    if let Some(port) = args.port {
        loaded.port = port;
    }
    if let Some(dir) = args.state_dir {
        loaded.state_dir = dir;
    }
    let config: &'static Config = Box::leak(Box::new(loaded));

    let (state, pane_events) = AppState::new(config);
    let debug_pane = state
        .session
        .pane(DEBUG_PANE_ID)
        .expect("debug pane is always present");
    dullahan_server::logging::init(debug_pane, state.notify.clone());

    let shutdown = ShutdownHandle::new();
    let signal_handle = shutdown.clone();
    ctrlc_handler(move || signal_handle.request_shutdown())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dullahan_server::run(state, pane_events, shutdown))
}

/// Wire SIGINT/SIGTERM to `on_signal`. Kept as a thin wrapper so `main`
/// doesn't need to know whether we're on a platform with real signal
/// support (ctrlc covers SIGINT everywhere it runs, SIGTERM on unix).
fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) -> anyhow::Result<()> {
    ctrlc::set_handler(on_signal)?;
    Ok(())
}
