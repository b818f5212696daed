//! Dullahan core: the pane model, row-id/generation scheme, and the
//! delta-vs-snapshot sync engine that replicates authoritative terminal
//! state from PTY-attached panes to attached WebSocket clients.
//!
//! This crate has no HTTP/WebSocket transport of its own (that lives in
//! `dullahan-server`); it owns everything below the wire: panes, the
//! notify pipe, the PTY reader, the sync encoder, the master arbiter, and
//! a reference implementation of the client-side row/style cache used to
//! make the delta protocol's correctness testable end to end in Rust.

pub mod client_cache;
pub mod config;
pub mod emulator;
pub mod error;
pub mod master;
pub mod notify_pipe;
pub mod pane;
pub mod pty;
pub mod session;
pub mod shutdown;
pub mod sync_encoder;
pub mod wire;

pub use error::{EncodeError, PaneError, ProtocolError};
