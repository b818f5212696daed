//! Domain error types. Internal APIs return these instead of `Box<dyn Error>`
//! so callers can match on failure kind (§7 taxonomy: pane-fatal vs.
//! protocol vs. transient).

use thiserror::Error;

/// Errors raised by operations on a [`crate::pane::Pane`].
#[derive(Debug, Error)]
pub enum PaneError {
    #[error("pane {0} has already terminated")]
    Terminated(u64),

    #[error("failed to spawn pty: {0}")]
    PtySpawn(#[from] std::io::Error),

    #[error("emulator internal error: {0}")]
    Emulator(String),

    #[error("resize rejected: cols/rows must be nonzero")]
    InvalidSize,
}

/// Errors raised while encoding a snapshot or delta (§4.4).
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("pane is terminated, cannot encode")]
    PaneTerminated,

    #[error("serialization failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or unexpected client input (§7, "Protocol error" — logged and
/// discarded, never a reason to drop the connection by itself).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    MalformedJson(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("message references unknown pane {0}")]
    UnknownPane(u64),

    #[error("message exceeds size limit ({0} bytes)")]
    Oversized(usize),
}
