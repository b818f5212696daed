//! Global config singleton. Loads `dullahan.json` once; every caller
//! (daemon, IPC control socket, tests that opt in) gets the same instance.
//! Mirrors the teacher's `OnceLock`-backed, load-once-with-defaults shape.

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Tunable knobs for the sync engine. None of these are part of the wire
/// protocol; they only affect server-side thresholds and resource limits.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default WebSocket listen port (§6: "port default 7681").
    pub port: u16,
    /// Scratch buffer size for a single PTY read (§4.3: "bounded buffer, e.g. 64 KiB").
    pub pty_read_buffer_bytes: usize,
    /// Poll timeout for the PTY reader and client send loops (§4.3, §4.5).
    pub poll_timeout: std::time::Duration,
    /// Fraction of viewport rows above which the dirty set is abandoned and
    /// the pane forced into snapshot state (§4.1).
    pub dirty_set_viewport_ratio: f64,
    /// Fraction of viewport rows above which `encode_delta` declines and
    /// returns `None`, forcing a snapshot (§4.4, "e.g. 70%").
    pub delta_size_threshold_ratio: f64,
    /// Bound on a client's outgoing write queue before it is declared stuck
    /// and disconnected (§3, §5: "e.g. 8 MiB").
    pub client_write_queue_cap_bytes: usize,
    /// Minimum spacing between `resync` messages from the same client for
    /// the same pane (§4.6: "no more than one resync per pane per 1000 ms").
    pub resync_throttle: std::time::Duration,
    /// Debounce window for rapid `resize` requests from the master (§4.7).
    pub resize_debounce: std::time::Duration,
    /// Grace period between SIGTERM and SIGKILL when tearing down child
    /// shells on shutdown (§4.9).
    pub shutdown_grace_period: std::time::Duration,
    /// Capacity of each pane's circular scrollback in the emulator (lines).
    pub scrollback_lines: usize,
    /// Root directory holding `dullahan.json` and the IPC control socket.
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7681,
            pty_read_buffer_bytes: 64 * 1024,
            poll_timeout: std::time::Duration::from_secs(1),
            dirty_set_viewport_ratio: 1.0,
            delta_size_threshold_ratio: 0.70,
            client_write_queue_cap_bytes: 8 * 1024 * 1024,
            resync_throttle: std::time::Duration::from_millis(1000),
            resize_debounce: std::time::Duration::from_millis(100),
            shutdown_grace_period: std::time::Duration::from_secs(3),
            scrollback_lines: 10_000,
            state_dir: default_state_dir(),
        }
    }
}

/// Ensure config is loaded (idempotent). Loads `dullahan.json` from
/// `state_dir` on first call; returns the same instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    CONFIG.get_or_init(|| {
        let dir = default_state_dir();
        let path = dir.join("dullahan.json");
        load_settings_from(&path)
    })
}

/// Test/embedding hook: install a config explicitly before anything else
/// calls `ensure_loaded`. Returns `Err(Config)` (the rejected value) if
/// config was already initialized.
pub fn install(config: Config) -> Result<(), Config> {
    CONFIG.set(config)
}

fn load_settings_from(path: &std::path::Path) -> Config {
    let defaults = Config::default();
    let Ok(data) = std::fs::read_to_string(path) else {
        return defaults;
    };
    let Ok(root) = serde_json::from_str::<serde_json::Value>(&data) else {
        return defaults;
    };

    let port = root
        .get("port")
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(defaults.port);

    let pty_read_buffer_bytes = root
        .get("pty_read_buffer_bytes")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(defaults.pty_read_buffer_bytes);

    let delta_size_threshold_ratio = root
        .get("delta_size_threshold_ratio")
        .and_then(|v| v.as_f64())
        .unwrap_or(defaults.delta_size_threshold_ratio);

    let dirty_set_viewport_ratio = root
        .get("dirty_set_viewport_ratio")
        .and_then(|v| v.as_f64())
        .unwrap_or(defaults.dirty_set_viewport_ratio);

    let client_write_queue_cap_bytes = root
        .get("client_write_queue_cap_bytes")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(defaults.client_write_queue_cap_bytes);

    let scrollback_lines = root
        .get("scrollback_lines")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(defaults.scrollback_lines);

    Config {
        port,
        pty_read_buffer_bytes,
        delta_size_threshold_ratio,
        dirty_set_viewport_ratio,
        client_write_queue_cap_bytes,
        scrollback_lines,
        ..defaults
    }
}

fn default_state_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".dullahan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.port, 7681);
        assert!(c.delta_size_threshold_ratio > 0.0 && c.delta_size_threshold_ratio < 1.0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let c = load_settings_from(std::path::Path::new("/nonexistent/dullahan.json"));
        assert_eq!(c.port, Config::default().port);
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dullahan.json");
        std::fs::write(&path, r#"{"port": 9999}"#).unwrap();
        let c = load_settings_from(&path);
        assert_eq!(c.port, 9999);
        assert_eq!(c.scrollback_lines, Config::default().scrollback_lines);
    }
}
