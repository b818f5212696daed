//! The pane/window registry (§SPEC_FULL Window model): a `Session` owns
//! every live [`Pane`], grouped into `Window`s. Mirrors the teacher's
//! `DashMap`-backed registry shape, generalized from "one entry per PTY
//! session" to "one entry per pane, grouped by window".

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::notify_pipe::NotifyPipe;
use crate::pane::{Pane, PaneEvent, PaneId};
use crate::pty::{self, PtyIo};

pub type WindowId = u64;

/// A window groups panes for layout purposes; the wire protocol's
/// `layout` message is derived from this (§SPEC_FULL Window model).
#[derive(Debug, Clone)]
pub struct Window {
    pub id: WindowId,
    pub title: String,
    pub active_pane_id: Option<PaneId>,
    pub pane_ids: Vec<PaneId>,
}

struct PaneEntry {
    pane: Arc<Pane>,
    /// `None` for display-only panes with no backing shell (the debug pane).
    io: Option<PtyIo>,
}

/// Registry id reserved for the always-present, display-only debug pane
/// that mirrors the daemon's own tracing output (§SPEC_FULL).
pub const DEBUG_PANE_ID: PaneId = 0;

pub struct Session {
    panes: DashMap<PaneId, PaneEntry>,
    windows: RwLock<Vec<Window>>,
    next_pane_id: AtomicU64,
    next_window_id: AtomicU64,
    notify: Arc<NotifyPipe>,
    scrollback_lines: usize,
    dirty_set_viewport_ratio: f64,
    events: UnboundedSender<PaneEvent>,
}

impl Session {
    pub fn new(notify: Arc<NotifyPipe>, scrollback_lines: usize) -> Arc<Self> {
        Self::with_dirty_set_viewport_ratio(
            notify,
            scrollback_lines,
            crate::pane::DEFAULT_DIRTY_SET_VIEWPORT_RATIO,
        )
    }

    /// As [`Session::with_events`], but with no one listening for
    /// bell/title events — used by callers (tests, the debug-pane-only
    /// path) that don't need to broadcast them anywhere.
    pub fn with_dirty_set_viewport_ratio(
        notify: Arc<NotifyPipe>,
        scrollback_lines: usize,
        dirty_set_viewport_ratio: f64,
    ) -> Arc<Self> {
        let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
        Self::with_events(notify, scrollback_lines, dirty_set_viewport_ratio, events)
    }

    /// Full constructor: `events` receives a [`PaneEvent`] for every bell
    /// rung and title changed across every pane, for a caller (the
    /// WebSocket transport) to turn into broadcast control messages.
    pub fn with_events(
        notify: Arc<NotifyPipe>,
        scrollback_lines: usize,
        dirty_set_viewport_ratio: f64,
        events: UnboundedSender<PaneEvent>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            panes: DashMap::new(),
            windows: RwLock::new(Vec::new()),
            next_pane_id: AtomicU64::new(1), // 0 is reserved for the debug pane
            next_window_id: AtomicU64::new(1),
            notify,
            scrollback_lines,
            dirty_set_viewport_ratio,
            events,
        });
        session.panes.insert(
            DEBUG_PANE_ID,
            PaneEntry {
                pane: Arc::new(Pane::with_dirty_set_viewport_ratio(
                    DEBUG_PANE_ID,
                    24,
                    80,
                    2_000,
                    dirty_set_viewport_ratio,
                )),
                io: None,
            },
        );
        session
    }

    /// Spawn a new PTY-backed pane and attach it to `window_id` (creating
    /// the window if it doesn't exist yet).
    pub fn new_pane(
        self: &Arc<Self>,
        window_id: Option<WindowId>,
        rows: u16,
        cols: u16,
        cwd: Option<PathBuf>,
    ) -> std::io::Result<PaneId> {
        let pane_id = self.next_pane_id.fetch_add(1, Ordering::SeqCst);
        let pane = Arc::new(Pane::with_dirty_set_viewport_ratio(
            pane_id,
            rows,
            cols,
            self.scrollback_lines,
            self.dirty_set_viewport_ratio,
        ));
        let io = pty::spawn_pty(
            pane.clone(),
            rows,
            cols,
            cwd.as_deref(),
            self.notify.clone(),
            self.events.clone(),
        )?;
        self.panes.insert(pane_id, PaneEntry { pane, io: Some(io) });

        let mut windows = self.windows.write().unwrap();
        match window_id.and_then(|id| windows.iter_mut().find(|w| w.id == id)) {
            Some(window) => {
                window.pane_ids.push(pane_id);
                window.active_pane_id.get_or_insert(pane_id);
            }
            None => {
                let id = self.next_window_id.fetch_add(1, Ordering::SeqCst);
                windows.push(Window {
                    id,
                    title: String::new(),
                    active_pane_id: Some(pane_id),
                    pane_ids: vec![pane_id],
                });
            }
        }
        Ok(pane_id)
    }

    pub fn pane(&self, id: PaneId) -> Option<Arc<Pane>> {
        self.panes.get(&id).map(|e| e.pane.clone())
    }

    pub fn write_input(&self, id: PaneId, bytes: &[u8]) -> std::io::Result<()> {
        match self.panes.get(&id) {
            Some(entry) => match &entry.io {
                Some(io) => io.write_input(bytes),
                None => Ok(()), // display-only pane: input is a no-op
            },
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "unknown pane",
            )),
        }
    }

    pub fn resize_pane(&self, id: PaneId, rows: u16, cols: u16) -> std::io::Result<()> {
        let entry = self
            .panes
            .get(&id)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unknown pane"))?;
        if let Some(io) = &entry.io {
            io.resize(rows, cols)?;
        }
        entry
            .pane
            .resize(rows, cols)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        self.notify.signal();
        Ok(())
    }

    pub fn close_pane(&self, id: PaneId) {
        if id == DEBUG_PANE_ID {
            return; // the debug pane is permanent
        }
        if let Some((_, entry)) = self.panes.remove(&id) {
            if let Some(io) = &entry.io {
                let _ = io.kill();
            }
            entry.pane.mark_terminated();
        }
        let mut windows = self.windows.write().unwrap();
        for window in windows.iter_mut() {
            window.pane_ids.retain(|&p| p != id);
            if window.active_pane_id == Some(id) {
                window.active_pane_id = window.pane_ids.first().copied();
            }
        }
        windows.retain(|w| !w.pane_ids.is_empty());
        self.notify.signal();
    }

    pub fn windows(&self) -> Vec<Window> {
        self.windows.read().unwrap().clone()
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.panes.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Session::new(Arc::new(NotifyPipe::new().unwrap()), 100)
    }

    #[test]
    fn new_session_has_only_the_debug_pane() {
        let session = session();
        assert_eq!(session.pane_ids(), vec![DEBUG_PANE_ID]);
    }

    #[test]
    fn new_pane_creates_a_window_and_registers_the_pane() {
        let session = session();
        let pane_id = session.new_pane(None, 24, 80, None).unwrap();
        assert!(session.pane(pane_id).is_some());
        let windows = session.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].pane_ids, vec![pane_id]);
        assert_eq!(windows[0].active_pane_id, Some(pane_id));
    }

    #[test]
    fn second_pane_in_same_window_does_not_steal_active() {
        let session = session();
        let first = session.new_pane(None, 24, 80, None).unwrap();
        let window_id = session.windows()[0].id;
        let second = session.new_pane(Some(window_id), 24, 80, None).unwrap();
        let windows = session.windows();
        assert_eq!(windows[0].pane_ids, vec![first, second]);
        assert_eq!(windows[0].active_pane_id, Some(first));
    }

    #[test]
    fn closing_the_active_pane_promotes_another() {
        let session = session();
        let first = session.new_pane(None, 24, 80, None).unwrap();
        let window_id = session.windows()[0].id;
        let second = session.new_pane(Some(window_id), 24, 80, None).unwrap();
        session.close_pane(first);
        let windows = session.windows();
        assert_eq!(windows[0].active_pane_id, Some(second));
    }

    #[test]
    fn closing_the_last_pane_removes_the_window() {
        let session = session();
        let pane_id = session.new_pane(None, 24, 80, None).unwrap();
        session.close_pane(pane_id);
        assert!(session.windows().is_empty());
        assert!(session.pane(pane_id).is_none());
    }

    #[test]
    fn debug_pane_cannot_be_closed() {
        let session = session();
        session.close_pane(DEBUG_PANE_ID);
        assert!(session.pane(DEBUG_PANE_ID).is_some());
    }
}
