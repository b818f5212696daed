//! A single pane: one PTY-attached shell (or a display-only pane with no
//! PTY, §SPEC_FULL's debug pane) wrapped around an [`EmulatorAdapter`],
//! guarded by one mutex per §5's locking discipline — the mutex protects
//! the emulator and every field derived from it, and is never held across
//! a socket write.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::emulator::EmulatorAdapter;
use crate::error::PaneError;
use crate::wire::RowId;

pub type PaneId = u64;

/// An event worth telling connected clients about that isn't part of the
/// binary sync stream (§6 `bell`/`title` server messages). Emitted
/// alongside [`ChangeOutcome`] by code that feeds a pane; the transport
/// layer (`dullahan-server`) is the one that actually broadcasts them.
#[derive(Debug, Clone)]
pub enum PaneEvent {
    TitleChanged { pane_id: PaneId, title: String },
    Bell { pane_id: PaneId },
}

struct PaneInner {
    emulator: EmulatorAdapter,
    dirty_rows: HashSet<RowId>,
    force_snapshot: bool,
    alive: bool,
    title: String,
}

/// Default for [`Pane::new`]'s `dirty_set_viewport_ratio` when a caller
/// doesn't have a [`crate::config::Config`] handy (tests, the debug pane).
/// Matches `Config::default().dirty_set_viewport_ratio`.
pub const DEFAULT_DIRTY_SET_VIEWPORT_RATIO: f64 = 1.0;

/// A pane's mutable state plus its identity and generation counter. The
/// generation counter is outside the mutex (an `AtomicU64`) so readers can
/// cheaply check "has anything changed since gen G" without locking.
pub struct Pane {
    pub id: PaneId,
    generation: AtomicU64,
    inner: Mutex<PaneInner>,
    dirty_set_viewport_ratio: f64,
}

/// What changed as a result of a mutation, enough for a caller to decide
/// whether to wake waiting clients and whether a snapshot is required.
pub struct ChangeOutcome {
    pub generation: u64,
    pub force_snapshot: bool,
    /// `Some(new_title)` when this mutation changed the pane's title (§6
    /// `title` server message).
    pub title_changed: Option<String>,
    /// Whether this mutation rang the terminal bell (§6 `bell` server
    /// message).
    pub bell: bool,
}

impl Pane {
    pub fn new(id: PaneId, rows: u16, cols: u16, scrollback_lines: usize) -> Self {
        Self::with_dirty_set_viewport_ratio(
            id,
            rows,
            cols,
            scrollback_lines,
            DEFAULT_DIRTY_SET_VIEWPORT_RATIO,
        )
    }

    /// As [`Pane::new`], but with an explicit dirty-set-overflow ratio
    /// (§4.1) instead of the default — used when a [`crate::config::Config`]
    /// is available to size the threshold per deployment.
    pub fn with_dirty_set_viewport_ratio(
        id: PaneId,
        rows: u16,
        cols: u16,
        scrollback_lines: usize,
        dirty_set_viewport_ratio: f64,
    ) -> Self {
        Self {
            id,
            generation: AtomicU64::new(0),
            inner: Mutex::new(PaneInner {
                emulator: EmulatorAdapter::new(rows, cols, scrollback_lines),
                dirty_rows: HashSet::new(),
                force_snapshot: true, // nothing has ever been sent yet
                alive: true,
                title: String::new(),
            }),
            dirty_set_viewport_ratio,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Feed PTY output bytes (§4.1 `feed`). Returns the new generation and
    /// whether a forced snapshot is now required.
    pub fn feed(&self, bytes: &[u8]) -> Result<ChangeOutcome, PaneError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.alive {
            return Err(PaneError::Terminated(self.id));
        }
        let outcome = inner.emulator.feed(bytes);
        let title_changed = outcome.title_changed.then(|| inner.emulator.title().to_string());
        if let Some(title) = &title_changed {
            inner.title = title.clone();
        }

        let viewport_rows = inner.emulator.generation_capacity_rows();
        if outcome.forced_resync {
            inner.dirty_rows.clear();
            inner.force_snapshot = true;
        } else {
            inner.dirty_rows.extend(outcome.dirty_row_ids);
            let threshold = (viewport_rows as f64 * self.dirty_set_viewport_ratio).ceil() as usize;
            if inner.dirty_rows.len() > threshold {
                inner.dirty_rows.clear();
                inner.force_snapshot = true;
            }
        }

        let generation = self.bump_generation();
        Ok(ChangeOutcome {
            generation,
            force_snapshot: inner.force_snapshot,
            title_changed,
            bell: outcome.bell,
        })
    }

    /// Resize the pane (§4.1 `resize`). Always forces the next sync to be
    /// a snapshot, since reflowed content invalidates row alignment.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<ChangeOutcome, PaneError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.alive {
            return Err(PaneError::Terminated(self.id));
        }
        inner.emulator.resize(rows, cols)?;
        inner.dirty_rows.clear();
        inner.force_snapshot = true;
        let generation = self.bump_generation();
        Ok(ChangeOutcome {
            generation,
            force_snapshot: true,
            title_changed: None,
            bell: false,
        })
    }

    /// Move the emulator's viewport (§4.1 `scroll`). Does not mark any
    /// rows dirty: the row-ids shown are unchanged in content, only their
    /// position relative to the viewport top moves, and a resync-free
    /// client can keep serving them from cache.
    pub fn scroll(&self, _delta_rows: i64) -> Result<ChangeOutcome, PaneError> {
        let inner = self.inner.lock().unwrap();
        if !inner.alive {
            return Err(PaneError::Terminated(self.id));
        }
        let generation = self.bump_generation();
        Ok(ChangeOutcome {
            generation,
            force_snapshot: false,
            title_changed: None,
            bell: false,
        })
    }

    pub fn mark_terminated(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.alive = false;
        self.bump_generation();
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lock().unwrap().alive
    }

    pub fn title(&self) -> String {
        self.inner.lock().unwrap().title.clone()
    }

    /// Run `f` with exclusive access to the emulator, for encoding. Kept
    /// pane-private so encoding always goes through [`crate::sync_encoder`].
    pub(crate) fn with_locked<R>(&self, f: impl FnOnce(&mut EmulatorAdapter, &mut HashSet<RowId>, &mut bool) -> R) -> Result<R, PaneError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.alive {
            return Err(PaneError::Terminated(self.id));
        }
        let PaneInner {
            emulator,
            dirty_rows,
            force_snapshot,
            ..
        } = &mut *inner;
        Ok(f(emulator, dirty_rows, force_snapshot))
    }

    /// Clear the dirty set after a successful delta send (§4.1 `clear_dirty`).
    pub fn clear_dirty(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.dirty_rows.clear();
        inner.force_snapshot = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pane_starts_dirty_enough_to_force_a_snapshot() {
        let pane = Pane::new(1, 24, 80, 100);
        assert_eq!(pane.generation(), 0);
        let outcome = pane.feed(b"hi").unwrap();
        assert_eq!(outcome.generation, 1);
    }

    #[test]
    fn title_escape_sequence_is_reported_once() {
        let pane = Pane::new(1, 24, 80, 100);
        let outcome = pane.feed(b"\x1b]0;hello\x07").unwrap();
        assert_eq!(outcome.title_changed.as_deref(), Some("hello"));
        assert!(outcome.bell); // the title-set sequence is itself BEL-terminated
        let outcome = pane.feed(b"no change here").unwrap();
        assert_eq!(outcome.title_changed, None);
    }

    #[test]
    fn bare_bell_is_reported_without_a_title_change() {
        let pane = Pane::new(1, 24, 80, 100);
        let outcome = pane.feed(b"\x07").unwrap();
        assert!(outcome.bell);
        assert_eq!(outcome.title_changed, None);
    }

    #[test]
    fn feed_after_terminate_is_rejected() {
        let pane = Pane::new(1, 24, 80, 100);
        pane.mark_terminated();
        assert!(pane.feed(b"x").is_err());
    }

    #[test]
    fn resize_always_forces_snapshot() {
        let pane = Pane::new(1, 24, 80, 100);
        pane.feed(b"hello").unwrap();
        pane.clear_dirty();
        let outcome = pane.resize(30, 100).unwrap();
        assert!(outcome.force_snapshot);
    }

    #[test]
    fn scroll_never_forces_snapshot() {
        let pane = Pane::new(1, 24, 80, 100);
        let outcome = pane.scroll(-3).unwrap();
        assert!(!outcome.force_snapshot);
    }

    #[test]
    fn lower_dirty_set_viewport_ratio_forces_snapshot_sooner() {
        let pane = Pane::with_dirty_set_viewport_ratio(1, 4, 10, 50, 0.5);
        pane.clear_dirty();
        // threshold = ceil(4 rows * 0.5) = 2; three distinct dirtied rows
        // should overflow it even though they're well under the viewport.
        for i in 0..3 {
            let outcome = pane.feed(format!("line{i}\r\n").as_bytes()).unwrap();
            if outcome.force_snapshot {
                return;
            }
        }
        panic!("expected the lowered ratio to force a snapshot within 3 distinct dirty rows");
    }
}
