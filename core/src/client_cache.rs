//! Reference implementation of the client-side row/style cache (§4.6).
//! The real client lives in the browser; this is a Rust twin used so the
//! delta protocol's correctness — cache hits, cache misses, and resync
//! convergence — is testable without a browser in the loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::sync_encoder::{MSG_DELTA, MSG_SNAPSHOT};
use crate::wire::{self, RowId, Style};

#[derive(Debug, Clone)]
struct CachedRow {
    cells: Vec<u64>,
}

pub struct ClientCache {
    rows: HashMap<RowId, CachedRow>,
    styles: HashMap<u16, Style>,
    last_generation: Option<u64>,
    cols: u16,
    last_resync_at: Option<Instant>,
    resync_throttle: Duration,
}

/// What applying an incoming message told the client to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The delta's `from_generation` didn't match our `last_generation`, or
    /// it referenced a row/style we don't have cached. The caller should
    /// send a `resync` request, subject to throttling.
    NeedsResync,
    /// A resync was already requested too recently; caller should wait.
    ResyncThrottled,
}

impl ClientCache {
    pub fn new(resync_throttle: Duration) -> Self {
        Self {
            rows: HashMap::new(),
            styles: HashMap::new(),
            last_generation: None,
            cols: 0,
            last_resync_at: None,
            resync_throttle,
        }
    }

    pub fn last_generation(&self) -> Option<u64> {
        self.last_generation
    }

    pub fn row(&self, id: RowId) -> Option<&[u64]> {
        self.rows.get(&id).map(|r| r.cells.as_slice())
    }

    pub fn style(&self, id: u16) -> Option<Style> {
        if id == Style::DEFAULT_ID {
            Some(Style::default())
        } else {
            self.styles.get(&id).copied()
        }
    }

    /// Apply a raw wire message (snapshot or delta) to the cache.
    pub fn apply(&mut self, message: &[u8], now: Instant) -> ApplyOutcome {
        match message.first() {
            Some(&MSG_SNAPSHOT) => self.apply_snapshot(message),
            Some(&MSG_DELTA) => self.apply_delta(message, now),
            _ => ApplyOutcome::NeedsResync,
        }
    }

    fn apply_snapshot(&mut self, message: &[u8]) -> ApplyOutcome {
        let mut offset = 1 + 8; // type + pane_id
        let Some(generation) = read_u64(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 8;
        let Some(row_count) = read_u16(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 2;
        let Some(cols) = read_u16(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 2;
        offset += 2 + 2 + 1 + 1; // cursor_x, cursor_y, cursor_visible, alt_screen

        let Some((row_ids, consumed)) = wire::decode_row_ids(&message[offset..], row_count as usize)
        else {
            return ApplyOutcome::NeedsResync;
        };
        offset += consumed;

        let cell_count = row_count as usize * cols as usize;
        let needed = cell_count * 8;
        if message.len() < offset + needed {
            return ApplyOutcome::NeedsResync;
        }
        let mut all_cells = Vec::with_capacity(cell_count);
        for i in 0..cell_count {
            let chunk = &message[offset + i * 8..offset + i * 8 + 8];
            all_cells.push(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
        offset += needed;

        let Some((styles, consumed)) = wire::decode_style_subtable(&message[offset..]) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += consumed;

        self.rows.clear();
        self.styles.clear();
        for (id, style) in styles {
            self.styles.insert(id, style);
        }
        for (row_idx, &row_id) in row_ids.iter().enumerate() {
            let cells = all_cells[row_idx * cols as usize..(row_idx + 1) * cols as usize].to_vec();
            self.rows.insert(row_id, CachedRow { cells });
        }
        self.cols = cols;
        self.last_generation = Some(generation);
        let _ = offset;
        ApplyOutcome::Applied
    }

    fn apply_delta(&mut self, message: &[u8], now: Instant) -> ApplyOutcome {
        let mut offset = 1 + 8;
        let Some(from_generation) = read_u64(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 8;
        let Some(to_generation) = read_u64(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 8;

        if self.last_generation != Some(from_generation) {
            return self.resync_or_throttle(now);
        }

        let Some(dirty_count) = read_u16(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 2;
        let Some(cols) = read_u16(message, offset) else {
            return ApplyOutcome::NeedsResync;
        };
        offset += 2;

        let mut new_rows = Vec::with_capacity(dirty_count as usize);
        for _ in 0..dirty_count {
            if message.len() < offset + 8 {
                return ApplyOutcome::NeedsResync;
            }
            let row_id = u64::from_le_bytes(message[offset..offset + 8].try_into().unwrap());
            offset += 8;
            let needed = cols as usize * 8;
            if message.len() < offset + needed {
                return ApplyOutcome::NeedsResync;
            }
            let mut cells = Vec::with_capacity(cols as usize);
            for i in 0..cols as usize {
                let chunk = &message[offset + i * 8..offset + i * 8 + 8];
                cells.push(u64::from_le_bytes(chunk.try_into().unwrap()));
            }
            offset += needed;
            new_rows.push((row_id, cells));
        }

        let Some((styles, _consumed)) = wire::decode_style_subtable(&message[offset..]) else {
            return ApplyOutcome::NeedsResync;
        };
        for (id, style) in styles {
            self.styles.insert(id, style);
        }

        for (row_id, cells) in new_rows {
            self.rows.insert(row_id, CachedRow { cells });
        }
        self.cols = cols;
        self.last_generation = Some(to_generation);
        ApplyOutcome::Applied
    }

    fn resync_or_throttle(&mut self, now: Instant) -> ApplyOutcome {
        if let Some(last) = self.last_resync_at {
            if now.duration_since(last) < self.resync_throttle {
                return ApplyOutcome::ResyncThrottled;
            }
        }
        self.last_resync_at = Some(now);
        ApplyOutcome::NeedsResync
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    bytes
        .get(offset..offset + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|s| u16::from_le_bytes(s.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pane::Pane;
    use crate::sync_encoder::{encode_delta, encode_snapshot};
    use crate::config::Config;

    #[test]
    fn snapshot_then_matching_delta_applies_cleanly() {
        let pane = Pane::new(1, 4, 10, 50);
        let snapshot = encode_snapshot(&pane).unwrap();
        let mut cache = ClientCache::new(Duration::from_millis(1000));
        assert_eq!(cache.apply(&snapshot, Instant::now()), ApplyOutcome::Applied);

        let from_gen = pane.generation();
        pane.feed(b"hi").unwrap();
        let config = Config::default();
        let delta = encode_delta(&pane, from_gen, &config).unwrap().unwrap();
        assert_eq!(cache.apply(&delta, Instant::now()), ApplyOutcome::Applied);
        assert_eq!(cache.last_generation(), Some(pane.generation()));
    }

    #[test]
    fn delta_with_stale_from_generation_triggers_resync() {
        let pane = Pane::new(1, 4, 10, 50);
        let snapshot = encode_snapshot(&pane).unwrap();
        let mut cache = ClientCache::new(Duration::from_millis(1000));
        cache.apply(&snapshot, Instant::now());

        pane.feed(b"a").unwrap();
        let config = Config::default();
        pane.feed(b"b").unwrap();
        let delta = encode_delta(&pane, pane.generation() - 1, &config)
            .unwrap()
            .unwrap();
        // Cache's last_generation is the post-snapshot one, several
        // generations behind `from_generation` embedded in this delta.
        assert_eq!(
            cache.apply(&delta, Instant::now()),
            ApplyOutcome::NeedsResync
        );
    }

    #[test]
    fn repeated_resync_within_throttle_window_is_suppressed() {
        let pane = Pane::new(1, 4, 10, 50);
        let snapshot = encode_snapshot(&pane).unwrap();
        let mut cache = ClientCache::new(Duration::from_secs(10));
        cache.apply(&snapshot, Instant::now());

        pane.feed(b"a").unwrap();
        pane.feed(b"b").unwrap();
        let config = Config::default();
        let delta = encode_delta(&pane, pane.generation() - 1, &config)
            .unwrap()
            .unwrap();
        let now = Instant::now();
        assert_eq!(cache.apply(&delta, now), ApplyOutcome::NeedsResync);
        assert_eq!(cache.apply(&delta, now), ApplyOutcome::ResyncThrottled);
    }
}
