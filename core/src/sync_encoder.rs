//! Pure encode functions turning pane state into the wire messages
//! described in §4.4/§6: a full `snapshot` (type 0x01) or an incremental
//! `delta` (type 0x02). Both are plain functions over `&Pane` rather than
//! methods on it, so they can be unit-tested without a running server and
//! so locking stays contained to a single `with_locked` call per message.

use crate::config::Config;
use crate::pane::Pane;
use crate::wire::{self, RowId, Style};

pub const MSG_SNAPSHOT: u8 = 0x01;
pub const MSG_DELTA: u8 = 0x02;

fn write_title(out: &mut Vec<u8>, title: &str) {
    let bytes = title.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&bytes[..len as usize]);
}

/// Encode a full snapshot of `pane`'s current viewport (§4.4).
pub fn encode_snapshot(pane: &Pane) -> Result<Vec<u8>, crate::error::EncodeError> {
    pane.with_locked(|emulator, dirty_rows, force_snapshot| {
        let row_ids = emulator.viewport_row_ids();
        let cells = emulator.viewport_cells();
        let (cursor_x, cursor_y, cursor_visible) = emulator.cursor();
        let title = emulator.title().to_string();
        let alt_screen = emulator.alt_screen();

        let mut referenced: Vec<u16> = cells
            .iter()
            .map(|&c| wire::unpack_cell(c).style_id)
            .filter(|&id| id != Style::DEFAULT_ID)
            .collect();
        referenced.sort_unstable();
        referenced.dedup();
        let style_entries: Vec<(u16, Style)> = referenced
            .into_iter()
            .filter_map(|id| emulator.dump_style(id).map(|s| (id, s)))
            .collect();

        let mut out = Vec::with_capacity(64 + row_ids.len() * 8 + cells.len() * 8);
        out.push(MSG_SNAPSHOT);
        out.extend_from_slice(&pane.id.to_le_bytes());
        out.extend_from_slice(&pane.generation().to_le_bytes());
        out.extend_from_slice(&(row_ids.len() as u16).to_le_bytes());
        out.extend_from_slice(&((cells.len() / row_ids.len().max(1)) as u16).to_le_bytes());
        out.extend_from_slice(&cursor_x.to_le_bytes());
        out.extend_from_slice(&cursor_y.to_le_bytes());
        out.push(cursor_visible as u8);
        out.push(alt_screen as u8);
        out.extend_from_slice(&wire::encode_row_ids(&row_ids));
        for cell in &cells {
            out.extend_from_slice(&cell.to_le_bytes());
        }
        out.extend_from_slice(&wire::encode_style_subtable(&style_entries));
        out.extend_from_slice(&wire::encode_empty_grapheme_table());
        out.extend_from_slice(&wire::encode_empty_hyperlink_table());
        write_title(&mut out, &title);

        dirty_rows.clear();
        *force_snapshot = false;
        out
    })
    .map_err(|_| crate::error::EncodeError::PaneTerminated)
}

/// Encode an incremental delta covering only dirty rows, or `None` if the
/// dirty set is large enough relative to the viewport that a snapshot is
/// cheaper (§4.4's size-threshold fallback).
pub fn encode_delta(
    pane: &Pane,
    from_generation: u64,
    config: &Config,
) -> Result<Option<Vec<u8>>, crate::error::EncodeError> {
    pane.with_locked(|emulator, dirty_rows, force_snapshot| {
        if *force_snapshot {
            return None;
        }
        let viewport_rows = emulator.generation_capacity_rows();
        if dirty_rows.is_empty() {
            return None;
        }
        let ratio = dirty_rows.len() as f64 / viewport_rows.max(1) as f64;
        if ratio > config.delta_size_threshold_ratio {
            return None;
        }

        let row_ids = emulator.viewport_row_ids();
        let cells = emulator.viewport_cells();
        let cols = cells.len() / row_ids.len().max(1);

        let mut dirty_sorted: Vec<RowId> = dirty_rows.iter().copied().collect();
        dirty_sorted.sort_unstable();

        let mut referenced = Vec::new();
        let mut body = Vec::new();
        for &row_id in &dirty_sorted {
            let Some(pos) = row_ids.iter().position(|&id| id == row_id) else {
                continue;
            };
            body.extend_from_slice(&row_id.to_le_bytes());
            for cell in &cells[pos * cols..(pos + 1) * cols] {
                body.extend_from_slice(&cell.to_le_bytes());
                let style_id = wire::unpack_cell(*cell).style_id;
                if style_id != Style::DEFAULT_ID {
                    referenced.push(style_id);
                }
            }
        }
        referenced.sort_unstable();
        referenced.dedup();
        let style_entries: Vec<(u16, Style)> = referenced
            .into_iter()
            .filter_map(|id| emulator.dump_style(id).map(|s| (id, s)))
            .collect();

        let title = emulator.title().to_string();

        let mut out = Vec::with_capacity(32 + body.len());
        out.push(MSG_DELTA);
        out.extend_from_slice(&pane.id.to_le_bytes());
        out.extend_from_slice(&from_generation.to_le_bytes());
        out.extend_from_slice(&pane.generation().to_le_bytes());
        out.extend_from_slice(&(dirty_sorted.len() as u16).to_le_bytes());
        out.extend_from_slice(&(cols as u16).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&wire::encode_style_subtable(&style_entries));
        out.extend_from_slice(&wire::encode_empty_grapheme_table());
        out.extend_from_slice(&wire::encode_empty_hyperlink_table());
        out.push(1);
        write_title(&mut out, &title);

        dirty_rows.clear();
        Some(out)
    })
    .map_err(|_| crate::error::EncodeError::PaneTerminated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_with_type_byte_and_pane_id() {
        let pane = Pane::new(42, 4, 10, 50);
        let bytes = encode_snapshot(&pane).unwrap();
        assert_eq!(bytes[0], MSG_SNAPSHOT);
        assert_eq!(&bytes[1..9], &42u64.to_le_bytes());
    }

    #[test]
    fn delta_after_snapshot_with_small_edit_is_some() {
        let pane = Pane::new(1, 4, 10, 50);
        encode_snapshot(&pane).unwrap();
        let from_gen = pane.generation();
        pane.feed(b"hi").unwrap();
        let config = Config::default();
        let delta = encode_delta(&pane, from_gen, &config).unwrap();
        assert!(delta.is_some());
        assert_eq!(delta.unwrap()[0], MSG_DELTA);
    }

    #[test]
    fn delta_with_no_dirty_rows_is_none() {
        let pane = Pane::new(1, 4, 10, 50);
        encode_snapshot(&pane).unwrap();
        let config = Config::default();
        let delta = encode_delta(&pane, pane.generation(), &config).unwrap();
        assert!(delta.is_none());
    }

    #[test]
    fn oversized_dirty_set_forces_snapshot_instead_of_delta() {
        let pane = Pane::new(1, 4, 10, 50);
        encode_snapshot(&pane).unwrap();
        let from_gen = pane.generation();
        // Distinct content per line: repeating bytes would let successive
        // scrolls hash-collide with their own prior state and be silently
        // treated as "nothing changed", masking the oversized dirty set
        // this test means to exercise.
        for i in 0..10 {
            pane.feed(format!("line{i}\r\n").as_bytes()).unwrap();
        }
        let config = Config::default();
        let delta = encode_delta(&pane, from_gen, &config).unwrap();
        assert!(delta.is_none());
    }
}
