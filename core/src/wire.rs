//! Binary wire format shared by the encoder (server, §4.4) and the
//! reference client cache (§4.6): row-id arithmetic, the bit-packed
//! `Cell`, the `Style` table byte layout, and little-endian primitive
//! helpers. Kept dependency-free of `vt100` so it can be reused by both
//! sides without pulling the emulator into a pure-client build.

use std::collections::HashMap;

/// Stable, monotonic row identifier (§3: `page_serial * PAGE_CAPACITY + row_index`).
pub type RowId = u64;

/// Emulator pages are a virtual grouping of this many consecutive row-ids;
/// recycling a page only ever raises its serial, so ids are never reused.
pub const PAGE_CAPACITY: u64 = 1000;

pub fn page_serial(id: RowId) -> u64 {
    id / PAGE_CAPACITY
}

pub fn row_index_in_page(id: RowId) -> u64 {
    id % PAGE_CAPACITY
}

/// Tag describing what a cell's 24-bit `content` field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTag {
    Codepoint = 0,
    CodepointGrapheme = 1,
    BgPalette = 2,
    BgRgb = 3,
}

impl ContentTag {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ContentTag::Codepoint,
            1 => ContentTag::CodepointGrapheme,
            2 => ContentTag::BgPalette,
            _ => ContentTag::BgRgb,
        }
    }
}

/// Wide-character classification (§3 Cell, bits 42-43).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wide {
    Narrow = 0,
    WideLeading = 1,
    SpacerTail = 2,
    SpacerHead = 3,
}

impl Wide {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Wide::Narrow,
            1 => Wide::WideLeading,
            2 => Wide::SpacerTail,
            _ => Wide::SpacerHead,
        }
    }
}

/// Decoded view of a packed 8-byte cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellView {
    pub content_tag: ContentTag,
    pub content: u32,
    pub style_id: u16,
    pub wide: Wide,
    pub protected: bool,
    pub hyperlink_bound: bool,
}

impl Default for CellView {
    fn default() -> Self {
        Self {
            content_tag: ContentTag::Codepoint,
            content: 0,
            style_id: 0,
            wide: Wide::Narrow,
            protected: false,
            hyperlink_bound: false,
        }
    }
}

/// Pack a cell into its 8-byte wire representation (§3 Cell).
pub fn pack_cell(cell: &CellView) -> u64 {
    let mut bits: u64 = 0;
    bits |= (cell.content_tag as u64) & 0b11;
    bits |= ((cell.content as u64) & 0x00FF_FFFF) << 2;
    bits |= (cell.style_id as u64) << 26;
    bits |= ((cell.wide as u64) & 0b11) << 42;
    if cell.protected {
        bits |= 1 << 44;
    }
    if cell.hyperlink_bound {
        bits |= 1 << 45;
    }
    bits
}

/// Unpack an 8-byte wire cell.
pub fn unpack_cell(bits: u64) -> CellView {
    CellView {
        content_tag: ContentTag::from_bits((bits & 0b11) as u8),
        content: ((bits >> 2) & 0x00FF_FFFF) as u32,
        style_id: ((bits >> 26) & 0xFFFF) as u16,
        wide: Wide::from_bits(((bits >> 42) & 0b11) as u8),
        protected: (bits >> 44) & 1 != 0,
        hyperlink_bound: (bits >> 45) & 1 != 0,
    }
}

/// A terminal color: unset, a 256-color palette index, or true-color RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorSpec {
    #[default]
    None,
    Palette(u8),
    Rgb(u8, u8, u8),
}

impl ColorSpec {
    fn write(self, out: &mut Vec<u8>) {
        match self {
            ColorSpec::None => out.extend_from_slice(&[0, 0, 0, 0]),
            ColorSpec::Palette(idx) => out.extend_from_slice(&[1, idx, 0, 0]),
            ColorSpec::Rgb(r, g, b) => out.extend_from_slice(&[2, r, g, b]),
        }
    }

    fn read(bytes: &[u8]) -> Self {
        match bytes[0] {
            1 => ColorSpec::Palette(bytes[1]),
            2 => ColorSpec::Rgb(bytes[1], bytes[2], bytes[3]),
            _ => ColorSpec::None,
        }
    }
}

/// Attribute bit flags (§3 Style table attribute word).
pub mod attr {
    pub const BOLD: u16 = 1 << 0;
    pub const ITALIC: u16 = 1 << 1;
    pub const FAINT: u16 = 1 << 2;
    pub const BLINK: u16 = 1 << 3;
    pub const INVERSE: u16 = 1 << 4;
    pub const INVISIBLE: u16 = 1 << 5;
    pub const STRIKETHROUGH: u16 = 1 << 6;
    pub const OVERLINE: u16 = 1 << 7;
    /// 3-bit underline style occupies bits 8-10 (0 = none/single .. 4 = curly).
    pub const UNDERLINE_STYLE_SHIFT: u16 = 8;
    pub const UNDERLINE_STYLE_MASK: u16 = 0b111 << UNDERLINE_STYLE_SHIFT;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub fg: ColorSpec,
    pub bg: ColorSpec,
    pub underline_color: ColorSpec,
    pub attrs: u16,
}

impl Style {
    pub const DEFAULT_ID: u16 = 0;

    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }
}

/// Per-pane interner: style_id 0 is always the default and is never
/// transmitted (§3). Ids are stable for the pane's lifetime once assigned,
/// matching the client cache's "never evicts style_id 0" / persistent-id
/// assumption (§4.6).
#[derive(Debug, Default)]
pub struct StyleTable {
    ids: HashMap<Style, u16>,
    styles: Vec<Style>, // index i holds the style for id (i+1)
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a style, returning its stable id (0 for the default style).
    pub fn intern(&mut self, style: Style) -> u16 {
        if style.is_default() {
            return Style::DEFAULT_ID;
        }
        if let Some(&id) = self.ids.get(&style) {
            return id;
        }
        self.styles.push(style);
        let id = self.styles.len() as u16;
        self.ids.insert(style, id);
        id
    }

    pub fn get(&self, id: u16) -> Option<Style> {
        if id == Style::DEFAULT_ID {
            return Some(Style::default());
        }
        self.styles.get(id as usize - 1).copied()
    }
}

/// Write a sub-table containing exactly the given `(id, style)` pairs, in
/// the §6 byte layout: `u16 count`, then `count * (u16 id, color, color,
/// color, u16 flags)`.
pub fn encode_style_subtable(entries: &[(u16, Style)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + entries.len() * 14);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (id, style) in entries {
        out.extend_from_slice(&id.to_le_bytes());
        style.fg.write(&mut out);
        style.bg.write(&mut out);
        style.underline_color.write(&mut out);
        out.extend_from_slice(&style.attrs.to_le_bytes());
    }
    out
}

/// Decode a style sub-table produced by [`encode_style_subtable`].
pub fn decode_style_subtable(bytes: &[u8]) -> Option<(Vec<(u16, Style)>, usize)> {
    if bytes.len() < 2 {
        return None;
    }
    let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let mut offset = 2;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if bytes.len() < offset + 14 {
            return None;
        }
        let id = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let fg = ColorSpec::read(&bytes[offset + 2..offset + 6]);
        let bg = ColorSpec::read(&bytes[offset + 6..offset + 10]);
        let underline_color = ColorSpec::read(&bytes[offset + 10..offset + 14]);
        offset += 14;
        if bytes.len() < offset + 2 {
            return None;
        }
        let attrs = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;
        out.push((
            id,
            Style {
                fg,
                bg,
                underline_color,
                attrs,
            },
        ));
    }
    Some((out, offset))
}

/// Row-id array: `u64` little-endian per row, in viewport order.
pub fn encode_row_ids(ids: &[RowId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

pub fn decode_row_ids(bytes: &[u8], count: usize) -> Option<(Vec<RowId>, usize)> {
    let needed = count * 8;
    if bytes.len() < needed {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let chunk = &bytes[i * 8..i * 8 + 8];
        out.push(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Some((out, needed))
}

/// Grapheme table: reserved by the wire format (§6) but always empty in
/// this adapter — the underlying `vt100` parser does not expose combining
/// sequences beyond a cell's base codepoint, so there is nothing to emit.
pub fn encode_empty_grapheme_table() -> Vec<u8> {
    0u32.to_le_bytes().to_vec()
}

/// Hyperlink table: reserved by the wire format (§6), always empty for the
/// same reason as the grapheme table (OSC 8 is not surfaced by `vt100`).
pub fn encode_empty_hyperlink_table() -> Vec<u8> {
    0u32.to_le_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_roundtrip() {
        let cell = CellView {
            content_tag: ContentTag::Codepoint,
            content: 0x41,
            style_id: 7,
            wide: Wide::Narrow,
            protected: false,
            hyperlink_bound: true,
        };
        let packed = pack_cell(&cell);
        assert_eq!(unpack_cell(packed), cell);
    }

    #[test]
    fn default_style_is_id_zero_and_never_interned() {
        let mut table = StyleTable::new();
        assert_eq!(table.intern(Style::default()), 0);
        assert_eq!(table.get(0), Some(Style::default()));
    }

    #[test]
    fn style_table_assigns_stable_ids() {
        let mut table = StyleTable::new();
        let bold = Style {
            attrs: attr::BOLD,
            ..Default::default()
        };
        let id1 = table.intern(bold);
        let id2 = table.intern(bold);
        assert_eq!(id1, id2);
        assert_ne!(id1, 0);
    }

    #[test]
    fn style_subtable_roundtrip() {
        let entries = vec![
            (
                1,
                Style {
                    fg: ColorSpec::Rgb(255, 0, 0),
                    bg: ColorSpec::Palette(4),
                    underline_color: ColorSpec::None,
                    attrs: attr::BOLD | attr::ITALIC,
                },
            ),
            (2, Style::default()),
        ];
        let bytes = encode_style_subtable(&entries);
        let (decoded, consumed) = decode_style_subtable(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, entries);
    }

    #[test]
    fn row_id_array_roundtrip() {
        let ids = vec![0u64, 1000, 2001, u64::MAX];
        let bytes = encode_row_ids(&ids);
        let (decoded, consumed) = decode_row_ids(&bytes, ids.len()).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, ids);
    }

    #[test]
    fn page_arithmetic() {
        assert_eq!(page_serial(0), 0);
        assert_eq!(page_serial(PAGE_CAPACITY), 1);
        assert_eq!(row_index_in_page(PAGE_CAPACITY + 5), 5);
    }
}
