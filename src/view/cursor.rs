//! Cursor row and column as the screen sees them.
//!
//! The byte index of the cursor inside its line, the number of characters
//! before it, and its display column all differ once tabs, wide characters
//! or multi-byte sequences appear on the line.

use crate::model::block_iter::LineBuffer;
use crate::model::block_store::{BlockStore, Position};
use crate::primitives::display_width::{next_tab_stop, unit_width};
use crate::primitives::utf8::{self, Decoded};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorDisplay {
    /// Zero-based line number
    pub row: usize,
    /// Byte index of the cursor inside its line
    pub byte_col: usize,
    /// Characters before the cursor on its line
    pub char_col: usize,
    /// Display column, with tabs expanded
    pub display_col: usize,
}

impl CursorDisplay {
    pub fn compute(
        store: &BlockStore,
        pos: Position,
        tab_width: usize,
        utf8: bool,
        line: &mut LineBuffer,
    ) -> Self {
        let it = store.iter_at(pos);
        let (bytes, cx) = it.fetch_this_line(line);
        let (char_col, display_col) = columns(bytes, cx, tab_width, utf8);
        Self {
            row: store.line_number(store.normalize(pos)),
            byte_col: cx,
            char_col,
            display_col,
        }
    }
}

/// Character count and display column at byte index `cx` of `line`
pub fn columns(line: &[u8], cx: usize, tab_width: usize, utf8: bool) -> (usize, usize) {
    let end = cx.min(line.len());
    let mut idx = 0;
    let mut chars = 0;
    let mut width = 0;
    while idx < end {
        let (unit, len) = if utf8 {
            match utf8::decode_first(&line[idx..]) {
                Some(decoded) => decoded,
                None => break,
            }
        } else {
            (utf8::decode_byte(line[idx]), 1)
        };
        width = match unit {
            Decoded::Char('\t') => next_tab_stop(width, tab_width),
            unit => width + unit_width(unit, utf8),
        };
        chars += 1;
        idx += len;
    }
    (chars, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_plain_and_tabs() {
        assert_eq!(columns(b"hello", 3, 8, true), (3, 3));
        assert_eq!(columns(b"\tx", 1, 8, true), (1, 8));
        assert_eq!(columns(b"ab\tx", 3, 4, true), (3, 4));
        assert_eq!(columns(b"ab\tx", 4, 4, true), (4, 5));
    }

    #[test]
    fn test_columns_control_and_wide() {
        assert_eq!(columns(b"\x01a", 2, 8, true), (2, 3));
        let line = "世界x".as_bytes();
        assert_eq!(columns(line, 6, 8, true), (2, 4));
        assert_eq!(columns(line, 7, 8, true), (3, 5));
    }

    #[test]
    fn test_columns_invalid_and_legacy() {
        assert_eq!(columns(&[0xff, b'a'], 2, 8, true), (2, 5));
        let line = "é".as_bytes();
        assert_eq!(columns(line, 2, 8, true), (1, 1));
        assert_eq!(columns(line, 2, 8, false), (2, 2));
        // 0x85 is a C1 byte with no glyph in 8-bit charsets
        assert_eq!(columns(&[0xc3, 0x85], 2, 8, false), (2, 5));
    }

    #[test]
    fn test_compute_across_blocks() {
        let store = BlockStore::from_bytes(b"first\n\tsecond", 4, 4);
        let mut line = LineBuffer::new();
        let pos = store.position_at(9);
        let display = CursorDisplay::compute(&store, pos, 8, true, &mut line);
        assert_eq!(
            display,
            CursorDisplay {
                row: 1,
                byte_col: 3,
                char_col: 3,
                display_col: 10,
            }
        );
    }

    #[test]
    fn test_compute_at_end_of_buffer() {
        let store = BlockStore::from_bytes(b"ab\n", 4, 4);
        let mut line = LineBuffer::new();
        let display = CursorDisplay::compute(&store, store.end(), 8, true, &mut line);
        assert_eq!(display.row, 1);
        assert_eq!(display.display_col, 0);
    }
}
