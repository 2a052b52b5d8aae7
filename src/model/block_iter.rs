//! Position iterator over a [`BlockStore`].
//!
//! A [`BlockIter`] borrows the store it walks, so the borrow checker rules
//! out carrying one across a mutation. Anything that must survive an edit
//! (the buffer's cursor) is kept as a plain [`Position`] and repositioned by
//! the edit itself.

use super::block::BlockId;
use super::block_store::{BlockStore, Position};
use crate::primitives::utf8::{self, Decoded};

/// Scratch space that a line is materialized into.
///
/// Lines commonly cross block boundaries, so callers that need a contiguous
/// view copy the line here. The allocation is kept between calls.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    data: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently fetched line (without its `\n`)
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockIter<'a> {
    store: &'a BlockStore,
    blk: BlockId,
    offset: usize,
}

impl BlockStore {
    /// Iterator starting at `pos`
    pub fn iter_at(&self, pos: Position) -> BlockIter<'_> {
        let pos = self.normalize(pos);
        BlockIter {
            store: self,
            blk: pos.blk,
            offset: pos.offset,
        }
    }

    /// Iterator starting at an absolute byte offset (clamped to end of buffer)
    pub fn iter_at_offset(&self, offset: usize) -> BlockIter<'_> {
        self.iter_at(self.position_at(offset))
    }
}

impl<'a> BlockIter<'a> {
    pub fn position(&self) -> Position {
        Position {
            blk: self.blk,
            offset: self.offset,
        }
    }

    /// Absolute byte offset of the iterator
    pub fn offset(&self) -> usize {
        self.store.offset_of(self.position())
    }

    pub fn is_bof(&self) -> bool {
        self.offset == 0 && self.store.prev_block(self.blk).is_none()
    }

    pub fn is_eof(&self) -> bool {
        self.offset == self.store.block(self.blk).size()
            && self.store.next_block(self.blk).is_none()
    }

    /// Reposition to an absolute offset, scanning from the nearer end of the buffer
    pub fn goto_offset(&mut self, offset: usize) {
        let pos = self.store.position_at(offset);
        self.blk = pos.blk;
        self.offset = pos.offset;
    }

    /// Byte under the iterator, if not at end of buffer
    pub fn get_byte(&self) -> Option<u8> {
        self.store.block(self.blk).data().get(self.offset).copied()
    }

    /// Step over one byte, returning it. `None` at end of buffer (no movement).
    pub fn next_byte(&mut self) -> Option<u8> {
        let block = self.store.block(self.blk);
        let byte = *block.data().get(self.offset)?;
        self.offset += 1;
        if self.offset == block.size() {
            if let Some(next) = block.next {
                self.blk = next;
                self.offset = 0;
            }
        }
        Some(byte)
    }

    /// Step back over one byte, returning it. `None` at start of buffer (no movement).
    pub fn prev_byte(&mut self) -> Option<u8> {
        if self.offset == 0 {
            let prev = self.store.prev_block(self.blk)?;
            self.blk = prev;
            self.offset = self.store.block(prev).size();
        }
        self.offset -= 1;
        Some(self.store.block(self.blk).data()[self.offset])
    }

    /// Skip up to `count` bytes forward, returning how many were skipped
    pub fn skip_bytes(&mut self, count: usize) -> usize {
        let mut skipped = 0;
        while skipped < count {
            let block = self.store.block(self.blk);
            let avail = block.size() - self.offset;
            let step = avail.min(count - skipped);
            self.offset += step;
            skipped += step;
            if self.offset == block.size() {
                match block.next {
                    Some(next) => {
                        self.blk = next;
                        self.offset = 0;
                    }
                    None => break,
                }
            }
        }
        skipped
    }

    /// Step over one character (UTF-8 mode) or one byte (legacy mode)
    pub fn next_char(&mut self, utf8: bool) -> Option<Decoded> {
        if !utf8 {
            return self.next_byte().map(utf8::decode_byte);
        }
        let mut buf = [0u8; 4];
        let mut n = 0;
        let mut ahead = *self;
        while n < buf.len() {
            match ahead.next_byte() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                    if n == 1 && b < 0x80 {
                        break;
                    }
                }
                None => break,
            }
        }
        let (decoded, len) = utf8::decode_first(&buf[..n])?;
        self.skip_bytes(len);
        Some(decoded)
    }

    /// Step back over one character (UTF-8 mode) or one byte (legacy mode)
    pub fn prev_char(&mut self, utf8: bool) -> Option<Decoded> {
        if !utf8 {
            return self.prev_byte().map(utf8::decode_byte);
        }
        let mut buf = [0u8; 4];
        let mut n = 0;
        let mut behind = *self;
        while n < buf.len() {
            match behind.prev_byte() {
                Some(b) => {
                    n += 1;
                    buf[buf.len() - n] = b;
                    if !utf8::is_continuation(b) {
                        break;
                    }
                }
                None => break,
            }
        }
        let (decoded, len) = utf8::decode_last(&buf[buf.len() - n..])?;
        for _ in 0..len {
            self.prev_byte();
        }
        Some(decoded)
    }

    /// Move to the start of the current line, returning how many bytes were crossed
    pub fn bol(&mut self) -> usize {
        let mut moved = 0;
        loop {
            let before = *self;
            match self.prev_byte() {
                Some(b'\n') | None => {
                    *self = before;
                    return moved;
                }
                Some(_) => moved += 1,
            }
        }
    }

    /// Move to the end of the current line (onto its `\n`, or end of buffer)
    pub fn eol(&mut self) -> usize {
        let mut moved = 0;
        while let Some(b) = self.get_byte() {
            if b == b'\n' {
                break;
            }
            self.next_byte();
            moved += 1;
        }
        moved
    }

    /// Copy the bytes from the iterator up to the next `\n` (or end of buffer)
    /// into `line`, returning them as one contiguous slice.
    pub fn fetch_eol<'b>(&self, line: &'b mut LineBuffer) -> &'b [u8] {
        line.data.clear();
        let mut blk = Some(self.blk);
        let mut offset = self.offset;
        while let Some(id) = blk {
            let block = self.store.block(id);
            let src = &block.data()[offset..];
            if let Some(nl) = src.iter().position(|&b| b == b'\n') {
                line.data.extend_from_slice(&src[..nl]);
                break;
            }
            line.data.extend_from_slice(src);
            blk = block.next;
            offset = 0;
        }
        &line.data
    }

    /// Materialize the whole line the iterator is on, returning it together
    /// with the iterator's byte index inside it.
    pub fn fetch_this_line<'b>(&self, line: &'b mut LineBuffer) -> (&'b [u8], usize) {
        let mut start = *self;
        let cx = start.bol();
        (start.fetch_eol(line), cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(content: &[u8]) -> BlockStore {
        BlockStore::from_bytes(content, 4, 4)
    }

    #[test]
    fn test_bytes_cross_block_boundaries() {
        let store = store(b"abcdefghij");
        let mut it = store.iter_at(store.start());
        let mut forward = Vec::new();
        while let Some(b) = it.next_byte() {
            forward.push(b);
        }
        assert_eq!(forward, b"abcdefghij");
        assert!(it.is_eof());
        assert_eq!(it.next_byte(), None);

        let mut backward = Vec::new();
        while let Some(b) = it.prev_byte() {
            backward.push(b);
        }
        backward.reverse();
        assert_eq!(backward, b"abcdefghij");
        assert!(it.is_bof());
        assert_eq!(it.prev_byte(), None);
    }

    #[test]
    fn test_offset_and_goto() {
        let store = store(b"abcdefghij");
        let mut it = store.iter_at(store.start());
        it.goto_offset(6);
        assert_eq!(it.offset(), 6);
        assert_eq!(it.get_byte(), Some(b'g'));
        it.goto_offset(100);
        assert!(it.is_eof());
        assert_eq!(it.offset(), 10);
    }

    #[test]
    fn test_utf8_chars_spanning_blocks() {
        // "a世b" puts the three-byte sequence across the first block boundary
        let content = "aa世b🦀".as_bytes();
        let store = store(content);
        let mut it = store.iter_at(store.start());
        let mut chars = Vec::new();
        while let Some(d) = it.next_char(true) {
            chars.push(d);
        }
        assert_eq!(
            chars,
            vec![
                Decoded::Char('a'),
                Decoded::Char('a'),
                Decoded::Char('世'),
                Decoded::Char('b'),
                Decoded::Char('🦀'),
            ]
        );

        let mut back = Vec::new();
        while let Some(d) = it.prev_char(true) {
            back.push(d);
        }
        back.reverse();
        assert_eq!(back, chars);
    }

    #[test]
    fn test_legacy_mode_steps_bytes() {
        let store = store("é".as_bytes());
        let mut it = store.iter_at(store.start());
        assert_eq!(it.next_char(false), Some(Decoded::Byte(0xc3)));
        assert_eq!(it.next_char(false), Some(Decoded::Byte(0xa9)));
        assert_eq!(it.next_char(false), None);
    }

    #[test]
    fn test_invalid_utf8_is_one_byte() {
        let store = store(&[b'x', 0xff, b'y']);
        let mut it = store.iter_at(store.start());
        it.next_char(true);
        assert_eq!(it.next_char(true), Some(Decoded::Byte(0xff)));
        assert_eq!(it.next_char(true), Some(Decoded::Char('y')));
    }

    #[test]
    fn test_fetch_this_line_across_blocks() {
        let store = store(b"first\nsecond line\nthird");
        let it = store.iter_at_offset(10);
        let mut line = LineBuffer::new();
        let (bytes, cx) = it.fetch_this_line(&mut line);
        assert_eq!(bytes, b"second line");
        assert_eq!(cx, 4);

        let it = store.iter_at(store.end());
        let (bytes, cx) = it.fetch_this_line(&mut line);
        assert_eq!(bytes, b"third");
        assert_eq!(cx, 5);
    }

    #[test]
    fn test_bol_eol() {
        let store = store(b"one\ntwo\n");
        let mut it = store.iter_at_offset(5);
        assert_eq!(it.bol(), 1);
        assert_eq!(it.offset(), 4);
        assert_eq!(it.eol(), 3);
        assert_eq!(it.get_byte(), Some(b'\n'));
        assert_eq!(it.offset(), 7);
    }
}
