//! Ordered list of blocks holding one buffer's full content.
//!
//! The list is an arena of [`Block`]s linked by `prev`/`next` indices.
//! Positions into the store are plain `(BlockId, offset)` pairs; they stay
//! meaningful only until the next structural mutation, except for the one
//! position a mutation hands back to its caller.
//!
//! Invariants, checked by [`BlockStore::validate`]:
//! - the list is never empty; an empty buffer is one zero-size block
//! - no block other than that lone block is empty
//! - every block's cached newline count is exact, and `newlines()` is their sum

use super::block::{
    alloc_round, count_newlines, Block, BlockId, DEFAULT_ALLOC_GRANULARITY, DEFAULT_BLOCK_SIZE,
};

/// A location inside a [`BlockStore`]: a block plus a byte offset into it.
///
/// Normalized positions only have `offset == block.size()` at end of buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub(crate) blk: BlockId,
    pub(crate) offset: usize,
}

impl Position {
    pub fn block(&self) -> BlockId {
        self.blk
    }

    /// Byte offset inside the block
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[derive(Debug, Clone)]
pub struct BlockStore {
    slots: Vec<Option<Block>>,
    free: Vec<usize>,
    head: BlockId,
    tail: BlockId,
    /// Sum of all blocks' newline counts
    nl: usize,
    /// Sum of all blocks' sizes
    len: usize,
    block_size: usize,
    granularity: usize,
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore {
    /// Create an empty store with the default block limits
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_BLOCK_SIZE, DEFAULT_ALLOC_GRANULARITY)
    }

    /// Create an empty store with a custom nominal block size and allocation granularity
    pub fn with_limits(block_size: usize, granularity: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        assert!(
            granularity.is_power_of_two(),
            "allocation granularity must be a power of two"
        );
        let first = Block::with_capacity(alloc_round(1, granularity));
        BlockStore {
            slots: vec![Some(first)],
            free: Vec::new(),
            head: BlockId(0),
            tail: BlockId(0),
            nl: 0,
            len: 0,
            block_size,
            granularity,
        }
    }

    /// Build a store from already-filled blocks, in order.
    ///
    /// Empty blocks are dropped; an empty list yields the single empty block.
    pub fn from_blocks(blocks: Vec<Block>, block_size: usize, granularity: usize) -> Self {
        let mut store = Self::with_limits(block_size, granularity);
        let mut blocks = blocks.into_iter().filter(|b| !b.is_empty());
        let Some(first) = blocks.next() else {
            return store;
        };
        store.nl = first.nl;
        store.len = first.size();
        store.slots[0] = Some(first);
        let mut after = store.head;
        for block in blocks {
            store.nl += block.nl;
            store.len += block.size();
            after = store.link_after(after, block);
        }
        store
    }

    /// Build a store from a contiguous byte slice, filling blocks up to the nominal size
    pub fn from_bytes(bytes: &[u8], block_size: usize, granularity: usize) -> Self {
        let blocks = bytes
            .chunks(block_size)
            .map(|chunk| Block::from_bytes(chunk, chunk.len()))
            .collect();
        Self::from_blocks(blocks, block_size, granularity)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn granularity(&self) -> usize {
        self.granularity
    }

    /// Total number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of `\n` bytes
    pub fn newlines(&self) -> usize {
        self.nl
    }

    /// Number of lines, counting a trailing partial line
    pub fn line_count(&self) -> usize {
        self.nl + 1
    }

    pub fn block_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn head(&self) -> BlockId {
        self.head
    }

    pub fn tail(&self) -> BlockId {
        self.tail
    }

    pub fn block(&self, id: BlockId) -> &Block {
        match self.slots.get(id.0) {
            Some(Some(block)) => block,
            _ => panic!("dangling block id {}", id.0),
        }
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        match self.slots.get_mut(id.0) {
            Some(Some(block)) => block,
            _ => panic!("dangling block id {}", id.0),
        }
    }

    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        self.block(id).next
    }

    pub fn prev_block(&self, id: BlockId) -> Option<BlockId> {
        self.block(id).prev
    }

    /// Iterate blocks in buffer order
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            store: self,
            next: Some(self.head),
        }
    }

    /// Copy of the whole content
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for block in self.blocks() {
            out.extend_from_slice(block.data());
        }
        out
    }

    /// Position of the first byte
    pub fn start(&self) -> Position {
        Position {
            blk: self.head,
            offset: 0,
        }
    }

    /// Position just past the last byte
    pub fn end(&self) -> Position {
        Position {
            blk: self.tail,
            offset: self.block(self.tail).size(),
        }
    }

    /// Move a position sitting at the end of a block onto the start of the next one
    pub fn normalize(&self, pos: Position) -> Position {
        let mut pos = pos;
        while pos.offset == self.block(pos.blk).size() {
            match self.block(pos.blk).next {
                Some(next) => {
                    pos = Position {
                        blk: next,
                        offset: 0,
                    }
                }
                None => break,
            }
        }
        pos
    }

    /// Find the position of an absolute byte offset, clamping to end of buffer.
    ///
    /// Scans block by block from whichever end of the list is nearer.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        if offset <= self.len / 2 {
            let mut blk = self.head;
            let mut remaining = offset;
            loop {
                let block = self.block(blk);
                match block.next {
                    Some(next) if remaining >= block.size() => {
                        remaining -= block.size();
                        blk = next;
                    }
                    _ => {
                        return Position {
                            blk,
                            offset: remaining.min(block.size()),
                        }
                    }
                }
            }
        } else {
            let mut blk = self.tail;
            let mut from_end = self.len - offset;
            loop {
                let block = self.block(blk);
                if from_end <= block.size() {
                    return self.normalize(Position {
                        blk,
                        offset: block.size() - from_end,
                    });
                }
                from_end -= block.size();
                match block.prev {
                    Some(prev) => blk = prev,
                    None => return self.start(),
                }
            }
        }
    }

    /// Absolute byte offset of a position: preceding block sizes plus the in-block offset
    pub fn offset_of(&self, pos: Position) -> usize {
        let mut offset = pos.offset;
        let mut blk = self.block(pos.blk).prev;
        while let Some(id) = blk {
            let block = self.block(id);
            offset += block.size();
            blk = block.prev;
        }
        offset
    }

    /// Zero-based line number of a position, using the cached per-block newline counts
    pub fn line_number(&self, pos: Position) -> usize {
        let mut line = 0;
        for (id, block) in self.blocks_with_ids() {
            if id == pos.blk {
                return line + count_newlines(&block.data()[..pos.offset]);
            }
            line += block.newlines();
        }
        panic!("position refers to a block outside this store");
    }

    /// Read up to `len` bytes starting at `pos`, crossing block boundaries.
    ///
    /// Returns fewer bytes only when the end of the buffer is reached.
    pub fn read(&self, pos: Position, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(self.len));
        let mut blk = Some(pos.blk);
        let mut offset = pos.offset;
        while out.len() < len {
            let Some(id) = blk else { break };
            let block = self.block(id);
            let avail = block.size() - offset;
            let take = avail.min(len - out.len());
            out.extend_from_slice(&block.data()[offset..offset + take]);
            blk = block.next;
            offset = 0;
        }
        out
    }

    /// Insert `bytes` at `pos`.
    ///
    /// Grows the block in place while it stays within the nominal block size,
    /// otherwise splits it at `pos` and places the new bytes in new blocks.
    /// Returns the (normalized) position of the first inserted byte.
    pub fn insert(&mut self, pos: Position, bytes: &[u8]) -> Position {
        if bytes.is_empty() {
            return self.normalize(pos);
        }
        let size = self.block(pos.blk).size();
        assert!(pos.offset <= size, "insert position past end of block");

        let start = if size + bytes.len() <= self.block_size {
            let granularity = self.granularity;
            self.block_mut(pos.blk)
                .insert_at(pos.offset, bytes, granularity);
            pos
        } else {
            self.split_insert(pos, bytes)
        };

        self.nl += count_newlines(bytes);
        self.len += bytes.len();
        self.normalize(start)
    }

    fn split_insert(&mut self, pos: Position, bytes: &[u8]) -> Position {
        let granularity = self.granularity;
        let tail = self.block_mut(pos.blk).split_off(pos.offset);

        let mut after = pos.blk;
        let start = if pos.offset + bytes.len() <= self.block_size {
            self.block_mut(pos.blk)
                .insert_at(pos.offset, bytes, granularity);
            pos
        } else {
            let mut first = None;
            for chunk in bytes.chunks(self.block_size) {
                let block = Block::from_bytes(chunk, alloc_round(chunk.len(), granularity));
                after = self.link_after(after, block);
                first.get_or_insert(after);
            }
            Position {
                blk: first.unwrap_or(pos.blk),
                offset: 0,
            }
        };

        if !tail.is_empty() {
            let block = Block::from_bytes(&tail, alloc_round(tail.len(), granularity));
            self.link_after(after, block);
        }

        // The split point may have been the very start of the block
        if self.block(pos.blk).is_empty() {
            self.unlink(pos.blk);
        }

        tracing::trace!(
            "split block at offset {}, now {} blocks",
            pos.offset,
            self.block_count()
        );
        start
    }

    /// Delete `len` bytes starting at `pos`.
    ///
    /// Emptied blocks are removed (except the last remaining one) and a small
    /// block left at the deletion point is merged with its neighbours.
    /// Returns the position where the deletion happened.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `len` bytes remain after `pos`.
    pub fn delete(&mut self, pos: Position, len: usize) -> Position {
        let at = self.offset_of(pos);
        assert!(
            len <= self.len - at,
            "delete of {} bytes at offset {} past end of buffer ({} bytes)",
            len,
            at,
            self.len
        );
        if len == 0 {
            return self.normalize(pos);
        }

        let mut blk = pos.blk;
        let mut offset = pos.offset;
        let mut remaining = len;
        loop {
            let size = self.block(blk).size();
            let take = remaining.min(size - offset);
            if take > 0 {
                let removed_nl = self.block_mut(blk).remove_range(offset, take);
                self.nl -= removed_nl;
                self.len -= take;
                remaining -= take;
            }
            let next = self.block(blk).next;
            if self.block(blk).is_empty() && self.block_count() > 1 {
                self.unlink(blk);
            }
            if remaining == 0 {
                break;
            }
            match next {
                Some(id) => {
                    blk = id;
                    offset = 0;
                }
                None => panic!("block list ended with {} bytes left to delete", remaining),
            }
        }

        let pos = self.position_at(at);
        self.merge_small(pos.blk);
        self.position_at(at)
    }

    /// Merge `blk` with its neighbours while the result stays at most half a block
    fn merge_small(&mut self, blk: BlockId) {
        let limit = self.block_size / 2;
        if let Some(next) = self.block(blk).next {
            if self.block(blk).size() + self.block(next).size() <= limit {
                let data = std::mem::take(&mut self.block_mut(next).data);
                let granularity = self.granularity;
                let end = self.block(blk).size();
                self.block_mut(blk).insert_at(end, &data, granularity);
                self.unlink(next);
            }
        }
        if let Some(prev) = self.block(blk).prev {
            if self.block(prev).size() + self.block(blk).size() <= limit {
                let data = std::mem::take(&mut self.block_mut(blk).data);
                let granularity = self.granularity;
                let end = self.block(prev).size();
                self.block_mut(prev).insert_at(end, &data, granularity);
                self.unlink(blk);
            }
        }
    }

    fn alloc_slot(&mut self, block: Block) -> BlockId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(block);
                BlockId(index)
            }
            None => {
                self.slots.push(Some(block));
                BlockId(self.slots.len() - 1)
            }
        }
    }

    /// Link a new block directly after `after`, returning its id
    fn link_after(&mut self, after: BlockId, mut block: Block) -> BlockId {
        let next = self.block(after).next;
        block.prev = Some(after);
        block.next = next;
        let id = self.alloc_slot(block);
        self.block_mut(after).next = Some(id);
        match next {
            Some(next) => self.block_mut(next).prev = Some(id),
            None => self.tail = id,
        }
        id
    }

    /// Unlink and free a block. The caller keeps the newline/size totals right.
    fn unlink(&mut self, id: BlockId) {
        assert!(self.block_count() > 1, "cannot remove the last block");
        let (prev, next) = {
            let block = self.block(id);
            (block.prev, block.next)
        };
        match prev {
            Some(prev) => self.block_mut(prev).next = next,
            None => {
                if let Some(next) = next {
                    self.head = next;
                }
            }
        }
        match next {
            Some(next) => self.block_mut(next).prev = prev,
            None => {
                if let Some(prev) = prev {
                    self.tail = prev;
                }
            }
        }
        self.slots[id.0] = None;
        self.free.push(id.0);
    }

    fn blocks_with_ids(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        let mut next = Some(self.head);
        std::iter::from_fn(move || {
            let id = next?;
            let block = self.block(id);
            next = block.next;
            Some((id, block))
        })
    }

    /// Check the structural invariants, describing the first violation found
    pub fn validate(&self) -> Result<(), String> {
        let mut nl = 0;
        let mut len = 0;
        let mut count = 0;
        let mut prev: Option<BlockId> = None;
        for (id, block) in self.blocks_with_ids() {
            if block.prev != prev {
                return Err(format!("block {} has a broken prev link", id.0));
            }
            if block.newlines() != count_newlines(block.data()) {
                return Err(format!(
                    "block {} caches {} newlines but holds {}",
                    id.0,
                    block.newlines(),
                    count_newlines(block.data())
                ));
            }
            if block.is_empty() && self.block_count() > 1 {
                return Err(format!("block {} is empty", id.0));
            }
            nl += block.newlines();
            len += block.size();
            count += 1;
            prev = Some(id);
        }
        if prev != Some(self.tail) {
            return Err("tail does not point at the last block".to_string());
        }
        if count != self.block_count() {
            return Err(format!(
                "{} blocks linked but {} allocated",
                count,
                self.block_count()
            ));
        }
        if nl != self.nl {
            return Err(format!("total newlines {} but blocks hold {}", self.nl, nl));
        }
        if len != self.len {
            return Err(format!("total size {} but blocks hold {}", self.len, len));
        }
        Ok(())
    }
}

/// Iterator over the blocks of a store in buffer order
#[derive(Debug)]
pub struct Blocks<'a> {
    store: &'a BlockStore,
    next: Option<BlockId>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let block = self.store.block(id);
        self.next = block.next;
        Some(block)
    }
}
