//! Fixed-capacity byte segment with a cached newline count.
//!
//! A [`Block`] is the unit of storage in a [`BlockStore`](super::block_store::BlockStore).
//! Blocks are linked through `prev`/`next` indices into the store's arena
//! instead of owning pointers, so splicing a block in or out never needs
//! to touch more than its two neighbours.

/// Nominal capacity of a block filled at load time (16 KB)
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Granularity that block allocations are rounded up to (64 bytes)
pub const DEFAULT_ALLOC_GRANULARITY: usize = 64;

/// Index of a block inside a store's arena.
///
/// Ids are stable for the lifetime of the block: splitting or merging
/// other blocks never renumbers an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

/// Round `size` up to the next multiple of `granularity`.
///
/// `granularity` must be a power of two.
pub fn alloc_round(size: usize, granularity: usize) -> usize {
    debug_assert!(granularity.is_power_of_two());
    (size + granularity - 1) & !(granularity - 1)
}

/// Count `\n` bytes in a slice
pub fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

#[derive(Debug, Clone)]
pub struct Block {
    /// Payload; `data.len()` is the used size, `data.capacity()` the allocation
    pub(crate) data: Vec<u8>,
    /// Number of `\n` bytes in `data`
    pub(crate) nl: usize,
    pub(crate) prev: Option<BlockId>,
    pub(crate) next: Option<BlockId>,
}

impl Block {
    /// Create an empty block with room for `alloc` bytes
    pub fn with_capacity(alloc: usize) -> Self {
        Block {
            data: Vec::with_capacity(alloc),
            nl: 0,
            prev: None,
            next: None,
        }
    }

    /// Create a block holding a copy of `bytes`, allocated with `alloc` capacity
    pub fn from_bytes(bytes: &[u8], alloc: usize) -> Self {
        let mut data = Vec::with_capacity(alloc.max(bytes.len()));
        data.extend_from_slice(bytes);
        Block {
            nl: count_newlines(bytes),
            data,
            prev: None,
            next: None,
        }
    }

    /// Bytes in use
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes allocated
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cached number of newlines in the payload
    pub fn newlines(&self) -> usize {
        self.nl
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Insert `bytes` at `offset`, growing the allocation to a rounded size if needed
    pub(crate) fn insert_at(&mut self, offset: usize, bytes: &[u8], granularity: usize) {
        assert!(offset <= self.data.len(), "insert offset past end of block");
        let new_size = self.data.len() + bytes.len();
        if new_size > self.data.capacity() {
            let target = alloc_round(new_size, granularity);
            self.data.reserve_exact(target - self.data.len());
        }
        self.data.splice(offset..offset, bytes.iter().copied());
        self.nl += count_newlines(bytes);
    }

    /// Remove `len` bytes at `offset`, returning how many newlines went with them
    pub(crate) fn remove_range(&mut self, offset: usize, len: usize) -> usize {
        assert!(
            offset + len <= self.data.len(),
            "remove range past end of block"
        );
        let removed_nl = count_newlines(&self.data[offset..offset + len]);
        self.data.drain(offset..offset + len);
        self.nl -= removed_nl;
        removed_nl
    }

    /// Split off everything from `offset` onwards, returning the tail bytes
    pub(crate) fn split_off(&mut self, offset: usize) -> Vec<u8> {
        let tail = self.data.split_off(offset);
        self.nl -= count_newlines(&tail);
        tail
    }

    /// Append bytes without rounding (used when refilling a block to its nominal size)
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.nl += count_newlines(bytes);
    }
}
