//! Branching undo history.
//!
//! Every edit becomes a [`Change`] node in an arena. A node's parent is the
//! state it was made from and its children are the edits made from its own
//! state, oldest first. Undo walks toward the root, redo walks toward the
//! newest child. Reversing a node rewrites it in place into its inverse, so
//! the same node replays the edit in the other direction later.
//!
//! A change chain groups edits into one undo step by wrapping them in two
//! zero-valued barrier nodes. The root sentinel is also zero-valued but is
//! never reversed since it has no parent. Undo or redo inside an open chain
//! closes the edits recorded so far as one step; later edits start a new
//! group that the eventual `end_change_chain` closes.
//!
//! Merging only extends the current node when the new edit is adjacent to
//! it: an insert must start where the node's insert ends, a forward delete
//! must start at the node's offset, and a backspace must end there. The
//! node must also be a leaf and must not be the saved state.

/// Index of a node in the change arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeId(pub(crate) usize);

impl ChangeId {
    /// The permanent root sentinel
    pub const ROOT: ChangeId = ChangeId(0);
}

/// Whether the next edit may extend the current change instead of adding a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    #[default]
    None,
    Insert,
    Delete,
    Backspace,
}

#[derive(Debug, Clone, Default)]
pub struct Change {
    offset: usize,
    ins_len: usize,
    /// Bytes removed by this edit; its length is the delete count
    deleted: Vec<u8>,
    move_after: bool,
    parent: Option<ChangeId>,
    children: Vec<ChangeId>,
}

impl Change {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn ins_len(&self) -> usize {
        self.ins_len
    }

    pub fn del_len(&self) -> usize {
        self.deleted.len()
    }

    pub fn deleted(&self) -> &[u8] {
        &self.deleted
    }

    pub fn move_after(&self) -> bool {
        self.move_after
    }

    pub fn parent(&self) -> Option<ChangeId> {
        self.parent
    }

    /// Branches made from this state, oldest first
    pub fn children(&self) -> &[ChangeId] {
        &self.children
    }

    /// Zero-valued node delimiting a change chain
    pub fn is_barrier(&self) -> bool {
        self.ins_len == 0 && self.deleted.is_empty()
    }

    fn is_insert_only(&self) -> bool {
        self.ins_len > 0 && self.deleted.is_empty()
    }

    fn is_delete_only(&self) -> bool {
        self.ins_len == 0 && !self.deleted.is_empty()
    }
}

/// What undo and redo replay edits against.
///
/// Offsets are absolute. `insert_bytes` and `delete_bytes` act at the
/// cursor and leave it at the start of the affected span.
pub trait ChangeTarget {
    fn move_to(&mut self, offset: usize);
    fn insert_bytes(&mut self, bytes: &[u8]);
    fn delete_bytes(&mut self, len: usize);
    fn read_bytes(&self, len: usize) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Idle,
    /// Chain opened but no edit recorded yet
    Pending,
    /// Opening barrier emitted
    Recording,
}

#[derive(Debug, Clone)]
pub struct ChangeTree {
    nodes: Vec<Change>,
    current: ChangeId,
    saved: ChangeId,
    merge: MergeMode,
    chain: ChainState,
}

impl Default for ChangeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Change::default()],
            current: ChangeId::ROOT,
            saved: ChangeId::ROOT,
            merge: MergeMode::None,
            chain: ChainState::Idle,
        }
    }

    pub fn change(&self, id: ChangeId) -> &Change {
        &self.nodes[id.0]
    }

    /// Most recently applied change on the active path
    pub fn current(&self) -> ChangeId {
        self.current
    }

    /// Number of nodes including the root sentinel and barriers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing but the root sentinel has been recorded
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge
    }

    pub fn set_merge_mode(&mut self, merge: MergeMode) {
        self.merge = merge;
    }

    pub fn is_modified(&self) -> bool {
        self.current != self.saved
    }

    /// Mark the current state as written. The next edit always adds a node.
    pub fn mark_saved(&mut self) {
        self.saved = self.current;
        self.merge = MergeMode::None;
    }

    pub fn can_undo(&self) -> bool {
        self.change(self.current).parent.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.change(self.current).children.is_empty()
    }

    /// The current node, if a new edit may be coalesced into it.
    ///
    /// A node that already has branches is never extended: that would rewrite
    /// the state those branches were made from. Neither is the saved node,
    /// or the buffer would read as unmodified. Callers also require the new
    /// edit to touch the node's span.
    fn mergeable(&mut self) -> Option<&mut Change> {
        if self.current == self.saved {
            return None;
        }
        let node = &mut self.nodes[self.current.0];
        if node.parent.is_none() || !node.children.is_empty() {
            return None;
        }
        Some(node)
    }

    fn add_change(&mut self, mut change: Change) -> ChangeId {
        let id = ChangeId(self.nodes.len());
        change.parent = Some(self.current);
        self.nodes.push(change);
        self.nodes[self.current.0].children.push(id);
        self.current = id;
        id
    }

    /// Append a new leaf, emitting the opening barrier first if a chain is pending
    fn new_change(&mut self, change: Change) -> ChangeId {
        if self.chain == ChainState::Pending {
            self.add_change(Change::default());
            self.chain = ChainState::Recording;
        }
        self.add_change(change)
    }

    /// Record `len` bytes inserted at `offset`
    pub fn record_insert(&mut self, offset: usize, len: usize) {
        assert!(len > 0, "recorded an empty insert");
        if self.merge == MergeMode::Insert {
            if let Some(node) = self
                .mergeable()
                .filter(|n| n.is_insert_only() && n.offset + n.ins_len == offset)
            {
                node.ins_len += len;
                return;
            }
        }
        self.new_change(Change {
            offset,
            ins_len: len,
            ..Change::default()
        });
    }

    /// Record `deleted` removed at `offset`
    pub fn record_delete(&mut self, offset: usize, deleted: Vec<u8>, move_after: bool) {
        assert!(!deleted.is_empty(), "recorded an empty delete");
        match self.merge {
            MergeMode::Delete => {
                if let Some(node) = self
                    .mergeable()
                    .filter(|n| n.is_delete_only() && n.offset == offset)
                {
                    node.deleted.extend_from_slice(&deleted);
                    return;
                }
            }
            MergeMode::Backspace => {
                let len = deleted.len();
                if let Some(node) = self
                    .mergeable()
                    .filter(|n| n.is_delete_only() && offset + len == n.offset)
                {
                    let mut joined = deleted;
                    joined.append(&mut node.deleted);
                    node.deleted = joined;
                    node.offset -= len;
                    return;
                }
            }
            MergeMode::Insert | MergeMode::None => {}
        }
        self.new_change(Change {
            offset,
            deleted,
            move_after,
            ..Change::default()
        });
    }

    /// Record `deleted` replaced by `ins_len` new bytes at `offset`. Never coalesced.
    pub fn record_replace(&mut self, offset: usize, deleted: Vec<u8>, ins_len: usize) {
        assert!(
            ins_len > 0 || !deleted.is_empty(),
            "recorded an empty replace"
        );
        self.new_change(Change {
            offset,
            ins_len,
            deleted,
            ..Change::default()
        });
    }

    /// Open a group of edits that undo and redo as one step
    pub fn begin_change_chain(&mut self) {
        assert_eq!(
            self.chain,
            ChainState::Idle,
            "change chain opened while another is open"
        );
        self.chain = ChainState::Pending;
        self.merge = MergeMode::None;
    }

    /// Close the open group; a group with no edits leaves no trace
    pub fn end_change_chain(&mut self) {
        match self.chain {
            ChainState::Idle => panic!("change chain closed without being opened"),
            ChainState::Pending => {}
            ChainState::Recording => {
                self.add_change(Change::default());
            }
        }
        self.chain = ChainState::Idle;
        self.merge = MergeMode::None;
    }

    /// Close the edits of an open chain so far; the chain stays open for more
    fn seal_open_chain(&mut self) {
        if self.chain == ChainState::Recording {
            self.add_change(Change::default());
            self.chain = ChainState::Pending;
        }
    }

    /// Undo one step, returning how many edits were reversed (0 at the root)
    pub fn undo(&mut self, target: &mut impl ChangeTarget) -> usize {
        self.merge = MergeMode::None;
        self.seal_open_chain();
        let Some(mut parent) = self.change(self.current).parent else {
            return 0;
        };

        let count = if self.change(self.current).is_barrier() {
            let mut count = 0;
            let mut node = parent;
            while !self.change(node).is_barrier() {
                self.reverse(node, target);
                count += 1;
                node = self.expect_parent(node);
            }
            // node is the opening barrier; step past it
            parent = self.expect_parent(node);
            if count > 1 {
                tracing::info!("Undid {} changes.", count);
            }
            count
        } else {
            self.reverse(self.current, target);
            1
        };

        self.current = parent;
        count
    }

    /// Redo one step along the newest branch, returning how many edits were reapplied
    pub fn redo(&mut self, target: &mut impl ChangeTarget) -> usize {
        self.merge = MergeMode::None;
        self.seal_open_chain();
        let Some(mut node) = self.change(self.current).children.last().copied() else {
            return 0;
        };

        let count = if self.change(node).is_barrier() {
            let mut count = 0;
            loop {
                node = self.expect_newest_child(node);
                if self.change(node).is_barrier() {
                    break;
                }
                self.reverse(node, target);
                count += 1;
            }
            if count > 1 {
                tracing::info!("Redid {} changes.", count);
            }
            count
        } else {
            self.reverse(node, target);
            1
        };

        self.current = node;
        count
    }

    fn expect_parent(&self, id: ChangeId) -> ChangeId {
        match self.change(id).parent {
            Some(parent) => parent,
            None => panic!("change chain has no opening barrier"),
        }
    }

    fn expect_newest_child(&self, id: ChangeId) -> ChangeId {
        match self.change(id).children.last() {
            Some(&child) => child,
            None => panic!("change chain has no closing barrier"),
        }
    }

    /// Apply the inverse of a node and rewrite the node into that inverse
    fn reverse(&mut self, id: ChangeId, target: &mut impl ChangeTarget) {
        let node = &mut self.nodes[id.0];
        target.move_to(node.offset);
        if node.ins_len == 0 {
            // delete -> insert
            target.insert_bytes(&node.deleted);
            if node.move_after {
                target.move_to(node.offset + node.deleted.len());
            }
            node.ins_len = node.deleted.len();
            node.deleted = Vec::new();
        } else if !node.deleted.is_empty() {
            let present = target.read_bytes(node.ins_len);
            target.delete_bytes(node.ins_len);
            target.insert_bytes(&node.deleted);
            node.ins_len = node.deleted.len();
            node.deleted = present;
        } else {
            // insert -> delete
            node.deleted = target.read_bytes(node.ins_len);
            target.delete_bytes(node.ins_len);
            node.ins_len = 0;
        }
    }
}
