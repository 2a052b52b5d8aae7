//! Core data model: block storage, traversal, undo history and file I/O

pub mod block;
pub mod block_iter;
pub mod block_store;
pub mod buffer;
pub mod change_tree;
pub mod file_io;
