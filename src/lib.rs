//! Text storage and edit history for a terminal text editor.
//!
//! Content lives in a [`model::block_store::BlockStore`] of fixed-size
//! blocks, is traversed with [`model::block_iter::BlockIter`], and every
//! edit is recorded in a branching [`model::change_tree::ChangeTree`].
//! [`model::buffer::Buffer`] ties these together with a cursor and a file,
//! and [`editor::Editor`] holds the buffers of one session.

pub mod config;
pub mod editor;
pub mod model;
pub mod primitives;
pub mod view;
