//! An open buffer: content, cursor, undo history and file binding.
//!
//! Every edit goes through this type so that the block store mutation and
//! its change record always happen together, and the cursor is the one
//! position carried across each mutation.

use super::block_iter::LineBuffer;
use super::block_store::{BlockStore, Position};
use super::change_tree::{ChangeTarget, ChangeTree, MergeMode};
use super::file_io::{self, FileInfo, LineEnding};
use crate::config::EditorConfig;
use crate::primitives::regexp;
use crate::view::cursor::CursorDisplay;
use anyhow::Context;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// Per-buffer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub tab_width: usize,
    pub utf8: bool,
    pub line_ending: LineEnding,
}

impl From<&EditorConfig> for BufferOptions {
    fn from(config: &EditorConfig) -> Self {
        Self {
            tab_width: config.tab_width,
            utf8: config.utf8,
            line_ending: config.default_line_ending,
        }
    }
}

/// The store plus the cursor, as seen by undo and redo
struct StoreCursor<'a> {
    store: &'a mut BlockStore,
    pos: &'a mut Position,
}

impl ChangeTarget for StoreCursor<'_> {
    fn move_to(&mut self, offset: usize) {
        *self.pos = self.store.position_at(offset);
    }

    fn insert_bytes(&mut self, bytes: &[u8]) {
        *self.pos = self.store.insert(*self.pos, bytes);
    }

    fn delete_bytes(&mut self, len: usize) {
        *self.pos = self.store.delete(*self.pos, len);
    }

    fn read_bytes(&self, len: usize) -> Vec<u8> {
        self.store.read(*self.pos, len)
    }
}

#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    /// Name as given by the user
    filename: Option<PathBuf>,
    abs_filename: Option<PathBuf>,
    store: BlockStore,
    changes: ChangeTree,
    cursor: Position,
    options: BufferOptions,
    read_only: bool,
    file_info: Option<FileInfo>,
    /// Display column vertical motion tries to return to
    preferred_x: usize,
}

impl Buffer {
    /// Create an empty, unnamed buffer
    pub fn new(id: BufferId, config: &EditorConfig) -> Self {
        let store = BlockStore::with_limits(config.block_size, config.alloc_granularity);
        Self {
            id,
            filename: None,
            abs_filename: None,
            cursor: store.start(),
            store,
            changes: ChangeTree::new(),
            options: BufferOptions::from(config),
            read_only: false,
            file_info: None,
            preferred_x: 0,
        }
    }

    /// Open `path` into a new buffer.
    ///
    /// A path that does not exist gives an empty buffer bound to it.
    pub fn open(id: BufferId, path: &Path, config: &EditorConfig) -> anyhow::Result<Self> {
        let abs = file_io::absolute_path(path).context("Failed to make absolute path")?;
        let mut buffer = Self::new(id, config);
        if let Some(loaded) = file_io::load(path, config.block_size, config.alloc_granularity)? {
            buffer.store = loaded.store;
            buffer.options.line_ending = loaded.line_ending;
            buffer.read_only = loaded.read_only;
            buffer.file_info = Some(loaded.info);
        } else {
            tracing::debug!("{} does not exist, opening empty buffer", path.display());
        }
        buffer.cursor = buffer.store.start();
        buffer.filename = Some(path.to_path_buf());
        buffer.abs_filename = Some(abs);
        Ok(buffer)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn abs_filename(&self) -> Option<&Path> {
        self.abs_filename.as_deref()
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn changes(&self) -> &ChangeTree {
        &self.changes
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }

    pub fn line_ending(&self) -> LineEnding {
        self.options.line_ending
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn preferred_x(&self) -> usize {
        self.preferred_x
    }

    pub fn contents(&self) -> Vec<u8> {
        self.store.to_vec()
    }

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    pub fn cursor_offset(&self) -> usize {
        self.store.offset_of(self.cursor)
    }

    /// Zero-based line of the cursor
    pub fn cursor_row(&self) -> usize {
        self.store.line_number(self.cursor)
    }

    /// Whether this buffer shows the file at `abs` (whose metadata is `info`)
    pub fn is_file(&self, abs: Option<&Path>, info: Option<&FileInfo>) -> bool {
        if let (Some(a), Some(b)) = (&self.file_info, info) {
            if a.same_file(b) {
                return true;
            }
        }
        match (self.abs_filename.as_deref(), abs) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn same_file(&self, other: &Buffer) -> bool {
        self.is_file(other.abs_filename(), other.file_info())
    }

    // Editing

    /// Insert at the cursor, leaving the cursor before the text or, with
    /// `move_after`, after it.
    pub fn insert(&mut self, bytes: &[u8], move_after: bool) {
        if bytes.is_empty() {
            return;
        }
        let offset = self.cursor_offset();
        self.cursor = self.store.insert(self.cursor, bytes);
        self.changes.record_insert(offset, bytes.len());
        if move_after {
            self.cursor = self.store.position_at(offset + bytes.len());
        }
    }

    /// Type text at the cursor and step past it. Consecutive typing with no
    /// motion in between undoes as one change.
    pub fn insert_typed(&mut self, bytes: &[u8]) {
        self.insert(bytes, true);
        self.changes.set_merge_mode(MergeMode::Insert);
    }

    /// Delete `len` bytes at the cursor.
    ///
    /// `move_after` makes undo leave the cursor after the restored text.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `len` bytes follow the cursor.
    pub fn delete(&mut self, len: usize, move_after: bool) {
        if len == 0 {
            return;
        }
        let offset = self.cursor_offset();
        let deleted = self.store.read(self.cursor, len);
        self.cursor = self.store.delete(self.cursor, len);
        self.changes.record_delete(offset, deleted, move_after);
    }

    /// Delete the character under the cursor. Returns false at end of buffer.
    pub fn delete_char(&mut self) -> bool {
        let len = self.char_len_at_cursor();
        if len == 0 {
            return false;
        }
        self.delete(len, false);
        self.changes.set_merge_mode(MergeMode::Delete);
        true
    }

    /// Delete the character before the cursor. Returns false at start of buffer.
    pub fn erase_char(&mut self) -> bool {
        let mut it = self.store.iter_at(self.cursor);
        if it.prev_char(self.options.utf8).is_none() {
            return false;
        }
        let start = it.position();
        let len = self.cursor_offset() - it.offset();
        self.cursor = start;
        self.delete(len, true);
        self.changes.set_merge_mode(MergeMode::Backspace);
        true
    }

    /// Replace `del_len` bytes at the cursor with `bytes` as one change
    pub fn replace(&mut self, del_len: usize, bytes: &[u8]) {
        if del_len == 0 && bytes.is_empty() {
            return;
        }
        let offset = self.cursor_offset();
        let deleted = self.store.read(self.cursor, del_len);
        assert_eq!(deleted.len(), del_len, "replace past end of buffer");
        self.cursor = self.store.delete(self.cursor, del_len);
        self.cursor = self.store.insert(self.cursor, bytes);
        self.changes.record_replace(offset, deleted, bytes.len());
    }

    /// Copy up to `len` bytes at the cursor
    pub fn read(&self, len: usize) -> Vec<u8> {
        self.store.read(self.cursor, len)
    }

    fn char_len_at_cursor(&self) -> usize {
        let mut it = self.store.iter_at(self.cursor);
        let start = it.offset();
        match it.next_char(self.options.utf8) {
            Some(_) => it.offset() - start,
            None => 0,
        }
    }

    // Motion. Any motion ends coalescing of typed text.

    pub fn set_merge_mode(&mut self, merge: MergeMode) {
        self.changes.set_merge_mode(merge);
    }

    pub fn move_to_offset(&mut self, offset: usize) {
        self.changes.set_merge_mode(MergeMode::None);
        self.cursor = self.store.position_at(offset);
    }

    pub fn move_next_char(&mut self) -> bool {
        self.changes.set_merge_mode(MergeMode::None);
        let mut it = self.store.iter_at(self.cursor);
        let moved = it.next_char(self.options.utf8).is_some();
        self.cursor = it.position();
        moved
    }

    pub fn move_prev_char(&mut self) -> bool {
        self.changes.set_merge_mode(MergeMode::None);
        let mut it = self.store.iter_at(self.cursor);
        let moved = it.prev_char(self.options.utf8).is_some();
        self.cursor = it.position();
        moved
    }

    pub fn move_bol(&mut self) {
        self.changes.set_merge_mode(MergeMode::None);
        let mut it = self.store.iter_at(self.cursor);
        it.bol();
        self.cursor = it.position();
    }

    pub fn move_eol(&mut self) {
        self.changes.set_merge_mode(MergeMode::None);
        let mut it = self.store.iter_at(self.cursor);
        it.eol();
        self.cursor = it.position();
    }

    // History

    /// Undo one step, returning how many edits were reversed
    pub fn undo(&mut self) -> usize {
        let mut target = StoreCursor {
            store: &mut self.store,
            pos: &mut self.cursor,
        };
        self.changes.undo(&mut target)
    }

    /// Redo one step, returning how many edits were reapplied
    pub fn redo(&mut self) -> usize {
        let mut target = StoreCursor {
            store: &mut self.store,
            pos: &mut self.cursor,
        };
        self.changes.redo(&mut target)
    }

    pub fn begin_change_chain(&mut self) {
        self.changes.begin_change_chain();
    }

    pub fn end_change_chain(&mut self) {
        self.changes.end_change_chain();
    }

    pub fn is_modified(&self) -> bool {
        self.changes.is_modified()
    }

    // Display

    pub fn cursor_display(&self, line: &mut LineBuffer) -> CursorDisplay {
        CursorDisplay::compute(
            &self.store,
            self.cursor,
            self.options.tab_width,
            self.options.utf8,
            line,
        )
    }

    /// Remember the cursor's current display column
    pub fn update_preferred_x(&mut self, line: &mut LineBuffer) {
        self.preferred_x = self.cursor_display(line).display_col;
    }

    // Files

    /// Write the buffer to `path` (its own file when `None`) using `line_ending`
    /// (its current convention when `None`).
    ///
    /// On success the buffer is unmodified, writable, uses the written line
    /// ending, and is bound to the written path.
    pub fn save(&mut self, path: Option<&Path>, line_ending: Option<LineEnding>) -> anyhow::Result<()> {
        let path = match (path, &self.filename) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(filename)) => filename.clone(),
            (None, None) => anyhow::bail!("No filename."),
        };
        let line_ending = line_ending.unwrap_or(self.options.line_ending);
        let rebind = self.filename.as_deref() != Some(path.as_path());
        let abs_filename = if rebind {
            Some(file_io::absolute_path(&path)?)
        } else {
            None
        };
        file_io::save(&self.store, &path, line_ending)?;

        self.changes.mark_saved();
        self.read_only = false;
        self.options.line_ending = line_ending;
        if let Some(abs) = abs_filename {
            self.abs_filename = Some(abs);
            self.filename = Some(path.clone());
        }
        self.file_info = std::fs::metadata(&path)
            .ok()
            .map(|meta| FileInfo::from_metadata(&meta));
        Ok(())
    }

    /// Move the cursor to the next match of `pattern` after it, searching
    /// forward line by line. Returns the offset of the match.
    pub fn find_next_regex(&mut self, pattern: &str, line: &mut LineBuffer) -> Option<usize> {
        let re = regexp::compile(pattern)?;
        let mut it = self.store.iter_at(self.cursor);
        let (bytes, cx) = it.fetch_this_line(line);
        // Skip a match sitting at the cursor so repeated searches advance
        let mut start_at = cx + 1;
        let mut line_start = self.cursor_offset() - cx;
        let mut found = if start_at <= bytes.len() {
            re.find_at(bytes, start_at).map(|m| m.start())
        } else {
            None
        };

        while found.is_none() {
            it.eol();
            if it.next_byte().is_none() {
                return None;
            }
            line_start = it.offset();
            start_at = 0;
            let bytes = it.fetch_eol(line);
            found = re.find_at(bytes, start_at).map(|m| m.start());
        }

        let offset = line_start + found?;
        self.move_to_offset(offset);
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EditorConfig {
        EditorConfig {
            block_size: 8,
            alloc_granularity: 4,
            ..EditorConfig::default()
        }
    }

    fn buffer_with(content: &str) -> Buffer {
        let mut buffer = Buffer::new(BufferId(0), &small_config());
        buffer.insert(content.as_bytes(), false);
        buffer.changes = ChangeTree::new();
        buffer
    }

    fn text(buffer: &Buffer) -> String {
        String::from_utf8(buffer.contents()).unwrap()
    }

    #[test]
    fn test_insert_cursor_placement() {
        let mut buffer = buffer_with("");
        buffer.insert(b"abc", false);
        assert_eq!(buffer.cursor_offset(), 0);
        buffer.move_to_offset(3);
        buffer.insert(b"def", true);
        assert_eq!(buffer.cursor_offset(), 6);
        assert_eq!(text(&buffer), "abcdef");
    }

    #[test]
    fn test_undo_restores_content_and_cursor() {
        let mut buffer = buffer_with("hello world");
        buffer.move_to_offset(5);
        buffer.delete(6, false);
        assert_eq!(text(&buffer), "hello");

        assert_eq!(buffer.undo(), 1);
        assert_eq!(text(&buffer), "hello world");
        assert_eq!(buffer.cursor_offset(), 5);

        assert_eq!(buffer.redo(), 1);
        assert_eq!(text(&buffer), "hello");
        assert_eq!(buffer.cursor_offset(), 5);
        buffer.store().validate().unwrap();
    }

    #[test]
    fn test_typing_coalesces() {
        let mut buffer = buffer_with("");
        buffer.insert_typed(b"a");
        buffer.insert_typed(b"b");
        buffer.insert_typed(b"c");
        assert_eq!(buffer.changes().len(), 2);
        buffer.undo();
        assert_eq!(text(&buffer), "");
    }

    #[test]
    fn test_motion_breaks_coalescing() {
        let mut buffer = buffer_with("");
        buffer.insert_typed(b"a");
        buffer.move_prev_char();
        buffer.move_next_char();
        buffer.insert_typed(b"b");
        assert_eq!(buffer.changes().len(), 3);
    }

    #[test]
    fn test_backspace_coalesces_and_undo_puts_cursor_after() {
        let mut buffer = buffer_with("abcdef");
        buffer.move_to_offset(4);
        assert!(buffer.erase_char());
        assert!(buffer.erase_char());
        assert!(buffer.erase_char());
        assert_eq!(text(&buffer), "aef");
        assert_eq!(buffer.cursor_offset(), 1);

        assert_eq!(buffer.undo(), 1);
        assert_eq!(text(&buffer), "abcdef");
        assert_eq!(buffer.cursor_offset(), 4);
    }

    #[test]
    fn test_erase_multibyte_char() {
        let mut buffer = buffer_with("a世");
        buffer.move_to_offset(4);
        assert!(buffer.erase_char());
        assert_eq!(text(&buffer), "a");
        buffer.move_to_offset(0);
        assert!(!buffer.erase_char());
    }

    #[test]
    fn test_delete_char_coalesces() {
        let mut buffer = buffer_with("abcdef");
        buffer.move_to_offset(1);
        buffer.delete_char();
        buffer.delete_char();
        assert_eq!(text(&buffer), "adef");
        assert_eq!(buffer.changes().len(), 2);
        buffer.move_to_offset(4);
        assert!(!buffer.delete_char());
    }

    #[test]
    fn test_replace_and_undo() {
        let mut buffer = buffer_with("one two three");
        buffer.move_to_offset(4);
        buffer.replace(3, b"2");
        assert_eq!(text(&buffer), "one 2 three");
        buffer.undo();
        assert_eq!(text(&buffer), "one two three");
        assert_eq!(buffer.cursor_offset(), 4);
        buffer.redo();
        assert_eq!(text(&buffer), "one 2 three");
    }

    #[test]
    fn test_line_motion() {
        let mut buffer = buffer_with("one\ntwo three\n");
        buffer.move_to_offset(6);
        buffer.move_bol();
        assert_eq!(buffer.cursor_offset(), 4);
        buffer.move_eol();
        assert_eq!(buffer.cursor_offset(), 13);
        assert_eq!(buffer.cursor_row(), 1);
    }

    #[test]
    fn test_find_next_regex() {
        let mut buffer = buffer_with("foo bar\nbaz foo\nfoo");
        let mut line = LineBuffer::new();
        assert_eq!(buffer.find_next_regex("foo", &mut line), Some(12));
        assert_eq!(buffer.find_next_regex("foo", &mut line), Some(16));
        assert_eq!(buffer.find_next_regex("foo", &mut line), None);
        assert_eq!(buffer.cursor_offset(), 16);
        assert_eq!(buffer.find_next_regex("(", &mut line), None);
    }

    #[test]
    fn test_preferred_x_tracks_display_column() {
        let mut buffer = buffer_with("\tab");
        let mut line = LineBuffer::new();
        buffer.move_to_offset(2);
        buffer.update_preferred_x(&mut line);
        assert_eq!(buffer.preferred_x(), 9);
    }

    #[test]
    fn test_save_without_filename_fails() {
        let mut buffer = buffer_with("x");
        let err = buffer.save(None, None).unwrap_err();
        assert_eq!(err.to_string(), "No filename.");
    }
}
