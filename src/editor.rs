//! Editing session: the open buffers and the state they share.

use crate::config::Config;
use crate::model::block_iter::LineBuffer;
use crate::model::buffer::{Buffer, BufferId};
use crate::model::file_io::{self, FileInfo, LineEnding};
use crate::view::cursor::CursorDisplay;
use std::path::Path;

pub struct Editor {
    config: Config,
    buffers: Vec<Buffer>,
    /// Index into `buffers`
    current: Option<usize>,
    next_buffer_id: usize,
    /// Scratch line shared by every line-wise operation
    line: LineBuffer,
}

impl Editor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            buffers: Vec::new(),
            current: None,
            next_buffer_id: 0,
            line: LineBuffer::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    fn alloc_buffer_id(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        id
    }

    /// Open `path` (or a new unnamed buffer) and make it current.
    ///
    /// A file that is already open is not loaded again; its buffer becomes
    /// current instead.
    pub fn open_buffer(&mut self, path: Option<&Path>) -> anyhow::Result<BufferId> {
        let Some(path) = path else {
            let id = self.alloc_buffer_id();
            self.buffers.push(Buffer::new(id, &self.config.editor));
            self.current = Some(self.buffers.len() - 1);
            return Ok(id);
        };

        let abs = file_io::absolute_path(path).ok();
        let info = std::fs::metadata(path)
            .ok()
            .map(|meta| FileInfo::from_metadata(&meta));
        if let Some(index) = self
            .buffers
            .iter()
            .position(|b| b.is_file(abs.as_deref(), info.as_ref()))
        {
            tracing::debug!("{} is already open", path.display());
            self.current = Some(index);
            return Ok(self.buffers[index].id());
        }

        let id = self.alloc_buffer_id();
        let buffer = Buffer::open(id, path, &self.config.editor)?;
        self.buffers.push(buffer);
        self.current = Some(self.buffers.len() - 1);
        Ok(id)
    }

    /// Drop a buffer and its whole history. Returns false if no such buffer.
    pub fn close_buffer(&mut self, id: BufferId) -> bool {
        let Some(index) = self.buffers.iter().position(|b| b.id() == id) else {
            return false;
        };
        self.buffers.remove(index);
        self.current = match self.current {
            _ if self.buffers.is_empty() => None,
            Some(cur) if cur > index => Some(cur - 1),
            Some(cur) if cur == index => Some(index.min(self.buffers.len() - 1)),
            other => other,
        };
        true
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id() == id)
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.iter_mut().find(|b| b.id() == id)
    }

    pub fn current_id(&self) -> Option<BufferId> {
        self.current_buffer().map(Buffer::id)
    }

    pub fn set_current(&mut self, id: BufferId) -> bool {
        match self.buffers.iter().position(|b| b.id() == id) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn current_buffer(&self) -> Option<&Buffer> {
        self.current.map(|index| &self.buffers[index])
    }

    pub fn current_buffer_mut(&mut self) -> Option<&mut Buffer> {
        self.current.map(|index| &mut self.buffers[index])
    }

    /// Save the current buffer, optionally under a new name or line ending
    pub fn save_current(
        &mut self,
        path: Option<&Path>,
        line_ending: Option<LineEnding>,
    ) -> anyhow::Result<()> {
        let Some(buffer) = self.current_buffer_mut() else {
            anyhow::bail!("No buffer is open.");
        };
        buffer.save(path, line_ending)
    }

    /// Undo in the current buffer and remember the resulting cursor column
    pub fn undo(&mut self) -> usize {
        let Some(index) = self.current else {
            return 0;
        };
        let buffer = &mut self.buffers[index];
        let count = buffer.undo();
        if count > 0 {
            buffer.update_preferred_x(&mut self.line);
        }
        count
    }

    /// Redo in the current buffer and remember the resulting cursor column
    pub fn redo(&mut self) -> usize {
        let Some(index) = self.current else {
            return 0;
        };
        let buffer = &mut self.buffers[index];
        let count = buffer.redo();
        if count > 0 {
            buffer.update_preferred_x(&mut self.line);
        }
        count
    }

    pub fn cursor_display(&mut self) -> Option<CursorDisplay> {
        let index = self.current?;
        Some(self.buffers[index].cursor_display(&mut self.line))
    }

    /// Search forward in the current buffer, moving its cursor to the match
    pub fn find_next(&mut self, pattern: &str) -> Option<usize> {
        let index = self.current?;
        self.buffers[index].find_next_regex(pattern, &mut self.line)
    }
}
