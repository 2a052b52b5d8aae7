//! Loading files into a [`BlockStore`] and writing them back.
//!
//! Load classifies the line-ending convention from the first newline and
//! strips carriage returns from CRLF files so the store only ever holds `\n`.
//! Save writes a temporary sibling of the target and renames it into place,
//! so a failed save never leaves the original half-written.

use super::block::{alloc_round, Block};
use super::block_store::BlockStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// Longest path accepted for a save target, including the temporary suffix
pub const PATH_MAX: usize = 4096;

/// Length of the random suffix appended to temporary save files
const TEMP_SUFFIX_LEN: usize = 6;

/// Line ending format used in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum LineEnding {
    /// Unix format (\n)
    #[default]
    LF,
    /// DOS/Windows format (\r\n)
    CRLF,
}

impl LineEnding {
    /// The bytes written for each line break
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LF => "\n",
            Self::CRLF => "\r\n",
        }
    }

    /// Short name used in reports, `LF` or `CRLF`
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LF => "LF",
            Self::CRLF => "CRLF",
        }
    }
}

/// Error returned when a file cannot be turned into a buffer
#[derive(Debug)]
pub enum LoadError {
    Open(io::Error),
    Read(io::Error),
    IsDirectory,
    NotRegularFile,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "Error opening file: {}", e),
            Self::Read(e) => write!(f, "Error reading file: {}", e),
            Self::IsDirectory => write!(f, "Is a directory"),
            Self::NotRegularFile => write!(f, "Not a regular file"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(e) | Self::Read(e) => Some(e),
            Self::IsDirectory | Self::NotRegularFile => None,
        }
    }
}

/// Error returned when a buffer cannot be written. The original file is untouched.
#[derive(Debug)]
pub enum SaveError {
    NameTooLong,
    CreateTemp(io::Error),
    Write(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameTooLong => write!(f, "Error making temporary path name: File name too long"),
            Self::CreateTemp(e) => write!(f, "Error creating temporary file: {}", e),
            Self::Write(e) => write!(f, "Write error: {}", e),
            Self::Rename(e) => write!(f, "Rename failed: {}", e),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateTemp(e) | Self::Write(e) | Self::Rename(e) => Some(e),
            Self::NameTooLong => None,
        }
    }
}

/// Identity and metadata of a file as it was when loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let (dev, ino) = (meta.dev(), meta.ino());
        #[cfg(not(unix))]
        let (dev, ino) = (0, 0);
        Self {
            dev,
            ino,
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }

    /// Whether both describe the same underlying file
    pub fn same_file(&self, other: &FileInfo) -> bool {
        self.ino != 0 && self.dev == other.dev && self.ino == other.ino
    }
}

/// Result of a successful load
#[derive(Debug)]
pub struct LoadedFile {
    pub store: BlockStore,
    pub line_ending: LineEnding,
    /// The file could only be opened for reading
    pub read_only: bool,
    pub info: FileInfo,
}

/// Classify by the first newline: CRLF if a `\r` sits right before it
pub fn detect_line_ending(bytes: &[u8]) -> LineEnding {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(nl) if nl > 0 && bytes[nl - 1] == b'\r' => LineEnding::CRLF,
        _ => LineEnding::LF,
    }
}

/// Fill blocks from raw file bytes, dropping the `\r` of every `\r\n` in CRLF mode
pub fn read_blocks(bytes: &[u8], block_size: usize, granularity: usize) -> (BlockStore, LineEnding) {
    let line_ending = detect_line_ending(bytes);
    let blocks = match line_ending {
        LineEnding::LF => bytes
            .chunks(block_size)
            .map(|chunk| Block::from_bytes(chunk, alloc_round(chunk.len(), granularity)))
            .collect(),
        LineEnding::CRLF => {
            let mut blocks = Vec::with_capacity(bytes.len() / block_size + 1);
            let mut pos = 0;
            while pos < bytes.len() {
                let end = (pos + block_size).min(bytes.len());
                let mut data = Vec::with_capacity(alloc_round(end - pos, granularity));
                for (i, &b) in bytes[pos..end].iter().enumerate() {
                    if b == b'\r' && bytes.get(pos + i + 1) == Some(&b'\n') {
                        continue;
                    }
                    data.push(b);
                }
                blocks.push(Block::from_bytes(&data, data.capacity()));
                pos = end;
            }
            blocks
        }
    };
    (
        BlockStore::from_blocks(blocks, block_size, granularity),
        line_ending,
    )
}

/// Load a file into blocks.
///
/// Returns `Ok(None)` if the path does not exist, so the caller can open an
/// empty buffer bound to it. Falls back to read-only access when the file
/// cannot be opened for writing.
pub fn load(
    path: &Path,
    block_size: usize,
    granularity: usize,
) -> anyhow::Result<Option<LoadedFile>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LoadError::Open(e).into()),
    };
    if meta.is_dir() {
        return Err(LoadError::IsDirectory.into());
    }
    if !meta.is_file() {
        return Err(LoadError::NotRegularFile.into());
    }

    let (mut file, read_only) = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => (file, false),
        Err(_) => match File::open(path) {
            Ok(file) => (file, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LoadError::Open(e).into()),
        },
    };

    let meta = file.metadata().map_err(LoadError::Read)?;
    let mut contents = Vec::with_capacity(meta.len() as usize);
    file.read_to_end(&mut contents).map_err(LoadError::Read)?;

    let (store, line_ending) = read_blocks(&contents, block_size, granularity);
    tracing::debug!(
        "loaded {}: {} bytes, {}, {} blocks{}",
        path.display(),
        contents.len(),
        line_ending.display_name(),
        store.block_count(),
        if read_only { ", read-only" } else { "" }
    );
    Ok(Some(LoadedFile {
        store,
        line_ending,
        read_only,
        info: FileInfo::from_metadata(&meta),
    }))
}

fn write_store(out: &mut impl Write, store: &BlockStore, line_ending: LineEnding) -> io::Result<()> {
    for block in store.blocks() {
        let data = block.data();
        match line_ending {
            LineEnding::LF => out.write_all(data)?,
            LineEnding::CRLF => {
                for line in data.split_inclusive(|&b| b == b'\n') {
                    match line.split_last() {
                        Some((b'\n', body)) => {
                            out.write_all(body)?;
                            out.write_all(line_ending.as_str().as_bytes())?;
                        }
                        _ => out.write_all(line)?,
                    }
                }
            }
        }
    }
    out.flush()
}

/// Write the store to `path` through a temporary file in the same directory.
///
/// The temporary file is named `<name>.XXXXXX` and is removed again if
/// anything fails before the rename.
pub fn save(store: &BlockStore, path: &Path, line_ending: LineEnding) -> anyhow::Result<()> {
    save_with(store, path, line_ending, |file, store, line_ending| {
        write_store(&mut BufWriter::new(file), store, line_ending)
    })
}

fn save_with(
    store: &BlockStore,
    path: &Path,
    line_ending: LineEnding,
    write: impl FnOnce(&mut File, &BlockStore, LineEnding) -> io::Result<()>,
) -> anyhow::Result<()> {
    if path.as_os_str().len() + TEMP_SUFFIX_LEN + 2 > PATH_MAX {
        return Err(SaveError::NameTooLong.into());
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = match path.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => return Err(SaveError::CreateTemp(io::ErrorKind::InvalidInput.into()).into()),
    };

    // Keep the original's permissions on the replacement
    let original_meta = fs::metadata(path).ok();

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .rand_bytes(TEMP_SUFFIX_LEN)
        .tempfile_in(dir)
        .map_err(SaveError::CreateTemp)?;
    tracing::debug!("saving {} via {}", path.display(), temp.path().display());

    if let Some(meta) = &original_meta {
        if let Err(e) = fs::set_permissions(temp.path(), meta.permissions()) {
            tracing::warn!(
                "Could not copy permissions to {}: {}",
                temp.path().display(),
                e
            );
        }
    }

    write(temp.as_file_mut(), store, line_ending).map_err(SaveError::Write)?;

    // On failure the returned TempPath is dropped, which deletes the file
    temp.persist(path).map_err(|e| SaveError::Rename(e.error))?;
    tracing::debug!(
        "saved {}: {} bytes, {}",
        path.display(),
        store.len(),
        line_ending.display_name()
    );
    Ok(())
}

/// Absolute form of `path`, resolved against the working directory (not canonicalized)
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_line_ending() {
        assert_eq!(detect_line_ending(b"ab\r\ncd\n"), LineEnding::CRLF);
        assert_eq!(detect_line_ending(b"ab\ncd\r\n"), LineEnding::LF);
        assert_eq!(detect_line_ending(b"\nab"), LineEnding::LF);
        assert_eq!(detect_line_ending(b"no newline\r"), LineEnding::LF);
        assert_eq!(detect_line_ending(b""), LineEnding::LF);
    }

    #[test]
    fn test_read_blocks_strips_cr_across_block_boundary() {
        // The \r\n pair straddles the 4-byte block boundary
        let (store, le) = read_blocks(b"abc\r\nde\r\n", 4, 4);
        assert_eq!(le, LineEnding::CRLF);
        assert_eq!(store.to_vec(), b"abc\nde\n");
        assert_eq!(store.newlines(), 2);
        store.validate().unwrap();
    }

    #[test]
    fn test_read_blocks_keeps_lone_cr() {
        let (store, _) = read_blocks(b"a\r\nb\rc\n", 16, 4);
        assert_eq!(store.to_vec(), b"a\nb\rc\n");
    }

    #[test]
    fn test_write_crlf() {
        let (store, _) = read_blocks(b"ab\ncd\nlast", 3, 4);
        let mut out = Vec::new();
        write_store(&mut out, &store, LineEnding::CRLF).unwrap();
        assert_eq!(out, b"ab\r\ncd\r\nlast");
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load(&dir.path().join("nope.txt"), 64, 4).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = load(dir.path(), 64, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::IsDirectory)
        ));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let (store, _) = read_blocks(b"hello\n", 64, 4);
        save(&store, &path, LineEnding::LF).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_name_too_long() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x".repeat(PATH_MAX));
        let store = BlockStore::new();
        let err = save(&store, &path, LineEnding::LF).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SaveError>(),
            Some(SaveError::NameTooLong)
        ));
    }

    #[test]
    fn test_save_into_missing_directory_fails_on_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("f.txt");
        let err = save(&BlockStore::new(), &path, LineEnding::LF).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SaveError>(),
            Some(SaveError::CreateTemp(_))
        ));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o751)).unwrap();
        save(&BlockStore::from_bytes(b"new", 64, 4), &path, LineEnding::LF).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o751);
    }

    /// Accepts `room` bytes, then fails like a full disk
    struct FullDisk {
        room: usize,
        written: Vec<u8>,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::other("No space left on device"));
            }
            let n = buf.len().min(self.room);
            self.written.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_store_reports_write_error() {
        let (store, _) = read_blocks(b"one\ntwo\nthree\n", 4, 4);
        let mut out = FullDisk {
            room: 5,
            written: Vec::new(),
        };
        let err = write_store(&mut out, &store, LineEnding::CRLF).unwrap_err();
        assert_eq!(err.to_string(), "No space left on device");
        assert_eq!(out.written, b"one\r\n");
    }

    #[test]
    fn test_write_error_removes_temp_and_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"original\n").unwrap();

        let store = BlockStore::from_bytes(b"replacement\n", 64, 4);
        let err = save_with(&store, &path, LineEnding::LF, |file, store, line_ending| {
            let mut out = FullDisk {
                room: 3,
                written: Vec::new(),
            };
            write_store(&mut out, store, line_ending)?;
            file.write_all(&out.written)
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SaveError>(),
            Some(SaveError::Write(_))
        ));
        assert!(err.to_string().starts_with("Write error:"));
        assert_eq!(fs::read(&path).unwrap(), b"original\n");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("notes.txt")]);
    }
}
