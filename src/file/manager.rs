use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::file::block_id::BlockId;
use crate::file::page::Page;

/// Block-addressed access to the files of one database directory.
///
/// The manager owns an open read-write handle per file, created on first
/// access and kept for the manager's lifetime (handles are reclaimed at
/// process exit — the manager is process-scoped state). Each read or write
/// moves exactly one block between a [`Page`] and disk; the seek and the
/// transfer happen under the per-file lock, so positioned I/O is atomic per
/// call.
pub struct FileManager {
    db_dir: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl FileManager {
    /// Open (or create) the database directory.
    ///
    /// `is_new` reports whether the directory existed beforehand. Leftover
    /// temporary-table files (names starting with `temp`) are removed;
    /// failures there are logged and ignored, since stale temp files are a
    /// hygiene concern, not a correctness one.
    pub fn new(db_dir: impl Into<PathBuf>, block_size: usize) -> StorageResult<Self> {
        let db_dir = db_dir.into();
        let is_new = !db_dir.exists();
        if is_new {
            fs::create_dir_all(&db_dir)?;
        }

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("temp") {
                let path = entry.path();
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("could not remove stale temp file {:?}: {}", path, e);
                }
            }
        }

        Ok(Self {
            db_dir,
            block_size,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    /// Whether the database directory was created by this instantiation.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read the block's bytes into the page.
    ///
    /// Reading a block past the end of the file is an error, never a silent
    /// zero fill.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()> {
        let file = self.get_file(block.filename())?;
        let mut file = file.lock();
        let offset = block.number() * self.block_size as u64;

        read_at(&mut file, offset, page.contents_mut()).map_err(|source| {
            StorageError::ReadBlock {
                block: block.clone(),
                source,
            }
        })
    }

    /// Write the page's bytes to the block's position, extending the file
    /// if the block lies at its current end.
    pub fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        let file = self.get_file(block.filename())?;
        let mut file = file.lock();
        let offset = block.number() * self.block_size as u64;

        write_at(&mut file, offset, page.contents()).map_err(|source| {
            StorageError::WriteBlock {
                block: block.clone(),
                source,
            }
        })
    }

    /// Extend the file by one zeroed block and return its address.
    ///
    /// Writing the zero block here guarantees that every block on disk is
    /// pre-zeroed before any logical writer touches it, and that files only
    /// ever hold whole blocks.
    pub fn append(&self, filename: &str) -> StorageResult<BlockId> {
        let file = self.get_file(filename)?;
        let mut file = file.lock();

        let io = |source| StorageError::FileAccess {
            file: filename.to_string(),
            source,
        };

        let len = file.metadata().map_err(io)?.len();
        debug_assert_eq!(len % self.block_size as u64, 0);
        let block = BlockId::new(filename, len / self.block_size as u64);

        let zeros = vec![0u8; self.block_size];
        write_at(&mut file, len, &zeros).map_err(io)?;

        Ok(block)
    }

    /// Number of blocks in the file. `append` and `write` only ever produce
    /// whole blocks, so the division is exact.
    pub fn length(&self, filename: &str) -> StorageResult<u64> {
        let file = self.get_file(filename)?;
        let len = file
            .lock()
            .metadata()
            .map_err(|source| StorageError::FileAccess {
                file: filename.to_string(),
                source,
            })?
            .len();
        debug_assert_eq!(len % self.block_size as u64, 0);
        Ok(len / self.block_size as u64)
    }

    fn get_file(&self, filename: &str) -> StorageResult<Arc<Mutex<File>>> {
        let mut open_files = self.open_files.lock();
        if let Some(file) = open_files.get(filename) {
            return Ok(Arc::clone(file));
        }

        let path = self.db_dir.join(filename);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|source| StorageError::FileAccess {
                file: filename.to_string(),
                source,
            })?;

        let file = Arc::new(Mutex::new(file));
        open_files.insert(filename.to_string(), Arc::clone(&file));
        Ok(file)
    }
}

fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

fn write_at(file: &mut File, offset: u64, buf: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    file.sync_all()
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("db_dir", &self.db_dir)
            .field("block_size", &self.block_size)
            .field("is_new", &self.is_new)
            .finish()
    }
}
