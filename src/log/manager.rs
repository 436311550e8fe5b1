use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::file::page::I32_SIZE;
use crate::file::{BlockId, FileManager, Page};
use crate::log::iterator::LogIterator;

/// Log sequence number: a monotonically increasing identifier assigned to
/// each appended record. The first append returns 1.
pub type Lsn = u64;

/// Mutable log state, guarded by one lock so that append and flush are
/// mutually exclusive. The in-memory page for the current block is the only
/// non-durable log state at any instant.
#[derive(Debug)]
struct LogState {
    /// In-memory copy of the current (last) log block.
    page: Page,
    current_block: BlockId,
    /// Highest LSN issued.
    latest_lsn: Lsn,
    /// Highest LSN durably written. Always `<= latest_lsn`.
    last_saved_lsn: Lsn,
}

/// Append-only, single-writer write-ahead log.
///
/// Records are opaque byte slices; their interpretation (and any recovery
/// algorithm over them) belongs to higher layers. Appends go to an
/// in-memory page and become durable on [`flush`](LogManager::flush), so
/// many appends can share one disk write: flush once for the highest LSN
/// that must be durable, not once per append.
#[derive(Debug)]
pub struct LogManager {
    file_manager: Arc<FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

impl LogManager {
    /// Open the log, creating its first block if the file is empty,
    /// otherwise loading the last block for further appends.
    pub fn new(file_manager: Arc<FileManager>, log_file: impl Into<String>) -> StorageResult<Self> {
        let log_file = log_file.into();
        let log_size = file_manager.length(&log_file)?;
        let mut page = Page::new(file_manager.block_size());

        let current_block = if log_size == 0 {
            append_new_block(&file_manager, &log_file, &mut page)?
        } else {
            let block = BlockId::new(log_file.clone(), log_size - 1);
            file_manager.read(&block, &mut page)?;
            block
        };

        Ok(Self {
            file_manager,
            log_file,
            state: Mutex::new(LogState {
                page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Append a record and return its LSN.
    ///
    /// The record is placed just below the block's boundary, as a
    /// length-prefixed blob. If the current block lacks room, the block is
    /// flushed and a fresh pre-zeroed block started. A record that cannot
    /// fit even an empty block is a hard error, not an endless hunt for a
    /// bigger one.
    pub fn append(&self, record: &[u8]) -> StorageResult<Lsn> {
        let block_size = self.file_manager.block_size();
        let bytes_needed = record.len() + I32_SIZE;
        if bytes_needed + I32_SIZE > block_size {
            return Err(StorageError::LogRecordTooLarge {
                size: record.len(),
                max: block_size - 2 * I32_SIZE,
            });
        }

        let mut state = self.state.lock();
        let mut boundary = state.page.get_i32(0) as usize;

        if boundary < bytes_needed + I32_SIZE {
            // No room: persist the full block and move to a new one.
            self.flush_current(&mut state);
            state.current_block =
                append_new_block(&self.file_manager, &self.log_file, &mut state.page)?;
            boundary = state.page.get_i32(0) as usize;
        }

        let record_pos = boundary - bytes_needed;
        state.page.set_bytes(record_pos, record);
        state.page.set_i32(0, record_pos as i32);
        state.latest_lsn += 1;
        Ok(state.latest_lsn)
    }

    /// Durability barrier: ensure every record up to `lsn` is on disk.
    ///
    /// A no-op when `lsn` is already saved. Write failures are reported and
    /// `last_saved_lsn` is left unchanged, so a later flush retries; this
    /// best-effort policy is deliberate for a background-style durability
    /// step (foreground page reads and writes always propagate errors).
    pub fn flush(&self, lsn: Lsn) {
        let mut state = self.state.lock();
        if lsn >= state.last_saved_lsn {
            self.flush_current(&mut state);
        }
    }

    /// A backward cursor over the durable log, newest record first. The
    /// current block is flushed first so every yielded record is durable.
    pub fn iterator(&self) -> StorageResult<LogIterator> {
        let mut state = self.state.lock();
        self.flush_current(&mut state);
        LogIterator::new(Arc::clone(&self.file_manager), state.current_block.clone())
    }

    /// Address of the block currently receiving appends.
    pub fn current_block(&self) -> BlockId {
        self.state.lock().current_block.clone()
    }

    /// Highest LSN issued so far.
    pub fn latest_lsn(&self) -> Lsn {
        self.state.lock().latest_lsn
    }

    /// Highest LSN known to be durable.
    pub fn last_saved_lsn(&self) -> Lsn {
        self.state.lock().last_saved_lsn
    }

    fn flush_current(&self, state: &mut LogState) {
        match self.file_manager.write(&state.current_block, &state.page) {
            Ok(()) => state.last_saved_lsn = state.latest_lsn,
            Err(e) => log::error!("could not flush log block {}: {}", state.current_block, e),
        }
    }
}

/// Extend the log file by one block and stage it in `page` with an empty
/// boundary (the full block size). The staged page is written out so the
/// block is well-formed on disk even before its first record is flushed.
fn append_new_block(
    file_manager: &FileManager,
    log_file: &str,
    page: &mut Page,
) -> StorageResult<BlockId> {
    let block = file_manager.append(log_file)?;
    page.contents_mut().fill(0);
    page.set_i32(0, file_manager.block_size() as i32);
    file_manager.write(&block, page)?;
    Ok(block)
}
