use std::sync::Arc;

use crate::error::StorageResult;
use crate::file::{BlockId, FileManager, Page};
use crate::log::{LogManager, Lsn};

/// Identifier of the transaction that modified a buffer. Issued by an
/// external transaction manager; opaque here.
pub type TxId = u64;

/// One frame of the buffer pool: a page-sized byte buffer bound to at most
/// one disk block at a time, plus pin and modification bookkeeping.
///
/// All frames are allocated once at pool construction and never
/// reallocated; only their bound block, contents, and metadata change.
#[derive(Debug)]
pub struct Buffer {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    modifying_tx: Option<TxId>,
    lsn: Option<Lsn>,
}

impl Buffer {
    pub(crate) fn new(file_manager: Arc<FileManager>, log_manager: Arc<LogManager>) -> Self {
        let contents = Page::new(file_manager.block_size());
        Self {
            file_manager,
            log_manager,
            contents,
            block: None,
            pins: 0,
            modifying_tx: None,
            lsn: None,
        }
    }

    /// The page staged in this frame. Callers mutate it in place and must
    /// call [`set_modified`](Buffer::set_modified) afterwards so the change
    /// survives eviction.
    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    /// The block this frame currently holds, if any.
    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// The transaction that dirtied this frame, if it is dirty.
    pub fn modifying_tx(&self) -> Option<TxId> {
        self.modifying_tx
    }

    /// Record that `tx` modified the page, described by the log record at
    /// `lsn`. A `None` LSN models an intentionally unlogged change (one
    /// that is idempotent on redo); any previously recorded LSN stands.
    pub fn set_modified(&mut self, tx: TxId, lsn: Option<Lsn>) {
        self.modifying_tx = Some(tx);
        if lsn.is_some() {
            self.lsn = lsn;
        }
    }

    /// Rebind the frame to `block`: flush the current occupant if dirty,
    /// then read the new block's bytes from disk. The frame is unbound and
    /// unpinned while the read is in flight, so a failed read never leaves
    /// it pointing at a block whose contents it does not hold.
    pub(crate) fn assign_to_block(&mut self, block: BlockId) -> StorageResult<()> {
        self.flush()?;
        self.block = None;
        self.pins = 0;
        self.file_manager.read(&block, &mut self.contents)?;
        self.block = Some(block);
        Ok(())
    }

    /// Write the page back to its block if dirty. The log is flushed up to
    /// the recorded LSN first: data is never durable before the log record
    /// describing it.
    pub(crate) fn flush(&mut self) -> StorageResult<()> {
        if self.modifying_tx.is_some() {
            if let Some(lsn) = self.lsn {
                self.log_manager.flush(lsn);
            }
            if let Some(block) = &self.block {
                self.file_manager.write(block, &self.contents)?;
            }
            self.modifying_tx = None;
        }
        Ok(())
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        debug_assert!(self.pins > 0, "unpin of an unpinned buffer");
        self.pins = self.pins.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const BLOCK_SIZE: usize = 400;

    fn managers(dir: &std::path::Path) -> Result<(Arc<FileManager>, Arc<LogManager>)> {
        let fm = Arc::new(FileManager::new(dir.join("db"), BLOCK_SIZE)?);
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "test.log")?);
        Ok((fm, lm))
    }

    #[test]
    fn test_assign_reads_block_and_resets_pins() -> Result<()> {
        let dir = tempdir()?;
        let (fm, lm) = managers(dir.path())?;

        let block = fm.append("testfile")?;
        let mut page = Page::new(BLOCK_SIZE);
        page.set_i32(80, 100);
        fm.write(&block, &page)?;

        let mut buffer = Buffer::new(Arc::clone(&fm), lm);
        buffer.pin();
        buffer.assign_to_block(block.clone())?;

        assert_eq!(buffer.block(), Some(&block));
        assert!(!buffer.is_pinned());
        assert_eq!(buffer.contents().get_i32(80), 100);

        Ok(())
    }

    #[test]
    fn test_flush_is_noop_when_clean() -> Result<()> {
        let dir = tempdir()?;
        let (fm, lm) = managers(dir.path())?;

        let block = fm.append("testfile")?;
        let mut page = Page::new(BLOCK_SIZE);
        page.set_i32(0, 1);
        fm.write(&block, &page)?;

        let mut buffer = Buffer::new(Arc::clone(&fm), lm);
        buffer.assign_to_block(block.clone())?;
        buffer.contents_mut().set_i32(0, 2);
        // No set_modified: the change is not flushed.
        buffer.flush()?;

        let mut check = Page::new(BLOCK_SIZE);
        fm.read(&block, &mut check)?;
        assert_eq!(check.get_i32(0), 1);

        Ok(())
    }

    #[test]
    fn test_flush_writes_dirty_page_and_cleans() -> Result<()> {
        let dir = tempdir()?;
        let (fm, lm) = managers(dir.path())?;

        let block = fm.append("testfile")?;
        let mut buffer = Buffer::new(Arc::clone(&fm), Arc::clone(&lm));
        buffer.assign_to_block(block.clone())?;

        let lsn = lm.append(b"change of block 0")?;
        buffer.contents_mut().set_i32(0, 42);
        buffer.set_modified(1, Some(lsn));
        assert_eq!(buffer.modifying_tx(), Some(1));

        buffer.flush()?;
        assert_eq!(buffer.modifying_tx(), None);
        // The describing log record became durable no later than the page.
        assert!(lm.last_saved_lsn() >= lsn);

        let mut check = Page::new(BLOCK_SIZE);
        fm.read(&block, &mut check)?;
        assert_eq!(check.get_i32(0), 42);

        Ok(())
    }

    #[test]
    fn test_reassign_flushes_previous_occupant() -> Result<()> {
        let dir = tempdir()?;
        let (fm, lm) = managers(dir.path())?;

        let b0 = fm.append("testfile")?;
        let b1 = fm.append("testfile")?;

        let mut buffer = Buffer::new(Arc::clone(&fm), lm);
        buffer.assign_to_block(b0.clone())?;
        buffer.contents_mut().set_i32(12, 7);
        buffer.set_modified(1, None);

        // Rebinding must push the dirty contents of b0 to disk first.
        buffer.assign_to_block(b1)?;

        let mut check = Page::new(BLOCK_SIZE);
        fm.read(&b0, &mut check)?;
        assert_eq!(check.get_i32(12), 7);

        Ok(())
    }

    #[test]
    fn test_unlogged_modification_keeps_earlier_lsn() -> Result<()> {
        let dir = tempdir()?;
        let (fm, lm) = managers(dir.path())?;

        let block = fm.append("testfile")?;
        let mut buffer = Buffer::new(fm, Arc::clone(&lm));
        buffer.assign_to_block(block)?;

        let lsn = lm.append(b"logged change")?;
        buffer.set_modified(1, Some(lsn));
        buffer.set_modified(1, None);

        buffer.flush()?;
        // The earlier LSN still forced a log flush.
        assert!(lm.last_saved_lsn() >= lsn);

        Ok(())
    }
}
