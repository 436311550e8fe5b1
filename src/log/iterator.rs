use std::sync::Arc;

use crate::error::StorageResult;
use crate::file::page::I32_SIZE;
use crate::file::{BlockId, FileManager, Page};

/// Backward cursor over the records of the log file.
///
/// Starts at the last block. Within a block, records sit between the
/// boundary and the block's end, most recent at the lowest offset, so
/// walking a block forward and then stepping to the previous block yields
/// every record newest-first. Items are fallible because each block
/// transition reads from disk.
pub struct LogIterator {
    file_manager: Arc<FileManager>,
    block: BlockId,
    page: Page,
    current_pos: usize,
}

impl LogIterator {
    pub(crate) fn new(file_manager: Arc<FileManager>, block: BlockId) -> StorageResult<Self> {
        let mut iter = Self {
            page: Page::new(file_manager.block_size()),
            file_manager,
            block,
            current_pos: 0,
        };
        let block = iter.block.clone();
        iter.move_to_block(&block)?;
        Ok(iter)
    }

    /// Load a block and position the cursor at its boundary, i.e. at the
    /// most recent record in that block.
    fn move_to_block(&mut self, block: &BlockId) -> StorageResult<()> {
        self.file_manager.read(block, &mut self.page)?;
        self.current_pos = self.page.get_i32(0) as usize;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = StorageResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let block_size = self.file_manager.block_size();
        if self.current_pos == block_size && self.block.number() == 0 {
            return None;
        }

        if self.current_pos == block_size {
            // This block is exhausted; step back to its predecessor.
            self.block = BlockId::new(self.block.filename(), self.block.number() - 1);
            let block = self.block.clone();
            if let Err(e) = self.move_to_block(&block) {
                return Some(Err(e));
            }
        }

        let record = self.page.get_bytes(self.current_pos).to_vec();
        self.current_pos += I32_SIZE + record.len();
        Some(Ok(record))
    }
}
