use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::frame::{Buffer, TxId};
use crate::error::{StorageError, StorageResult};
use crate::file::{BlockId, FileManager};
use crate::log::LogManager;

/// How long a pin request waits for a frame before giving up.
const MAX_WAIT: Duration = Duration::from_secs(10);

struct PoolState {
    /// Number of frames with pin count 0. Kept exactly in sync with the
    /// frames themselves; every update happens under the pool lock.
    num_available: usize,
}

/// A fixed-size pool of [`Buffer`] frames shared by all transactions.
///
/// `pin` finds the frame already holding a block or repurposes an unpinned
/// one (flushing its dirty contents under the WAL rule first). When every
/// frame is pinned, the request waits — bounded by `max_wait` — for some
/// other caller to unpin, then fails with [`StorageError::BufferAbort`].
/// The whole find-or-evict-and-pin sequence runs under one pool lock, so
/// two concurrent callers can neither claim the same frame nor double-count
/// availability.
///
/// Callers must not hold a frame's own lock while calling back into the
/// manager (lock order is pool first, then frame).
pub struct BufferManager {
    pool: Vec<Arc<Mutex<Buffer>>>,
    state: Mutex<PoolState>,
    available: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    /// Create a pool of `num_buffers` frames with the default 10 second
    /// pin-acquisition wait.
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        num_buffers: usize,
    ) -> Self {
        Self::with_max_wait(file_manager, log_manager, num_buffers, MAX_WAIT)
    }

    /// Create a pool with an explicit pin-acquisition wait bound.
    pub fn with_max_wait(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        num_buffers: usize,
        max_wait: Duration,
    ) -> Self {
        let pool = (0..num_buffers)
            .map(|_| {
                Arc::new(Mutex::new(Buffer::new(
                    Arc::clone(&file_manager),
                    Arc::clone(&log_manager),
                )))
            })
            .collect();

        Self {
            pool,
            state: Mutex::new(PoolState {
                num_available: num_buffers,
            }),
            available: Condvar::new(),
            max_wait,
        }
    }

    /// Number of currently unpinned frames.
    pub fn available(&self) -> usize {
        self.state.lock().num_available
    }

    /// Pin the frame holding `block`, loading the block into a repurposed
    /// frame if necessary.
    ///
    /// A frame can be pinned by multiple independent callers; each `pin`
    /// must be matched by an [`unpin`](BufferManager::unpin). Fails with
    /// [`StorageError::BufferAbort`] if no frame frees up within the wait
    /// bound — a transient condition the caller should handle by releasing
    /// its pins and retrying the whole operation.
    pub fn pin(&self, block: &BlockId) -> StorageResult<Arc<Mutex<Buffer>>> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();

        loop {
            if let Some(buffer) = self.try_to_pin(block, &mut state)? {
                return Ok(buffer);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                // A frame may have freed in the instant the wait expired.
                return match self.try_to_pin(block, &mut state)? {
                    Some(buffer) => Ok(buffer),
                    None => Err(StorageError::BufferAbort),
                };
            }
        }
    }

    /// Release one pin on the frame. The last unpin returns the frame to
    /// the available count and wakes waiting pin requests.
    pub fn unpin(&self, buffer: &Arc<Mutex<Buffer>>) {
        let mut state = self.state.lock();
        let mut frame = buffer.lock();
        frame.unpin();
        if !frame.is_pinned() {
            state.num_available += 1;
            drop(frame);
            self.available.notify_all();
        }
    }

    /// Flush every frame dirtied by `tx`, pinned or not. Invoked by an
    /// external transaction manager at commit.
    pub fn flush_all(&self, tx: TxId) -> StorageResult<()> {
        let _state = self.state.lock();
        for handle in &self.pool {
            let mut frame = handle.lock();
            if frame.modifying_tx() == Some(tx) {
                frame.flush()?;
            }
        }
        Ok(())
    }

    /// One pin attempt under the pool lock: an existing frame for the
    /// block, else the first unpinned frame, else `None`.
    fn try_to_pin(
        &self,
        block: &BlockId,
        state: &mut PoolState,
    ) -> StorageResult<Option<Arc<Mutex<Buffer>>>> {
        let handle = match self.find_existing(block) {
            Some(handle) => handle,
            None => match self.choose_unpinned() {
                Some(handle) => {
                    handle.lock().assign_to_block(block.clone())?;
                    handle
                }
                None => return Ok(None),
            },
        };

        let mut frame = handle.lock();
        if !frame.is_pinned() {
            state.num_available -= 1;
        }
        frame.pin();
        drop(frame);
        Ok(Some(handle))
    }

    /// Frame already bound to `block`, matched by block value.
    fn find_existing(&self, block: &BlockId) -> Option<Arc<Mutex<Buffer>>> {
        self.pool
            .iter()
            .find(|handle| handle.lock().block() == Some(block))
            .cloned()
    }

    /// First unpinned frame; no recency policy.
    fn choose_unpinned(&self) -> Option<Arc<Mutex<Buffer>>> {
        self.pool
            .iter()
            .find(|handle| !handle.lock().is_pinned())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const BLOCK_SIZE: usize = 400;

    fn pool(dir: &std::path::Path, num_buffers: usize) -> Result<(Arc<FileManager>, BufferManager)> {
        let fm = Arc::new(FileManager::new(dir.join("db"), BLOCK_SIZE)?);
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "test.log")?);
        let bm = BufferManager::with_max_wait(
            Arc::clone(&fm),
            lm,
            num_buffers,
            Duration::from_millis(100),
        );
        // Blocks the tests pin.
        for _ in 0..8 {
            fm.append("testfile")?;
        }
        Ok((fm, bm))
    }

    #[test]
    fn test_pin_accounting() -> Result<()> {
        let dir = tempdir()?;
        let (_fm, bm) = pool(dir.path(), 3)?;

        assert_eq!(bm.available(), 3);
        let b0 = bm.pin(&BlockId::new("testfile", 0))?;
        let _b1 = bm.pin(&BlockId::new("testfile", 1))?;
        let _b2 = bm.pin(&BlockId::new("testfile", 2))?;
        assert_eq!(bm.available(), 0);

        bm.unpin(&b0);
        assert_eq!(bm.available(), 1);

        Ok(())
    }

    #[test]
    fn test_pinning_same_block_reuses_frame() -> Result<()> {
        let dir = tempdir()?;
        let (_fm, bm) = pool(dir.path(), 3)?;

        let block = BlockId::new("testfile", 0);
        let first = bm.pin(&block)?;
        let second = bm.pin(&block)?;

        // Same frame, pinned twice; one slot consumed.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(bm.available(), 2);

        // Only the last unpin frees the frame.
        bm.unpin(&first);
        assert_eq!(bm.available(), 2);
        bm.unpin(&second);
        assert_eq!(bm.available(), 3);

        Ok(())
    }

    #[test]
    fn test_pin_matches_by_block_value_not_instance() -> Result<()> {
        let dir = tempdir()?;
        let (_fm, bm) = pool(dir.path(), 3)?;

        let first = bm.pin(&BlockId::new("testfile", 2))?;
        // A distinct BlockId instance naming the same block.
        let second = bm.pin(&BlockId::new(String::from("testfile"), 2))?;
        assert!(Arc::ptr_eq(&first, &second));

        Ok(())
    }

    #[test]
    fn test_exhausted_pool_times_out() -> Result<()> {
        let dir = tempdir()?;
        let (_fm, bm) = pool(dir.path(), 2)?;

        let _b0 = bm.pin(&BlockId::new("testfile", 0))?;
        let _b1 = bm.pin(&BlockId::new("testfile", 1))?;

        let err = bm.pin(&BlockId::new("testfile", 2)).unwrap_err();
        assert!(matches!(err, StorageError::BufferAbort));

        Ok(())
    }

    #[test]
    fn test_unpin_wakes_waiting_pin() -> Result<()> {
        let dir = tempdir()?;
        let (fm, bm) = pool(dir.path(), 1)?;
        let _ = fm;
        let bm = Arc::new(bm);

        let held = bm.pin(&BlockId::new("testfile", 0))?;

        let waiter = {
            let bm = Arc::clone(&bm);
            std::thread::spawn(move || bm.pin(&BlockId::new("testfile", 1)).map(|_| ()))
        };

        // Give the waiter time to block, then free the frame.
        std::thread::sleep(Duration::from_millis(20));
        bm.unpin(&held);

        assert!(waiter.join().unwrap().is_ok());
        Ok(())
    }

    #[test]
    fn test_eviction_persists_dirty_frame() -> Result<()> {
        let dir = tempdir()?;
        let (fm, bm) = pool(dir.path(), 1)?;

        let b0 = BlockId::new("testfile", 0);
        let handle = bm.pin(&b0)?;
        {
            let mut frame = handle.lock();
            frame.contents_mut().set_i32(24, 1234);
            frame.set_modified(1, None);
        }
        bm.unpin(&handle);

        // Repurposing the only frame evicts block 0, flushing it.
        let other = bm.pin(&BlockId::new("testfile", 1))?;
        bm.unpin(&other);

        let mut check = crate::file::Page::new(BLOCK_SIZE);
        fm.read(&b0, &mut check)?;
        assert_eq!(check.get_i32(24), 1234);

        Ok(())
    }

    #[test]
    fn test_flush_all_targets_one_transaction() -> Result<()> {
        let dir = tempdir()?;
        let (fm, bm) = pool(dir.path(), 3)?;

        let b0 = BlockId::new("testfile", 0);
        let b1 = BlockId::new("testfile", 1);
        let h0 = bm.pin(&b0)?;
        let h1 = bm.pin(&b1)?;
        {
            let mut frame = h0.lock();
            frame.contents_mut().set_i32(0, 10);
            frame.set_modified(7, None);
        }
        {
            let mut frame = h1.lock();
            frame.contents_mut().set_i32(0, 20);
            frame.set_modified(8, None);
        }

        // Flushes tx 7's frame even while pinned; tx 8's stays dirty.
        bm.flush_all(7)?;
        assert_eq!(h0.lock().modifying_tx(), None);
        assert_eq!(h1.lock().modifying_tx(), Some(8));

        let mut check = crate::file::Page::new(BLOCK_SIZE);
        fm.read(&b0, &mut check)?;
        assert_eq!(check.get_i32(0), 10);

        Ok(())
    }
}
