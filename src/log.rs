//! Write-ahead log.
//!
//! The log is an append-only chain of fixed-size blocks on top of the file
//! layer. Within a block, records are packed from the high end downward;
//! bytes `[0, 4)` hold the boundary — the offset of the earliest record
//! still in the block. Each appended record is assigned a monotonically
//! increasing log sequence number (LSN), and [`LogManager::flush`] is the
//! durability barrier higher layers invoke before writing the data pages
//! those records describe.

pub mod iterator;
pub mod manager;

pub use iterator::LogIterator;
pub use manager::{LogManager, Lsn};
