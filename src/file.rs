//! Block-addressed file layer.
//!
//! A database file is a raw sequence of fixed-size blocks with no header;
//! block `i` occupies bytes `[i * block_size, (i + 1) * block_size)`. Files
//! always hold a whole number of blocks. Key components:
//!
//! - **BlockId**: logical address of one block, `(filename, block number)`
//! - **Page**: in-memory staging area for exactly one block's bytes
//! - **FileManager**: reads and writes pages at block addresses

pub mod block_id;
pub mod manager;
pub mod page;

pub use block_id::BlockId;
pub use manager::FileManager;
pub use page::Page;
