//! Storage kernel for a single-node relational database engine.
//!
//! This crate provides the layers every higher component (transactions,
//! record management, query execution) builds on:
//!
//! - **FileManager**: block-addressed disk I/O over plain OS files
//! - **Page**: fixed-size byte container with typed accessors
//! - **LogManager**: append-only write-ahead log with reverse iteration
//! - **BufferManager**: fixed pool of pinnable frames enforcing the
//!   WAL-before-data flush rule
//!
//! The composition root that constructs these managers, and everything
//! above the buffer pool (transaction, lock, and recovery managers), lives
//! outside this crate.

pub mod buffer;
pub mod error;
pub mod file;
pub mod log;

pub use crate::buffer::{Buffer, BufferManager, TxId};
pub use crate::error::{StorageError, StorageResult};
pub use crate::file::{BlockId, FileManager, Page};
pub use crate::log::{LogIterator, LogManager, Lsn};
