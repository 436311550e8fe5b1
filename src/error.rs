//! Storage layer error types.

use thiserror::Error;

use crate::file::BlockId;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot read block {block}: {source}")]
    ReadBlock {
        block: BlockId,
        source: std::io::Error,
    },

    #[error("cannot write block {block}: {source}")]
    WriteBlock {
        block: BlockId,
        source: std::io::Error,
    },

    #[error("cannot access file {file}: {source}")]
    FileAccess { file: String, source: std::io::Error },

    #[error("log record of {size} bytes cannot fit in any block (max {max})")]
    LogRecordTooLarge { size: usize, max: usize },

    /// The buffer pool stayed exhausted for the whole wait window. This is
    /// a transient condition: callers should release their pins (e.g. abort
    /// the transaction) and retry the whole operation later.
    #[error("no buffer available for allocation")]
    BufferAbort,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
