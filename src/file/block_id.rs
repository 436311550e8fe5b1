use std::fmt;

/// Logical address of a disk block: a file name plus a block number within
/// that file.
///
/// Equality and hashing are structural, never identity-based: the buffer
/// pool indexes frames by block value, so two independently constructed
/// `BlockId`s naming the same block must compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    filename: String,
    number: u64,
}

impl BlockId {
    pub fn new(filename: impl Into<String>, number: u64) -> Self {
        Self {
            filename: filename.into(),
            number,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[file {}, block {}]", self.filename, self.number)
    }
}
