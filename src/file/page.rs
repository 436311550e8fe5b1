use byteorder::{ByteOrder, LittleEndian};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Encoded width of a 32-bit integer.
pub const I32_SIZE: usize = 4;
/// Encoded width of a 16-bit integer.
pub const I16_SIZE: usize = 2;
/// Encoded width of a boolean.
pub const BOOL_SIZE: usize = 1;
/// Encoded width of a date (signed Unix seconds).
pub const DATE_SIZE: usize = 8;

/// A fixed-length sequence of bytes holding the contents of one disk block,
/// with typed accessors at arbitrary byte offsets.
///
/// All values are little-endian. Byte slices and strings are encoded as a
/// 4-byte length prefix followed by the raw bytes, so embedded zero bytes
/// round-trip exactly.
///
/// Accessors perform no bounds or type validation: the caller owns the page
/// layout and must pre-compute offsets (use [`Page::max_length`] when laying
/// out variable-length fields). Reading a type that was never written there
/// yields garbage; an out-of-range offset panics. This is a deliberate
/// trade-off for a layer on the hot path of every page access.
#[derive(Debug)]
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Create a zeroed page of the given block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size].into_boxed_slice(),
        }
    }

    /// Wrap an existing byte buffer, e.g. a log record.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: bytes.into_boxed_slice(),
        }
    }

    /// Worst-case encoded size of a string of `strlen` bytes: the length
    /// prefix plus the bytes themselves.
    pub fn max_length(strlen: usize) -> usize {
        I32_SIZE + strlen
    }

    pub fn get_i32(&self, offset: usize) -> i32 {
        LittleEndian::read_i32(&self.data[offset..offset + I32_SIZE])
    }

    pub fn set_i32(&mut self, offset: usize, value: i32) {
        LittleEndian::write_i32(&mut self.data[offset..offset + I32_SIZE], value);
    }

    pub fn get_i16(&self, offset: usize) -> i16 {
        LittleEndian::read_i16(&self.data[offset..offset + I16_SIZE])
    }

    pub fn set_i16(&mut self, offset: usize, value: i16) {
        LittleEndian::write_i16(&mut self.data[offset..offset + I16_SIZE], value);
    }

    pub fn get_bool(&self, offset: usize) -> bool {
        self.data[offset] != 0
    }

    pub fn set_bool(&mut self, offset: usize, value: bool) {
        self.data[offset] = value as u8;
    }

    /// Read a date stored as signed Unix seconds.
    pub fn get_date(&self, offset: usize) -> SystemTime {
        let secs = LittleEndian::read_i64(&self.data[offset..offset + DATE_SIZE]);
        if secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(secs as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
        }
    }

    /// Store a date as signed Unix seconds, truncating any sub-second part.
    pub fn set_date(&mut self, offset: usize, value: SystemTime) {
        let secs = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        };
        LittleEndian::write_i64(&mut self.data[offset..offset + DATE_SIZE], secs);
    }

    /// Read a length-prefixed byte slice.
    pub fn get_bytes(&self, offset: usize) -> &[u8] {
        let len = self.get_i32(offset) as usize;
        let start = offset + I32_SIZE;
        &self.data[start..start + len]
    }

    /// Write a length-prefixed byte slice.
    pub fn set_bytes(&mut self, offset: usize, value: &[u8]) {
        self.set_i32(offset, value.len() as i32);
        let start = offset + I32_SIZE;
        self.data[start..start + value.len()].copy_from_slice(value);
    }

    /// Read a string stored as a length-prefixed blob of its UTF-8 bytes.
    pub fn get_string(&self, offset: usize) -> String {
        String::from_utf8_lossy(self.get_bytes(offset)).into_owned()
    }

    /// Write a string as a length-prefixed blob of its UTF-8 bytes. The
    /// encoded size is `Page::max_length(value.len())`.
    pub fn set_string(&mut self, offset: usize, value: &str) {
        self.set_bytes(offset, value.as_bytes());
    }

    pub(crate) fn contents(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
