//! Buffer pool.
//!
//! A fixed set of in-memory frames mediates every page access between the
//! layers above (transactions, record management) and disk. Each frame
//! holds at most one block's contents, carries a pin count, and remembers
//! which transaction dirtied it and under which log record, so that the
//! WAL rule — log record durable before the page it describes — holds on
//! every flush and eviction.

pub mod frame;
pub mod manager;

pub use frame::{Buffer, TxId};
pub use manager::BufferManager;
