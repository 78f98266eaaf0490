//! Strata Storage
//!
//! Bitemporal stores for metadata instances.
//!
//! # Architecture
//!
//! Every store implements [`InstanceStore`]:
//! - point-in-time reads by valid time
//! - revision history per GUID
//! - atomic multi-statement transactions with per-statement guards
//! - predicate queries and endpoint traversal
//!
//! Each committed transaction is stamped with one valid time, strictly
//! greater than the previous commit's.
//!
//! # Implementations
//!
//! - [`MemoryStore`] - in-process store, the default
//! - `RocksStore` - persistent store on RocksDB (feature `rocksdb`)

pub mod clock;
#[cfg(feature = "rocksdb")]
pub mod engine;
pub mod keys;
pub mod memory;
pub mod options;
pub mod transaction;

#[cfg(feature = "rocksdb")]
pub use engine::RocksStore;
pub use memory::MemoryStore;
pub use options::StorageOptions;
pub use transaction::{Guard, Statement, TransactionBuilder};

use strata_core::{
    AsOf, Guid, HistoryWindow, InstanceQuery, Record, Relationship, Result, Revision,
    TransactionTime, ValidTime,
};

/// Outcome of a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Sequence number of the transaction
    pub tx_id: u64,
    /// Valid time stamped on every revision written
    pub valid_time: ValidTime,
    pub transaction_time: TransactionTime,
    pub statements: usize,
}

/// One relationship reaching out of a node, with the record at its far end
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub relationship: Relationship,
    /// Record stored for the other endpoint, if any
    pub neighbor: Option<Record>,
}

/// Boundary to a bitemporal, transactional instance store
pub trait InstanceStore: Send + Sync {
    /// Read the revision of `guid` visible at `as_of`
    fn read(&self, guid: &Guid, as_of: AsOf) -> Result<Option<Record>>;

    /// Every revision of `guid` in effect during `window`, oldest first
    fn history(&self, guid: &Guid, window: &HistoryWindow) -> Result<Vec<Revision<Record>>>;

    /// Apply the statements atomically, or none of them
    fn submit(&self, statements: Vec<Statement>) -> Result<CommitReceipt>;

    /// Filter, sequence and page the records visible at `as_of`
    fn query(&self, query: &InstanceQuery, as_of: AsOf) -> Result<Vec<Record>>;

    /// Every relationship visible at `as_of` with `node` as an endpoint
    fn traverse(&self, node: &Guid, as_of: AsOf) -> Result<Vec<Hop>>;
}
