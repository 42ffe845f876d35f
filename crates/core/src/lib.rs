//! Core plumbing for the fleet ledger.
//!
//! This crate provides the pieces the domain layer stands on: keyed record
//! storage with call-level atomicity, the host time/height oracle, the
//! hash-chained audit journal, configuration and logging setup.

pub mod config;
pub mod error;
pub mod journal;
pub mod logging;
pub mod oracle;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use config::{ConfigError, LedgerConfig, StorageBackend, DEFAULT_HISTORY_CAPACITY};
pub use error::{Result, StoreError};
pub use journal::{
    Journal, JournalDraft, JournalEntry, JournalHead, JournalHealth, RecordDigest,
};
pub use oracle::{HostOracle, ManualOracle, SystemOracle};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{KvStore, MemoryStore, Txn, WriteBatch, WriteOp};
