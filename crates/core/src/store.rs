//! Keyed record storage with call-level atomicity
//!
//! The ledger sees storage as namespaced key → record maps. Backends only need
//! point reads and an atomic batch commit; everything else (typed access,
//! read-modify-write merges, id counters) is layered on top by [`Txn`], which
//! stages writes in an overlay and hands them back as a single [`WriteBatch`].
//!
//! # Guarantees
//!
//! - Reads inside a [`Txn`] observe the transaction's own staged writes
//! - Nothing reaches the backend until the caller commits the batch
//! - A dropped [`Txn`] leaves the backend untouched
//! - Counter ids are only consumed when the batch carrying them is committed

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Namespace holding the per-id-space counters
pub const COUNTER_NAMESPACE: &str = "counters";

/// A single staged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite a record
    Put {
        /// Record namespace
        namespace: String,
        /// Record key within the namespace
        key: String,
        /// Encoded record
        value: Vec<u8>,
    },
    /// Remove a record if present
    Delete {
        /// Record namespace
        namespace: String,
        /// Record key within the namespace
        key: String,
    },
}

/// Ordered set of writes applied all-or-nothing by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put
    pub fn put(&mut self, namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put {
            namespace: namespace.into(),
            key: key.into(),
            value,
        });
    }

    /// Stage a delete
    pub fn delete(&mut self, namespace: impl Into<String>, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            namespace: namespace.into(),
            key: key.into(),
        });
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate staged operations in order
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Persistent key-value backend
pub trait KvStore {
    /// Read the raw record at `namespace/key`
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Apply every operation in `batch`, or none of them
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Volatile backend used for tests and ephemeral ledgers
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all namespaces
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .records
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        for op in batch {
            match op {
                WriteOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    self.records.insert((namespace, key), value);
                }
                WriteOp::Delete { namespace, key } => {
                    self.records.remove(&(namespace, key));
                }
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Write overlay over a [`KvStore`] for one logical call
pub struct Txn<'a> {
    store: &'a dyn KvStore,
    /// Staged writes; `None` marks a delete
    staged: BTreeMap<(String, String), Option<Vec<u8>>>,
    /// Staging order, replayed into the batch
    order: Vec<(String, String)>,
}

impl<'a> Txn<'a> {
    /// Open an overlay on `store`
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Raw read that sees staged writes first
    pub fn get_raw(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match self.staged.get(&(namespace.to_string(), key.to_string())) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get(namespace, key),
        }
    }

    /// Typed read of a JSON-encoded record
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: impl Display) -> Result<Option<T>> {
        let key = key.to_string();
        match self.get_raw(namespace, &key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    namespace: namespace.to_string(),
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Whether a record exists at `namespace/key`
    pub fn contains(&self, namespace: &str, key: impl Display) -> Result<bool> {
        Ok(self.get_raw(namespace, &key.to_string())?.is_some())
    }

    /// Stage a typed write
    pub fn put<T: Serialize>(&mut self, namespace: &str, key: impl Display, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.stage(namespace, key.to_string(), Some(bytes));
        Ok(())
    }

    /// Stage a delete
    pub fn delete(&mut self, namespace: &str, key: impl Display) {
        self.stage(namespace, key.to_string(), None);
    }

    /// Read-modify-write of an existing record
    ///
    /// Returns the updated record, or `None` without staging anything when
    /// the record is absent.
    pub fn merge<T, F>(&mut self, namespace: &str, key: impl Display, update: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let key = key.to_string();
        let Some(mut record) = self.get::<T>(namespace, &key)? else {
            return Ok(None);
        };
        update(&mut record);
        self.put(namespace, &key, &record)?;
        Ok(Some(record))
    }

    /// Next id the counter would hand out, without consuming it
    pub fn peek_id(&self, counter: &str) -> Result<u64> {
        Ok(self.get::<u64>(COUNTER_NAMESPACE, counter)?.unwrap_or(1))
    }

    /// Allocate the next id from a monotonic counter (first id is 1)
    pub fn next_id(&mut self, counter: &str) -> Result<u64> {
        let id = self.peek_id(counter)?;
        self.put(COUNTER_NAMESPACE, counter, &(id + 1))?;
        Ok(id)
    }

    /// Staged writes sorted by `(namespace, key)`; `None` marks a delete
    pub fn staged(&self) -> impl Iterator<Item = (&str, &str, Option<&[u8]>)> {
        self.staged
            .iter()
            .map(|((namespace, key), value)| (namespace.as_str(), key.as_str(), value.as_deref()))
    }

    /// Whether nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Consume the overlay into a batch, last write per key wins
    pub fn into_batch(self) -> WriteBatch {
        let Txn {
            mut staged, order, ..
        } = self;
        let mut batch = WriteBatch::new();
        for slot in order {
            let Some(value) = staged.remove(&slot) else {
                continue;
            };
            let (namespace, key) = slot;
            match value {
                Some(bytes) => batch.put(namespace, key, bytes),
                None => batch.delete(namespace, key),
            }
        }
        debug!(ops = batch.len(), "Transaction overlay sealed");
        batch
    }

    fn stage(&mut self, namespace: &str, key: String, value: Option<Vec<u8>>) {
        let slot = (namespace.to_string(), key);
        if !self.staged.contains_key(&slot) {
            self.order.push(slot.clone());
        }
        self.staged.insert(slot, value);
    }
}
