//! Hash-chained audit journal
//!
//! Every successful ledger mutation appends one [`JournalEntry`] inside the
//! same [`Txn`] as the mutation itself, so the journal and the records it
//! describes are committed together or not at all.
//!
//! # Guarantees
//!
//! - Strict ordering: `seq_no` increases by 1 for each entry, starting at 1
//! - Chain continuity: `prev_hash` equals the previous entry's `entry_hash`
//!   (32 zero bytes for the first entry)
//! - Self-consistency: `entry_hash` is the BLAKE3 hash of the entry contents
//! - Record binding: each entry carries a digest of every record its call
//!   wrote, folded into `batch_hash` and from there into `entry_hash`
//! - Append-only: entries are never rewritten by the ledger
//!
//! [`Journal::verify`] walks the whole chain, then checks every record
//! against the digest left by the last entry that wrote it, and reports the
//! first break.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::store::{KvStore, Txn};

/// Namespace holding journal entries keyed by `seq_no`
pub const JOURNAL_NAMESPACE: &str = "journal";

const HEAD_NAMESPACE: &str = "journal_head";
const HEAD_KEY: &str = "head";

/// Hex encoding of the genesis `prev_hash`
pub fn genesis_hash() -> String {
    hex::encode([0u8; 32])
}

/// Hex BLAKE3 hash of a stored record
pub fn record_hash(value: &[u8]) -> String {
    hex::encode(blake3::hash(value).as_bytes())
}

fn update_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Digest of one record written by a journaled call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDigest {
    /// Record namespace
    pub namespace: String,
    /// Record key within the namespace
    pub key: String,
    /// Hash of the written value, `None` for a delete
    pub value_hash: Option<String>,
}

/// Hex BLAKE3 hash over an ordered list of record digests
pub fn batch_hash(writes: &[RecordDigest]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(writes.len() as u64).to_le_bytes());
    for write in writes {
        update_field(&mut hasher, &write.namespace);
        update_field(&mut hasher, &write.key);
        match &write.value_hash {
            Some(value_hash) => {
                hasher.update(&[1]);
                update_field(&mut hasher, value_hash);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    hex::encode(hasher.finalize().as_bytes())
}

fn is_journal_namespace(namespace: &str) -> bool {
    namespace == JOURNAL_NAMESPACE || namespace == HEAD_NAMESPACE
}

/// One journaled mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the chain, starting at 1
    pub seq_no: u64,
    /// Host height at which the call ran
    pub height: u64,
    /// Host time at which the call ran (Unix seconds)
    pub timestamp: u64,
    /// Caller identity
    pub caller: String,
    /// Operation name, e.g. `register_vehicle`
    pub action: String,
    /// Primary entity touched, e.g. `V1` or `V1/3`
    pub subject: String,
    /// Records written by the call, sorted by namespace then key
    pub writes: Vec<RecordDigest>,
    /// Hex BLAKE3 hash of `writes`
    pub batch_hash: String,
    /// Hex BLAKE3 hash of the previous entry
    pub prev_hash: String,
    /// Hex BLAKE3 hash of this entry
    pub entry_hash: String,
}

impl JournalEntry {
    /// Compute the hex BLAKE3 hash over every field except `entry_hash`
    ///
    /// `writes` is covered through `batch_hash`.
    pub fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seq_no.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        for field in [
            &self.caller,
            &self.action,
            &self.subject,
            &self.batch_hash,
            &self.prev_hash,
        ] {
            update_field(&mut hasher, field);
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Check the stored hash against the contents
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }

    /// Check `batch_hash` against the recorded writes
    pub fn verify_batch(&self) -> bool {
        batch_hash(&self.writes) == self.batch_hash
    }
}

/// Fields supplied by the ledger for a new entry
#[derive(Debug, Clone, Copy)]
pub struct JournalDraft<'a> {
    /// Caller identity
    pub caller: &'a str,
    /// Operation name
    pub action: &'a str,
    /// Primary entity touched
    pub subject: &'a str,
    /// Host time
    pub timestamp: u64,
    /// Host height
    pub height: u64,
}

/// Tip of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHead {
    /// Last appended `seq_no`
    pub seq_no: u64,
    /// Hash of the last appended entry
    pub entry_hash: String,
}

/// Journal health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalHealth {
    /// Chain and records verified end to end
    Ok,
    /// Chain is broken or a record no longer matches its entry
    ///
    /// `first_bad_seq_no` is 0 when the chain head itself is unreadable.
    Corrupted {
        /// Last good sequence number
        last_good_seq_no: Option<u64>,
        /// First failing sequence number
        first_bad_seq_no: u64,
        /// Error type description
        error_type: String,
    },
}

impl JournalHealth {
    /// Check if the journal is healthy
    pub fn is_ok(&self) -> bool {
        matches!(self, JournalHealth::Ok)
    }

    fn corrupted(first_bad_seq_no: u64, error_type: String) -> Self {
        error!(
            seq_no = first_bad_seq_no,
            error_type = %error_type,
            "Journal corruption detected"
        );
        JournalHealth::Corrupted {
            last_good_seq_no: first_bad_seq_no.checked_sub(1).filter(|s| *s > 0),
            first_bad_seq_no,
            error_type,
        }
    }
}

/// Journal operations over a transaction or a backend
pub struct Journal;

impl Journal {
    /// Append a new entry to the chain inside `txn`
    ///
    /// The entry records a digest of everything `txn` has staged so far, so
    /// it must be the last write of the call.
    pub fn append(txn: &mut Txn<'_>, draft: JournalDraft<'_>) -> Result<JournalEntry> {
        let head = Self::head(txn)?;
        let (seq_no, prev_hash) = match head {
            Some(head) => (head.seq_no + 1, head.entry_hash),
            None => (1, genesis_hash()),
        };

        let writes: Vec<RecordDigest> = txn
            .staged()
            .filter(|(namespace, _, _)| !is_journal_namespace(namespace))
            .map(|(namespace, key, value)| RecordDigest {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value_hash: value.map(record_hash),
            })
            .collect();

        let mut entry = JournalEntry {
            seq_no,
            height: draft.height,
            timestamp: draft.timestamp,
            caller: draft.caller.to_string(),
            action: draft.action.to_string(),
            subject: draft.subject.to_string(),
            batch_hash: batch_hash(&writes),
            writes,
            prev_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();

        txn.put(JOURNAL_NAMESPACE, seq_no, &entry)?;
        txn.put(
            HEAD_NAMESPACE,
            HEAD_KEY,
            &JournalHead {
                seq_no,
                entry_hash: entry.entry_hash.clone(),
            },
        )?;

        debug!(
            seq_no = seq_no,
            action = %entry.action,
            subject = %entry.subject,
            writes = entry.writes.len(),
            "Journal entry staged"
        );

        Ok(entry)
    }

    /// Current tip, or `None` for an empty journal
    pub fn head(txn: &Txn<'_>) -> Result<Option<JournalHead>> {
        txn.get(HEAD_NAMESPACE, HEAD_KEY)
    }

    /// Number of entries in the journal
    pub fn len(txn: &Txn<'_>) -> Result<u64> {
        Ok(Self::head(txn)?.map(|h| h.seq_no).unwrap_or(0))
    }

    /// Read an entry by sequence number
    pub fn entry(txn: &Txn<'_>, seq_no: u64) -> Result<Option<JournalEntry>> {
        txn.get(JOURNAL_NAMESPACE, seq_no)
    }

    /// Walk the chain from genesis to head, then check stored records
    ///
    /// Verifies:
    /// - Every entry and the head decode
    /// - No entry between 1 and head is missing
    /// - Each entry carries its own sequence number
    /// - Each `prev_hash` matches the previous `entry_hash`
    /// - Each `batch_hash` and `entry_hash` matches the recomputed hash
    /// - The head points at the last entry
    /// - Every journaled record still hashes to the digest left by the last
    ///   entry that wrote it (or is still absent after a delete)
    ///
    /// Undecodable bytes are reported as corruption, not as an error.
    pub fn verify(store: &dyn KvStore) -> Result<JournalHealth> {
        let txn = Txn::new(store);
        let head = match Self::head(&txn) {
            Ok(Some(head)) => head,
            Ok(None) => {
                info!("Journal is empty, continuity check passed");
                return Ok(JournalHealth::Ok);
            }
            Err(StoreError::Corrupt { reason, .. }) => {
                return Ok(JournalHealth::corrupted(
                    0,
                    format!("Undecodable journal head: {}", reason),
                ));
            }
            Err(e) => return Err(e),
        };

        let mut prev_hash = genesis_hash();
        // Latest digest per record, with the seq_no that wrote it
        let mut latest: BTreeMap<(String, String), (u64, Option<String>)> = BTreeMap::new();

        for seq_no in 1..=head.seq_no {
            let entry = match Self::entry(&txn, seq_no) {
                Ok(entry) => entry,
                Err(StoreError::Corrupt { reason, .. }) => {
                    return Ok(JournalHealth::corrupted(
                        seq_no,
                        format!("Undecodable entry at seq_no {}: {}", seq_no, reason),
                    ));
                }
                Err(e) => return Err(e),
            };

            let failure = match entry {
                None => Some(format!("Missing entry at seq_no {}", seq_no)),
                Some(entry) if entry.seq_no != seq_no => Some(format!(
                    "Sequence mismatch: slot {} holds seq_no {}",
                    seq_no, entry.seq_no
                )),
                Some(entry) if entry.prev_hash != prev_hash => Some(format!(
                    "Hash mismatch at seq_no {}: expected prev_hash {}, got {}",
                    seq_no, prev_hash, entry.prev_hash
                )),
                Some(entry) if !entry.verify_batch() => {
                    Some(format!("Batch hash mismatch at seq_no {}", seq_no))
                }
                Some(entry) if !entry.verify_hash() => {
                    Some(format!("Entry hash mismatch at seq_no {}", seq_no))
                }
                Some(entry) => {
                    for write in entry.writes {
                        latest.insert((write.namespace, write.key), (seq_no, write.value_hash));
                    }
                    prev_hash = entry.entry_hash;
                    None
                }
            };

            if let Some(error_type) = failure {
                return Ok(JournalHealth::corrupted(seq_no, error_type));
            }
        }

        if head.entry_hash != prev_hash {
            let error_type = format!("Head hash does not match entry {}", head.seq_no);
            error!(error_type = %error_type, "Journal corruption detected");
            return Ok(JournalHealth::Corrupted {
                last_good_seq_no: Some(head.seq_no),
                first_bad_seq_no: head.seq_no,
                error_type,
            });
        }

        // Report the mismatch with the oldest writer
        let mut first_mismatch: Option<(u64, String)> = None;
        for ((namespace, key), (seq_no, expected)) in &latest {
            let actual = store.get(namespace, key)?.map(|value| record_hash(&value));
            if actual == *expected {
                continue;
            }
            if first_mismatch.as_ref().map_or(true, |(first, _)| seq_no < first) {
                first_mismatch = Some((
                    *seq_no,
                    format!(
                        "Record mismatch at {}/{}: written by seq_no {}",
                        namespace, key, seq_no
                    ),
                ));
            }
        }
        if let Some((seq_no, error_type)) = first_mismatch {
            return Ok(JournalHealth::corrupted(seq_no, error_type));
        }

        info!(
            entry_count = head.seq_no,
            record_count = latest.len(),
            "Journal continuity check passed"
        );

        Ok(JournalHealth::Ok)
    }
}
