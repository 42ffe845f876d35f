//! SQLite-backed record store
//!
//! Every namespace shares one `kv_records` table keyed by
//! `(namespace, key)`. Batches are applied inside a single SQLite
//! transaction, so a failed commit leaves the previous state intact.
//! WAL mode is enabled for crash recovery.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::{KvStore, WriteBatch, WriteOp};

/// Durable [`KvStore`] on top of a SQLite database file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create or open a store at the specified path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening record store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::init_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (namespace, key)
            );
            "#,
        )?;

        Ok(())
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(self.conn.path().unwrap_or(""))
    }

    /// Execute raw SQL for testing purposes only
    ///
    /// **WARNING**: bypasses the batch commit path. Only used by tests that
    /// simulate on-disk tampering.
    #[doc(hidden)]
    pub fn __test_execute_raw_sql(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM kv_records WHERE namespace = ?1 AND key = ?2")?;

        let value = stmt
            .query_row(params![namespace, key], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;

        Ok(value)
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let op_count = batch.len();
        let tx = self.conn.transaction()?;

        for op in batch {
            match op {
                WriteOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    tx.execute(
                        r#"
                        INSERT INTO kv_records (namespace, key, value)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(namespace, key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = strftime('%s', 'now')
                        "#,
                        params![namespace, key, value],
                    )?;
                }
                WriteOp::Delete { namespace, key } => {
                    tx.execute(
                        "DELETE FROM kv_records WHERE namespace = ?1 AND key = ?2",
                        params![namespace, key],
                    )?;
                }
            }
        }

        tx.commit()?;

        debug!(ops = op_count, "Batch committed to SQLite");

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
