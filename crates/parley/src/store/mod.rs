use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;

use crate::models::GenericValue;
use crate::utils::time::now_utc_rfc3339;

pub const STORE_SCHEMA_VERSION: &str = "parley.kv.v1";
pub const RECORDS_TABLE: &str = "conversation_records";
pub const INGEST_RUNS_TABLE: &str = "ingest_runs";
pub const SCHEMA_META_TABLE: &str = "store_schema_meta";
pub const DEFAULT_LIST_LIMIT: usize = 100;

const CREATE_RECORDS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_records (
    record_key BLOB NOT NULL PRIMARY KEY,
    record_value BLOB NOT NULL,
    source_path TEXT NOT NULL,
    ingest_run_id TEXT NOT NULL,
    stored_at_utc TEXT NOT NULL
) WITHOUT ROWID;
"#;

const CREATE_INGEST_RUNS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_runs (
    ingest_run_id TEXT NOT NULL PRIMARY KEY,
    started_at_utc TEXT NOT NULL,
    finished_at_utc TEXT,
    status TEXT NOT NULL,
    source_dir TEXT NOT NULL,
    files_seen INTEGER NOT NULL DEFAULT 0,
    records_stored INTEGER NOT NULL DEFAULT 0,
    files_failed INTEGER NOT NULL DEFAULT 0,
    failure_counts_json TEXT NOT NULL DEFAULT '{}',
    CHECK (status IN ('running', 'success', 'partial_failure', 'failed')),
    CHECK (files_seen >= 0),
    CHECK (records_stored >= 0),
    CHECK (files_failed >= 0)
);
"#;

const CREATE_META_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_schema_meta (
    schema_version TEXT NOT NULL,
    applied_at_utc TEXT NOT NULL
);
"#;

#[must_use]
pub fn schema_statements() -> &'static [&'static str] {
    &[
        CREATE_RECORDS_TABLE_SQL,
        CREATE_INGEST_RUNS_TABLE_SQL,
        CREATE_META_TABLE_SQL,
    ]
}

/// One encoded conversation waiting for its write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub key: String,
    pub value: Vec<u8>,
    pub source_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    PartialFailure,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTotals {
    pub files_seen: usize,
    pub records_stored: usize,
    pub files_failed: usize,
    pub failure_counts_json: String,
}

/// Handle on the embedded key-value store. The connection is released when
/// the handle is closed or dropped, which also rolls back any transaction
/// left open by an early return.
#[derive(Debug)]
pub struct ConversationStore {
    connection: Connection,
}

impl ConversationStore {
    /// Opens (creating if needed) the store for writing and ensures its schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store parent directory: {}", parent.display())
            })?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open store: {}", path.display()))?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Opens an existing store without creating or migrating anything.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("store does not exist: {}", path.display()));
        }
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open store read-only: {}", path.display()))?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(&schema_statements().join("\n"))
            .context("failed to create store schema")?;

        if self.schema_meta_has_version(STORE_SCHEMA_VERSION)? {
            return Ok(());
        }

        let applied_at_utc = now_utc_rfc3339()?;
        self.connection
            .execute(
                &format!(
                    "INSERT INTO {SCHEMA_META_TABLE} (schema_version, applied_at_utc) VALUES (?1, ?2)"
                ),
                params![STORE_SCHEMA_VERSION, applied_at_utc],
            )
            .context("failed to write store schema meta row")?;
        Ok(())
    }

    fn schema_meta_has_version(&self, schema_version: &str) -> Result<bool> {
        let exists = self
            .connection
            .query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {SCHEMA_META_TABLE} WHERE schema_version = ?1 LIMIT 1)"
                ),
                [schema_version],
                |row| row.get::<usize, i64>(0),
            )
            .context("failed to query store schema version metadata")?;
        Ok(exists != 0)
    }

    /// Writes every record inside one transaction. Any failure rolls the
    /// whole batch back; a repeated key overwrites the earlier value.
    pub fn put_batch(&mut self, ingest_run_id: &str, records: &[StagedRecord]) -> Result<usize> {
        let stored_at_utc = now_utc_rfc3339()?;
        let upsert_sql = format!(
            "INSERT INTO {RECORDS_TABLE} (record_key, record_value, source_path, ingest_run_id, stored_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(record_key) DO UPDATE SET
                 record_value = excluded.record_value,
                 source_path = excluded.source_path,
                 ingest_run_id = excluded.ingest_run_id,
                 stored_at_utc = excluded.stored_at_utc"
        );

        let tx = self
            .connection
            .transaction()
            .context("failed to open store write transaction")?;
        {
            let mut statement = tx
                .prepare_cached(&upsert_sql)
                .context("failed to prepare store upsert statement")?;
            for record in records {
                statement
                    .execute(params![
                        record.key.as_bytes(),
                        record.value,
                        record.source_path,
                        ingest_run_id,
                        stored_at_utc,
                    ])
                    .with_context(|| format!("failed to write record key={}", record.key))?;
            }
        }
        tx.commit()
            .context("failed to commit store write transaction")?;

        Ok(records.len())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.connection
            .query_row(
                &format!("SELECT record_value FROM {RECORDS_TABLE} WHERE record_key = ?1"),
                [key.as_bytes()],
                |row| row.get::<usize, Vec<u8>>(0),
            )
            .optional()
            .with_context(|| format!("failed to read record key={key}"))
    }

    pub fn get_value(&self, key: &str) -> Result<Option<GenericValue>> {
        self.get_raw(key)?
            .map(|bytes| {
                GenericValue::from_canonical_bytes(&bytes)
                    .with_context(|| format!("stored record key={key} is not canonical JSON"))
            })
            .transpose()
    }

    pub fn source_path(&self, key: &str) -> Result<Option<String>> {
        self.connection
            .query_row(
                &format!("SELECT source_path FROM {RECORDS_TABLE} WHERE record_key = ?1"),
                [key.as_bytes()],
                |row| row.get::<usize, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read source path for key={key}"))
    }

    /// Keys in byte order, decoded lossily for display.
    pub fn keys(&self, limit: usize) -> Result<Vec<String>> {
        let mut statement = self
            .connection
            .prepare(&format!(
                "SELECT record_key FROM {RECORDS_TABLE} ORDER BY record_key LIMIT ?1"
            ))
            .context("failed to prepare store key listing")?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map([limit], |row| row.get::<usize, Vec<u8>>(0))
            .context("failed to list store keys")?;

        let mut keys = Vec::new();
        for row in rows {
            let key = row.context("failed to decode store key row")?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    pub fn count(&self) -> Result<usize> {
        let count = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM {RECORDS_TABLE}"), [], |row| {
                row.get::<usize, i64>(0)
            })
            .context("failed to count store records")?;
        usize::try_from(count).map_err(|_| anyhow!("store record count is negative"))
    }

    pub fn begin_run(
        &self,
        ingest_run_id: &str,
        started_at_utc: &str,
        source_dir: &str,
    ) -> Result<()> {
        self.connection
            .execute(
                &format!(
                    "INSERT INTO {INGEST_RUNS_TABLE} (ingest_run_id, started_at_utc, status, source_dir)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    ingest_run_id,
                    started_at_utc,
                    RunStatus::Running.as_str(),
                    source_dir
                ],
            )
            .with_context(|| format!("failed to insert ingest run row: {ingest_run_id}"))?;
        Ok(())
    }

    pub fn finish_run(
        &self,
        ingest_run_id: &str,
        status: RunStatus,
        finished_at_utc: &str,
        totals: &RunTotals,
    ) -> Result<()> {
        self.connection
            .execute(
                &format!(
                    "UPDATE {INGEST_RUNS_TABLE}
                     SET finished_at_utc = ?2,
                         status = ?3,
                         files_seen = ?4,
                         records_stored = ?5,
                         files_failed = ?6,
                         failure_counts_json = ?7
                     WHERE ingest_run_id = ?1"
                ),
                params![
                    ingest_run_id,
                    finished_at_utc,
                    status.as_str(),
                    to_i64(totals.files_seen, "files_seen")?,
                    to_i64(totals.records_stored, "records_stored")?,
                    to_i64(totals.files_failed, "files_failed")?,
                    totals.failure_counts_json,
                ],
            )
            .with_context(|| format!("failed to finalize ingest run row: {ingest_run_id}"))?;
        Ok(())
    }

    pub fn run_status(&self, ingest_run_id: &str) -> Result<Option<String>> {
        self.connection
            .query_row(
                &format!("SELECT status FROM {INGEST_RUNS_TABLE} WHERE ingest_run_id = ?1"),
                [ingest_run_id],
                |row| row.get::<usize, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read ingest run status: {ingest_run_id}"))
    }

    pub fn close(self) -> Result<()> {
        self.connection
            .close()
            .map_err(|(_, error)| error)
            .context("failed to close store")
    }
}

fn to_i64(value: usize, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{field} exceeds sqlite INTEGER range"))
}

#[cfg(test)]
mod tests {
    use super::{
        ConversationStore, INGEST_RUNS_TABLE, RECORDS_TABLE, SCHEMA_META_TABLE,
        STORE_SCHEMA_VERSION, StagedRecord,
    };

    fn staged(key: &str, value: &str) -> StagedRecord {
        StagedRecord {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
            source_path: format!("/tmp/{key}.yaml"),
        }
    }

    fn table_exists(store: &ConversationStore, table_name: &str) -> bool {
        store
            .connection
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
                [table_name],
                |_| Ok(()),
            )
            .is_ok()
    }

    #[test]
    fn open_creates_key_value_and_run_tables() {
        let store = ConversationStore::open_in_memory().expect("in-memory store should open");

        assert!(table_exists(&store, RECORDS_TABLE));
        assert!(table_exists(&store, INGEST_RUNS_TABLE));
        assert!(table_exists(&store, SCHEMA_META_TABLE));
        assert_eq!(store.count().expect("count should succeed"), 0);
    }

    #[test]
    fn schema_version_row_is_written_once() {
        let store = ConversationStore::open_in_memory().expect("in-memory store should open");
        store.ensure_schema().expect("second ensure should succeed");

        let count: i64 = store
            .connection
            .query_row(
                &format!("SELECT COUNT(*) FROM {SCHEMA_META_TABLE} WHERE schema_version = ?1"),
                [STORE_SCHEMA_VERSION],
                |row| row.get(0),
            )
            .expect("schema meta query should succeed");
        assert_eq!(count, 1);
    }

    #[test]
    fn repeated_keys_in_one_batch_keep_the_last_value() {
        let mut store = ConversationStore::open_in_memory().expect("in-memory store should open");
        let written = store
            .put_batch("run-1", &[staged("c1", "\"first\""), staged("c1", "\"second\"")])
            .expect("batch should commit");

        assert_eq!(written, 2);
        assert_eq!(store.count().expect("count should succeed"), 1);
        assert_eq!(
            store.get_raw("c1").expect("read should succeed"),
            Some(b"\"second\"".to_vec())
        );
    }

    #[test]
    fn missing_keys_read_as_none() {
        let store = ConversationStore::open_in_memory().expect("in-memory store should open");
        assert_eq!(store.get_raw("absent").expect("read should succeed"), None);
        assert_eq!(store.get_value("absent").expect("read should succeed"), None);
    }
}
