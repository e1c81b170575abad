// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite record repository.
//
// Schema:
//   secure_records(
//     id                   INTEGER PRIMARY KEY AUTOINCREMENT,  -- chain order
//     process_id           TEXT    NOT NULL,
//     user_id              TEXT    NOT NULL,
//     created_at           TEXT    NOT NULL,   -- RFC 3339, microseconds
//     encrypted_data       BLOB    NOT NULL,
//     encryption_nonce     BLOB    NOT NULL,
//     encryption_tag       BLOB    NOT NULL,
//     key_version          INTEGER NOT NULL,
//     system_key_id        TEXT    NOT NULL,
//     process_key_hash     TEXT    NOT NULL,
//     data_signature       TEXT    NOT NULL,   -- hex
//     signature_public_key TEXT    NOT NULL,   -- hex
//     record_type          TEXT    NOT NULL,
//     status               TEXT,
//     prev_record_hash     TEXT    NOT NULL,
//     chain_hash           TEXT    NOT NULL
//   )
//
// Appends run inside a `BEGIN IMMEDIATE` transaction, which takes the SQLite
// write lock before the tail is read.  The unique (process_id,
// prev_record_hash) index rejects sibling records outright should any writer
// bypass that path.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ledgerwerk_core::error::{LedgerError, Result};
use ledgerwerk_core::types::{GENESIS_HASH, RecordId, RecordType, SecureRecord};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info, instrument};

use crate::repository::{PendingRecord, RecordRepository};

const CREATE_SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS secure_records (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        process_id           TEXT    NOT NULL,
        user_id              TEXT    NOT NULL,
        created_at           TEXT    NOT NULL,
        encrypted_data       BLOB    NOT NULL,
        encryption_nonce     BLOB    NOT NULL,
        encryption_tag       BLOB    NOT NULL,
        key_version          INTEGER NOT NULL,
        system_key_id        TEXT    NOT NULL,
        process_key_hash     TEXT    NOT NULL,
        data_signature       TEXT    NOT NULL,
        signature_public_key TEXT    NOT NULL,
        record_type          TEXT    NOT NULL,
        status               TEXT,
        prev_record_hash     TEXT    NOT NULL,
        chain_hash           TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_secure_records_process
        ON secure_records (process_id, id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_secure_records_link
        ON secure_records (process_id, prev_record_hash);
"#;

const SELECT_COLUMNS: &str = "id, process_id, user_id, created_at, encrypted_data, \
     encryption_nonce, encryption_tag, key_version, system_key_id, process_key_hash, \
     data_signature, signature_public_key, record_type, status, prev_record_hash, chain_hash";

/// How long a writer waits on the SQLite lock before reporting an error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert a `rusqlite::Error` into a `LedgerError::Persistence`.
fn db_err(e: rusqlite::Error) -> LedgerError {
    LedgerError::Persistence(e.to_string())
}

/// Append-only record repository backed by SQLite.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so connections sit
/// behind mutexes.  File-backed databases get a second, read-only
/// connection so verification scans do not queue behind writers (WAL lets
/// them proceed concurrently).  In-memory databases share one connection.
pub struct SqliteRepository {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the record database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let writer = Connection::open(path).map_err(db_err)?;
        writer
            .pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        writer.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        writer.execute_batch(CREATE_SCHEMA_SQL).map_err(db_err)?;

        let reader = Connection::open(path).map_err(db_err)?;
        reader.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        reader
            .pragma_update(None, "query_only", true)
            .map_err(db_err)?;

        info!("record database opened");
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_SCHEMA_SQL).map_err(db_err)?;
        debug!("in-memory record database opened");
        Ok(Self {
            writer: Mutex::new(conn),
            reader: None,
        })
    }

    fn write_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| LedgerError::Persistence("writer connection lock poisoned".into()))
    }

    fn read_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        match &self.reader {
            Some(reader) => reader
                .lock()
                .map_err(|_| LedgerError::Persistence("reader connection lock poisoned".into())),
            None => self.write_conn(),
        }
    }
}

fn tail_hash(conn: &Connection, process_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT chain_hash FROM secure_records
         WHERE process_id = ?1
         ORDER BY id DESC
         LIMIT 1",
        params![process_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SecureRecord> {
    let created_at: String = row.get(3)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let record_type: String = row.get(12)?;

    Ok(SecureRecord {
        id: row.get(0)?,
        process_id: row.get(1)?,
        user_id: row.get(2)?,
        created_at,
        encrypted_data: row.get(4)?,
        encryption_nonce: row.get(5)?,
        encryption_tag: row.get(6)?,
        key_version: row.get(7)?,
        system_key_id: row.get(8)?,
        process_key_hash: row.get(9)?,
        data_signature: row.get(10)?,
        signature_public_key: row.get(11)?,
        record_type: RecordType::from(record_type),
        status: row.get(13)?,
        prev_record_hash: row.get(14)?,
        chain_hash: row.get(15)?,
    })
}

impl RecordRepository for SqliteRepository {
    #[instrument(skip_all, fields(process_id = %pending.process_id))]
    fn append(&self, pending: PendingRecord) -> Result<SecureRecord> {
        let mut conn = self.write_conn()?;
        // Dropping the transaction without commit rolls it back, so a failed
        // insert never leaves a visible row.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let prev_hash =
            tail_hash(&tx, &pending.process_id)?.unwrap_or_else(|| GENESIS_HASH.to_owned());
        let chain_hash = pending.chain_hash_after(&prev_hash);
        let created_at = pending
            .created_at
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        tx.execute(
            "INSERT INTO secure_records (process_id, user_id, created_at, encrypted_data,
             encryption_nonce, encryption_tag, key_version, system_key_id, process_key_hash,
             data_signature, signature_public_key, record_type, status, prev_record_hash,
             chain_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                pending.process_id,
                pending.user_id,
                created_at,
                pending.encrypted_data,
                pending.encryption_nonce,
                pending.encryption_tag,
                pending.key_version,
                pending.system_key_id,
                pending.process_key_hash,
                pending.data_signature,
                pending.signature_public_key,
                pending.record_type.as_str(),
                pending.status,
                prev_hash,
                chain_hash,
            ],
        )
        .map_err(db_err)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err)?;

        debug!(record_id = id, "record appended");
        Ok(pending.into_record(id, prev_hash, chain_hash))
    }

    fn latest_chain_hash(&self, process_id: &str) -> Result<Option<String>> {
        let conn = self.read_conn()?;
        tail_hash(&conn, process_id)
    }

    fn get(&self, id: RecordId) -> Result<Option<SecureRecord>> {
        let conn = self.read_conn()?;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM secure_records WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    fn visit_process(
        &self,
        process_id: &str,
        visitor: &mut dyn FnMut(SecureRecord) -> Result<()>,
    ) -> Result<()> {
        let conn = self.read_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM secure_records
                 WHERE process_id = ?1
                 ORDER BY id ASC"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![process_id], row_to_record)
            .map_err(db_err)?;
        for row in rows {
            visitor(row.map_err(db_err)?)?;
        }
        Ok(())
    }

    fn process_ids(&self) -> Result<Vec<String>> {
        let conn = self.read_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT process_id FROM secure_records
                 GROUP BY process_id
                 ORDER BY MIN(id) ASC",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(db_err)?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(db_err)?);
        }
        Ok(ids)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.read_conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM secure_records", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("separate_reader", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(process_id: &str, signature: &str) -> PendingRecord {
        PendingRecord {
            process_id: process_id.into(),
            user_id: "alice".into(),
            created_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00.123456Z")
                .unwrap()
                .with_timezone(&Utc),
            encrypted_data: vec![1, 2, 3],
            encryption_nonce: vec![0; 12],
            encryption_tag: vec![9; 16],
            key_version: 1,
            system_key_id: "sk".into(),
            process_key_hash: "ph".into(),
            data_signature: signature.into(),
            signature_public_key: "pk".into(),
            record_type: RecordType::DiscussionComment,
            status: Some("submitted".into()),
        }
    }

    #[test]
    fn first_record_links_to_genesis() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let record = repo.append(pending("P1", "aa")).unwrap();
        assert_eq!(record.prev_record_hash, GENESIS_HASH);
        assert_eq!(repo.latest_chain_hash("P1").unwrap(), Some(record.chain_hash));
        assert_eq!(repo.latest_chain_hash("P2").unwrap(), None);
    }

    #[test]
    fn appends_link_per_process() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let a1 = repo.append(pending("A", "01")).unwrap();
        let b1 = repo.append(pending("B", "02")).unwrap();
        let a2 = repo.append(pending("A", "03")).unwrap();

        assert_eq!(a2.prev_record_hash, a1.chain_hash);
        assert_eq!(b1.prev_record_hash, GENESIS_HASH);
        assert!(a1.id < b1.id && b1.id < a2.id);
        assert_eq!(repo.process_ids().unwrap(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(repo.count().unwrap(), 3);
    }

    #[test]
    fn stored_row_reads_back_identically() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let record = repo.append(pending("P1", "ab")).unwrap();
        let fetched = repo.get(record.id).unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(repo.get(record.id + 100).unwrap().is_none());
    }

    #[test]
    fn records_stream_in_id_order() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        for i in 0..5 {
            repo.append(pending("P1", &format!("{i:02}"))).unwrap();
        }
        let records = repo.records_for_process("P1").unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.windows(2).all(|w| w[0].id < w[1].id));
        assert!(records.windows(2).all(|w| w[1].prev_record_hash == w[0].chain_hash));
    }

    #[test]
    fn visitor_error_stops_the_scan() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.append(pending("P1", "01")).unwrap();
        repo.append(pending("P1", "02")).unwrap();

        let mut seen = 0;
        let result = repo.visit_process("P1", &mut |_| {
            seen += 1;
            Err(LedgerError::Persistence("stop".into()))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let first = {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.append(pending("P1", "01")).unwrap()
        };
        let repo = SqliteRepository::open(&path).unwrap();
        let second = repo.append(pending("P1", "02")).unwrap();
        assert_eq!(second.prev_record_hash, first.chain_hash);
        assert_eq!(repo.count().unwrap(), 2);
    }
}
