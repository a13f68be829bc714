//! Idempotency records: caller-supplied keys mapped to the transaction they
//! produced. Lookups happen inside the same SQL transaction as the commit,
//! so check-then-act cannot race.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tavern_shared::constants::IDEMPOTENCY_RETENTION_DAYS;

use crate::convert::parse_ts;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::IdempotencyRecord;
use crate::tx::StoreTx;

impl StoreTx<'_> {
    pub fn find_idempotency(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.conn
            .query_row(
                "SELECT key, transaction_id, created_at, expires_at
                 FROM idempotency_records WHERE key = ?1",
                params![key],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Record a key as processed, pointing at its transaction.
    pub fn record_idempotency(&self, key: &str, transaction_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let expires = now + Duration::days(IDEMPOTENCY_RETENTION_DAYS);
        self.conn.execute(
            "INSERT INTO idempotency_records (key, transaction_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                transaction_id.to_string(),
                now.to_rfc3339(),
                expires.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl Database {
    /// Garbage-collect records past their retention window.
    ///
    /// The business guarantees no replays arrive after the window, so the
    /// key becomes reusable; the transactions themselves are never touched.
    pub fn purge_expired_idempotency(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM idempotency_records WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired idempotency records");
        }
        Ok(removed)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdempotencyRecord> {
    let key: String = row.get(0)?;
    let tx_id_str: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let expires_str: String = row.get(3)?;

    Ok(IdempotencyRecord {
        key,
        transaction_id: crate::convert::parse_uuid(1, &tx_id_str)?,
        created_at: parse_ts(2, &created_str)?,
        expires_at: parse_ts(3, &expires_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn record_and_find() {
        let (_dir, mut db) = test_db();
        let tx_id = Uuid::new_v4();

        db.with_tx::<_, StoreError>(|tx| {
            assert!(tx.find_idempotency("k").unwrap().is_none());
            tx.record_idempotency("k", tx_id)?;
            Ok(())
        })
        .unwrap();

        db.view::<_, StoreError>(|tx| {
            let record = tx.find_idempotency("k").unwrap().unwrap();
            assert_eq!(record.transaction_id, tx_id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn purge_respects_retention() {
        let (_dir, mut db) = test_db();
        db.with_tx::<_, StoreError>(|tx| tx.record_idempotency("k", Uuid::new_v4()))
            .unwrap();

        // Still inside the retention window: nothing removed.
        assert_eq!(db.purge_expired_idempotency(Utc::now()).unwrap(), 0);

        let past_window = Utc::now() + Duration::days(IDEMPOTENCY_RETENTION_DAYS + 1);
        assert_eq!(db.purge_expired_idempotency(past_window).unwrap(), 1);

        db.view::<_, StoreError>(|tx| {
            assert!(tx.find_idempotency("k").unwrap().is_none());
            Ok(())
        })
        .unwrap();
    }
}
