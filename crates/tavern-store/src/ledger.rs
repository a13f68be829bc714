//! Persistence for ledger transactions and their entries.
//!
//! Rows are append-only: committed transactions are immutable and never
//! deleted (audit requirement). Balance mutations live in `wallets`; this
//! module only records what happened.

use rusqlite::params;
use uuid::Uuid;

use tavern_shared::metadata::Metadata;
use tavern_shared::{
    Coins, EntryDirection, TransactionKind, TransactionStatus, WalletOwner,
};

use crate::convert::{bad_enum, parse_owner, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{LedgerEntry, LedgerTransaction};
use crate::tx::StoreTx;

impl StoreTx<'_> {
    /// Persist a transaction and all of its entries.
    pub fn insert_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ledger_transactions
                 (id, kind, idempotency_key, trigger_tag, channel, metadata, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tx.id.to_string(),
                tx.kind.as_str(),
                tx.idempotency_key,
                tx.trigger,
                tx.channel,
                serde_json::to_string(&tx.metadata)?,
                tx.status.as_str(),
                tx.created_at.to_rfc3339(),
            ],
        )?;

        for (position, entry) in tx.entries.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO ledger_entries
                     (transaction_id, position, wallet, direction, amount, memo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tx.id.to_string(),
                    position as i64,
                    entry.wallet.to_key(),
                    entry.direction.as_str(),
                    entry.amount,
                    entry.memo,
                ],
            )?;
        }

        Ok(())
    }

    /// Load one transaction with its entries.
    pub fn get_transaction(&self, id: Uuid) -> Result<LedgerTransaction> {
        let mut tx = self
            .conn
            .query_row(
                "SELECT id, kind, idempotency_key, trigger_tag, channel, metadata, status, created_at
                 FROM ledger_transactions WHERE id = ?1",
                params![id.to_string()],
                row_to_transaction,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        tx.entries = self.entries_for(id)?;
        Ok(tx)
    }

    /// Transactions that touched the given wallet, newest first.
    pub fn history(&self, owner: WalletOwner, limit: u32) -> Result<Vec<LedgerTransaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, idempotency_key, trigger_tag, channel, metadata, status, created_at
             FROM ledger_transactions
             WHERE id IN (SELECT transaction_id FROM ledger_entries WHERE wallet = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![owner.to_key(), limit], row_to_transaction)?;

        let mut transactions = Vec::new();
        for row in rows {
            let mut tx = row?;
            tx.entries = self.entries_for(tx.id)?;
            transactions.push(tx);
        }
        Ok(transactions)
    }

    fn entries_for(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet, direction, amount, memo
             FROM ledger_entries WHERE transaction_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![transaction_id.to_string()], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl Database {
    pub fn get_transaction(&self, id: Uuid) -> Result<LedgerTransaction> {
        self.view(|tx| tx.get_transaction(id))
    }

    pub fn transaction_history(
        &self,
        owner: WalletOwner,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>> {
        self.view(|tx| tx.history(owner, limit))
    }
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerTransaction> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let idempotency_key: Option<String> = row.get(2)?;
    let trigger: String = row.get(3)?;
    let channel: String = row.get(4)?;
    let metadata_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let ts_str: String = row.get(7)?;

    let metadata: Metadata = serde_json::from_str(&metadata_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(LedgerTransaction {
        id: parse_uuid(0, &id_str)?,
        kind: TransactionKind::from_str(&kind_str).ok_or_else(|| bad_enum(1, &kind_str))?,
        entries: Vec::new(),
        idempotency_key,
        trigger,
        channel,
        metadata,
        status: TransactionStatus::from_str(&status_str)
            .ok_or_else(|| bad_enum(6, &status_str))?,
        created_at: parse_ts(7, &ts_str)?,
    })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let wallet_str: String = row.get(0)?;
    let direction_str: String = row.get(1)?;
    let amount: Coins = row.get(2)?;
    let memo: Option<String> = row.get(3)?;

    Ok(LedgerEntry {
        wallet: parse_owner(0, &wallet_str)?,
        direction: EntryDirection::from_str(&direction_str)
            .ok_or_else(|| bad_enum(1, &direction_str))?,
        amount,
        memo,
    })
}
