use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use tavern_shared::{Coins, WalletOwner};

use crate::convert::{parse_owner, parse_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Wallet;
use crate::tx::StoreTx;

impl StoreTx<'_> {
    /// Look up a wallet row without creating it.
    pub fn get_wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>> {
        self.conn
            .query_row(
                "SELECT owner, balance, cap, created_at, updated_at
                 FROM wallets WHERE owner = ?1",
                params![owner.to_key()],
                row_to_wallet,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Fetch a wallet, creating a zero-balance row on first touch.
    pub fn get_or_create_wallet(&self, owner: WalletOwner) -> Result<Wallet> {
        if let Some(wallet) = self.get_wallet(owner)? {
            return Ok(wallet);
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO wallets (owner, balance, cap, created_at, updated_at)
             VALUES (?1, 0, NULL, ?2, ?2)",
            params![owner.to_key(), now.to_rfc3339()],
        )?;

        tracing::debug!(wallet = %owner, "created wallet");

        Ok(Wallet {
            owner,
            balance: 0,
            cap: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a signed balance delta. The caller is responsible for having
    /// validated the resulting balance; this only moves the number.
    pub fn adjust_balance(&self, owner: WalletOwner, delta: Coins) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE wallets SET balance = balance + ?2, updated_at = ?3 WHERE owner = ?1",
            params![owner.to_key(), delta, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Set or clear a per-wallet cap override.
    pub fn set_wallet_cap(&self, owner: WalletOwner, cap: Option<Coins>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE wallets SET cap = ?2, updated_at = ?3 WHERE owner = ?1",
            params![owner.to_key(), cap, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl Database {
    /// Read a wallet. Absent wallets read as zero balance without being
    /// created; creation happens on the first write that touches them.
    pub fn wallet(&self, owner: WalletOwner) -> Result<Wallet> {
        self.view(|tx| {
            Ok(tx.get_wallet(owner)?.unwrap_or(Wallet {
                owner,
                balance: 0,
                cap: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        })
    }
}

fn row_to_wallet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Wallet> {
    let owner_str: String = row.get(0)?;
    let balance: Coins = row.get(1)?;
    let cap: Option<Coins> = row.get(2)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;

    Ok(Wallet {
        owner: parse_owner(0, &owner_str)?,
        balance,
        cap,
        created_at: parse_ts(3, &created_str)?,
        updated_at: parse_ts(4, &updated_str)?,
    })
}
