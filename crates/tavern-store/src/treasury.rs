//! Treasury counter persistence.
//!
//! The treasury's coin balance lives in the `wallets` table like any other
//! wallet; this module manages the singleton counter row: the daily spend
//! limit, the spent-today accumulator, and the global default wallet cap.

use chrono::NaiveDate;
use rusqlite::params;

use tavern_shared::{Coins, WalletOwner};

use crate::convert::{date_str, parse_date};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Treasury;
use crate::tx::StoreTx;

impl StoreTx<'_> {
    /// Load the treasury: counter row joined with the treasury wallet balance.
    pub fn treasury(&self) -> Result<Treasury> {
        let balance = self
            .get_wallet(WalletOwner::Treasury)?
            .ok_or(StoreError::NotFound)?
            .balance;

        self.conn
            .query_row(
                "SELECT daily_spend_limit, today_spent, day_start, wallet_cap_amount
                 FROM treasury WHERE id = 1",
                [],
                |row| {
                    let daily_spend_limit: Coins = row.get(0)?;
                    let today_spent: Coins = row.get(1)?;
                    let day_str: String = row.get(2)?;
                    let wallet_cap_amount: Coins = row.get(3)?;
                    Ok(Treasury {
                        balance,
                        daily_spend_limit,
                        today_spent,
                        day_start: parse_date(2, &day_str)?,
                        wallet_cap_amount,
                    })
                },
            )
            .map_err(StoreError::Sqlite)
    }

    /// Roll the daily window forward if `today` is past the stored one.
    ///
    /// Compare-and-swap on `day_start`: a second caller in the same window
    /// matches zero rows, so the reset is idempotent and two first-funders
    /// of the day cannot both zero the counter.
    pub fn roll_treasury_day(&self, today: NaiveDate) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE treasury SET today_spent = 0, day_start = ?1
             WHERE id = 1 AND day_start < ?1",
            params![date_str(today)],
        )?;
        if affected > 0 {
            tracing::info!(day = %today, "treasury daily window reset");
        }
        Ok(affected > 0)
    }

    /// Bump the spent-today accumulator after a funded debit.
    pub fn add_today_spent(&self, amount: Coins) -> Result<()> {
        self.conn.execute(
            "UPDATE treasury SET today_spent = today_spent + ?1 WHERE id = 1",
            params![amount],
        )?;
        Ok(())
    }

    /// Admin override of the daily bot-funding limit.
    pub fn set_daily_spend_limit(&self, limit: Coins) -> Result<()> {
        self.conn.execute(
            "UPDATE treasury SET daily_spend_limit = ?1 WHERE id = 1",
            params![limit],
        )?;
        Ok(())
    }

    /// Admin override of the global default user-wallet cap.
    pub fn set_wallet_cap_amount(&self, cap: Coins) -> Result<()> {
        self.conn.execute(
            "UPDATE treasury SET wallet_cap_amount = ?1 WHERE id = 1",
            params![cap],
        )?;
        Ok(())
    }
}

impl Database {
    pub fn treasury(&self) -> Result<Treasury> {
        self.view(|tx| tx.treasury())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn seeded_row_is_readable() {
        let (_dir, db) = test_db();
        let treasury = db.treasury().unwrap();
        assert!(treasury.balance > 0);
        assert!(treasury.daily_spend_limit > 0);
        assert_eq!(treasury.today_spent, 0);
    }

    #[test]
    fn day_roll_is_idempotent() {
        let (_dir, mut db) = test_db();
        let today = Utc::now().date_naive();

        db.with_tx::<_, StoreError>(|tx| {
            tx.add_today_spent(120)?;
            // First roll of the day resets the accumulator.
            assert!(tx.roll_treasury_day(today).unwrap());
            // Running the reset again in the same window is a no-op.
            assert!(!tx.roll_treasury_day(today).unwrap());
            Ok(())
        })
        .unwrap();

        let treasury = db.treasury().unwrap();
        assert_eq!(treasury.today_spent, 0);
        assert_eq!(treasury.day_start, today);
    }
}
