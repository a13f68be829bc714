//! Treasury funding policy.
//!
//! Every system-awarded credit is funded here, inside the caller's SQL
//! transaction: the daily-window roll, the cap checks, the balance debit,
//! and the spent-today bump commit or roll back together. The treasury is
//! the most contended resource in the system; callers already hold the
//! database mutex, so funding never races.

use chrono::NaiveDate;

use tavern_shared::{Coins, WalletOwner};
use tavern_store::{StoreTx, Treasury};

use crate::error::LedgerError;
use crate::request::Funding;

/// Roll the daily window if needed and return a fresh treasury snapshot.
///
/// The roll is a compare-and-swap on `day_start`, so running it twice in
/// one window is a no-op.
pub(crate) fn snapshot(tx: &StoreTx<'_>, today: NaiveDate) -> Result<Treasury, LedgerError> {
    tx.roll_treasury_day(today)?;
    Ok(tx.treasury()?)
}

/// Debit the treasury to back a credit of `amount`.
///
/// `Promotional` funding consumes the daily spend limit and fails with
/// [`LedgerError::TreasuryExhausted`] once it is spent; `Organic` funding
/// only requires the balance to cover the amount. No credit is ever issued
/// without this succeeding first.
pub(crate) fn fund(
    tx: &StoreTx<'_>,
    treasury: &Treasury,
    amount: Coins,
    funding: Funding,
) -> Result<(), LedgerError> {
    if funding == Funding::Promotional {
        let remaining_today = (treasury.daily_spend_limit - treasury.today_spent).max(0);
        if amount > remaining_today {
            return Err(LedgerError::TreasuryExhausted { remaining_today });
        }
    }

    if treasury.balance < amount {
        return Err(LedgerError::InsufficientTreasuryFunds);
    }

    tx.adjust_balance(WalletOwner::Treasury, -amount)?;
    if funding == Funding::Promotional {
        tx.add_today_spent(amount)?;
    }

    Ok(())
}
