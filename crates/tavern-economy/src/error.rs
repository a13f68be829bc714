use thiserror::Error;

use tavern_shared::Coins;
use tavern_store::StoreError;

/// Errors produced by the ledger engine and treasury.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Spend exceeds the wallet balance. User-recoverable.
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Coins, required: Coins },

    /// A credit was clipped all the way to zero: the wallet is already at
    /// its cap. Partial clips succeed and are not errors.
    #[error("Wallet is at its cap")]
    WalletCapExceeded,

    /// The treasury's daily bot-funding budget is spent. The action is
    /// retried on a later tick; never surfaced to end users.
    #[error("Treasury daily spend limit reached ({remaining_today} remaining today)")]
    TreasuryExhausted { remaining_today: Coins },

    /// The treasury wallet cannot cover the credit at all.
    #[error("Treasury balance too low to fund credit")]
    InsufficientTreasuryFunds,

    /// Entries do not balance or a request is malformed. A programming
    /// error; logged loudly, should never occur in production.
    #[error("Invalid transaction shape: {0}")]
    InvalidTransactionShape(String),

    /// Underlying storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors produced by the XP accumulator.
#[derive(Error, Debug)]
pub enum RankError {
    #[error("XP amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
