use thiserror::Error;

use tavern_economy::LedgerError;
use tavern_store::StoreError;

/// Errors produced by the bot registry and scheduler.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid bot definition: {0}")]
    InvalidDefinition(String),
}
