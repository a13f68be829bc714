//! The ledger engine: every coin movement in the system goes through
//! [`LedgerEngine::execute`].
//!
//! A request is processed as one SQL transaction behind one async mutex:
//! the idempotency lookup, balance validation, cap clipping, treasury
//! funding, balance mutations, and row writes either all commit or none
//! do. Two concurrent requests against the same wallet can never
//! interleave their read-modify-write, and a replayed idempotency key
//! returns the originally committed transaction without re-applying any
//! side effect.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use tavern_shared::metadata;
use tavern_shared::triggers;
use tavern_shared::{Coins, EntryDirection, TransactionKind, TransactionStatus, WalletOwner};
use tavern_store::{Database, LedgerEntry, LedgerTransaction, StoreTx, Treasury, Wallet};

use crate::caps;
use crate::error::LedgerError;
use crate::request::{Funding, Operation, TransactionRequest};
use crate::treasury;

/// The result handed back to callers: the committed transaction plus what
/// the primary target actually received after cap clipping.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOutcome {
    pub transaction: LedgerTransaction,
    /// Amount actually credited to the primary target wallet (zero for
    /// spends, drains, and refills).
    pub credited: Coins,
    /// Whether the credit was reduced by a wallet cap.
    pub clipped: bool,
    /// Whether this response was served from an idempotency record.
    pub replayed: bool,
}

/// Executes balanced ledger transactions against the shared database.
#[derive(Clone)]
pub struct LedgerEngine {
    db: Arc<Mutex<Database>>,
}

impl LedgerEngine {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Apply one economic operation with at-most-once semantics.
    pub async fn execute(
        &self,
        request: TransactionRequest,
    ) -> Result<ExecuteOutcome, LedgerError> {
        validate(&request)?;

        let mut db = self.db.lock().await;
        let outcome = db.with_tx(|tx| execute_in(tx, &request))?;

        if outcome.replayed {
            info!(
                tx = %outcome.transaction.id,
                key = request.idempotency_key.as_deref().unwrap_or(""),
                "idempotent replay served from record"
            );
        } else {
            info!(
                tx = %outcome.transaction.id,
                kind = outcome.transaction.kind.as_str(),
                trigger = %outcome.transaction.trigger,
                credited = outcome.credited,
                clipped = outcome.clipped,
                "ledger transaction committed"
            );
        }

        Ok(outcome)
    }

    /// Current wallet state (absent wallets read as zero balance).
    pub async fn wallet(&self, owner: WalletOwner) -> Result<Wallet, LedgerError> {
        let db = self.db.lock().await;
        Ok(db.wallet(owner)?)
    }

    /// Transactions that touched a wallet, newest first.
    pub async fn history(
        &self,
        owner: WalletOwner,
        limit: u32,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let db = self.db.lock().await;
        Ok(db.transaction_history(owner, limit)?)
    }

    /// Treasury balance and counters.
    pub async fn treasury_status(&self) -> Result<Treasury, LedgerError> {
        let db = self.db.lock().await;
        Ok(db.treasury()?)
    }

    /// Admin refill: mint coins into the treasury as a ledgered adjustment.
    pub async fn refill_treasury(
        &self,
        amount: Coins,
        admin_id: &str,
    ) -> Result<ExecuteOutcome, LedgerError> {
        self.execute(TransactionRequest {
            operation: Operation::TreasuryRefill { amount },
            trigger: triggers::ADMIN_REFILL.to_string(),
            channel: triggers::channel::ADMIN.to_string(),
            metadata: metadata::bag([(metadata::KEY_ADMIN_ID, json!(admin_id))]),
            idempotency_key: None,
        })
        .await
    }

    /// Admin override: move `percent` of a user's balance to the treasury.
    pub async fn drain_wallet(
        &self,
        user: Uuid,
        percent: u8,
        admin_id: &str,
    ) -> Result<ExecuteOutcome, LedgerError> {
        self.execute(TransactionRequest {
            operation: Operation::Drain { from: user, percent },
            trigger: triggers::ADMIN_DRAIN.to_string(),
            channel: triggers::channel::ADMIN.to_string(),
            metadata: metadata::bag([(metadata::KEY_ADMIN_ID, json!(admin_id))]),
            idempotency_key: None,
        })
        .await
    }
}

fn validate(request: &TransactionRequest) -> Result<(), LedgerError> {
    let positive = |amount: Coins, what: &str| {
        if amount <= 0 {
            Err(LedgerError::InvalidTransactionShape(format!(
                "{what} amount must be positive, got {amount}"
            )))
        } else {
            Ok(())
        }
    };

    match request.operation {
        Operation::Award { amount, .. } => positive(amount, "award"),
        Operation::Spend { amount, .. } => positive(amount, "spend"),
        Operation::Transfer { from, to, amount } => {
            if from == to {
                return Err(LedgerError::InvalidTransactionShape(
                    "transfer source and target are the same wallet".to_string(),
                ));
            }
            positive(amount, "transfer")
        }
        Operation::Drain { percent, .. } => {
            if percent == 0 || percent > 100 {
                return Err(LedgerError::InvalidTransactionShape(format!(
                    "drain percent must be in 1..=100, got {percent}"
                )));
            }
            Ok(())
        }
        Operation::TreasuryRefill { amount } => positive(amount, "refill"),
    }
}

/// The whole commit path. Runs inside one SQL transaction; any `Err`
/// rolls back every balance mutation made along the way.
fn execute_in(
    tx: &StoreTx<'_>,
    request: &TransactionRequest,
) -> Result<ExecuteOutcome, LedgerError> {
    // At-most-once: a recorded key short-circuits before any side effect.
    if let Some(key) = &request.idempotency_key {
        if let Some(record) = tx.find_idempotency(key)? {
            let prior = tx.get_transaction(record.transaction_id)?;
            return Ok(replay_outcome(request, prior));
        }
    }

    let today = Utc::now().date_naive();

    let (kind, entries, credited, clipped) = match request.operation {
        Operation::Award { to, amount, funding } => {
            let owner = WalletOwner::User(to);
            let wallet = tx.get_or_create_wallet(owner)?;
            let treasury = treasury::snapshot(tx, today)?;

            let actual = caps::clip_credit(&wallet, &treasury, amount);
            if actual == 0 {
                return Err(LedgerError::WalletCapExceeded);
            }

            treasury::fund(tx, &treasury, actual, funding)?;
            tx.adjust_balance(owner, actual)?;

            let entries = vec![
                LedgerEntry {
                    wallet: owner,
                    direction: EntryDirection::Credit,
                    amount: actual,
                    memo: None,
                },
                LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Debit,
                    amount: actual,
                    memo: None,
                },
            ];
            (TransactionKind::Earn, entries, actual, actual < amount)
        }

        Operation::Spend {
            from,
            amount,
            allow_overdraft,
        } => {
            let owner = WalletOwner::User(from);
            let wallet = tx.get_or_create_wallet(owner)?;

            if !allow_overdraft && wallet.balance < amount {
                return Err(LedgerError::InsufficientBalance {
                    available: wallet.balance,
                    required: amount,
                });
            }

            tx.adjust_balance(owner, -amount)?;
            tx.adjust_balance(WalletOwner::Treasury, amount)?;

            let entries = vec![
                LedgerEntry {
                    wallet: owner,
                    direction: EntryDirection::Debit,
                    amount,
                    memo: None,
                },
                LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Credit,
                    amount,
                    memo: None,
                },
            ];
            (TransactionKind::Spend, entries, 0, false)
        }

        Operation::Transfer { from, to, amount } => {
            let source = WalletOwner::User(from);
            let target = WalletOwner::User(to);
            let source_wallet = tx.get_or_create_wallet(source)?;

            if source_wallet.balance < amount {
                return Err(LedgerError::InsufficientBalance {
                    available: source_wallet.balance,
                    required: amount,
                });
            }

            let target_wallet = tx.get_or_create_wallet(target)?;
            let treasury = treasury::snapshot(tx, today)?;

            let actual = caps::clip_credit(&target_wallet, &treasury, amount);
            if actual == 0 {
                return Err(LedgerError::WalletCapExceeded);
            }

            tx.adjust_balance(source, -amount)?;
            tx.adjust_balance(target, actual)?;

            let mut entries = vec![
                LedgerEntry {
                    wallet: source,
                    direction: EntryDirection::Debit,
                    amount,
                    memo: None,
                },
                LedgerEntry {
                    wallet: target,
                    direction: EntryDirection::Credit,
                    amount: actual,
                    memo: None,
                },
            ];

            // The clipped remainder goes to the treasury, not nowhere.
            let remainder = amount - actual;
            if remainder > 0 {
                tx.adjust_balance(WalletOwner::Treasury, remainder)?;
                entries.push(LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Credit,
                    amount: remainder,
                    memo: Some("cap remainder".to_string()),
                });
            }

            (TransactionKind::Spend, entries, actual, remainder > 0)
        }

        Operation::Drain { from, percent } => {
            let owner = WalletOwner::User(from);
            let wallet = tx.get_or_create_wallet(owner)?;

            let amount = wallet.balance * Coins::from(percent) / 100;
            if amount <= 0 {
                return Err(LedgerError::InvalidTransactionShape(format!(
                    "drain of {percent}% of balance {} moves nothing",
                    wallet.balance
                )));
            }

            tx.adjust_balance(owner, -amount)?;
            tx.adjust_balance(WalletOwner::Treasury, amount)?;

            let entries = vec![
                LedgerEntry {
                    wallet: owner,
                    direction: EntryDirection::Debit,
                    amount,
                    memo: Some(format!("admin drain {percent}%")),
                },
                LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Credit,
                    amount,
                    memo: None,
                },
            ];
            (TransactionKind::Adjustment, entries, 0, false)
        }

        Operation::TreasuryRefill { amount } => {
            tx.adjust_balance(WalletOwner::Treasury, amount)?;
            tx.adjust_balance(WalletOwner::Mint, -amount)?;

            let entries = vec![
                LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Credit,
                    amount,
                    memo: None,
                },
                LedgerEntry {
                    wallet: WalletOwner::Mint,
                    direction: EntryDirection::Debit,
                    amount,
                    memo: Some("issuance".to_string()),
                },
            ];
            (TransactionKind::Adjustment, entries, 0, false)
        }
    };

    let transaction = LedgerTransaction {
        id: Uuid::new_v4(),
        kind,
        entries,
        idempotency_key: request.idempotency_key.clone(),
        trigger: request.trigger.clone(),
        channel: request.channel.clone(),
        metadata: request.metadata.clone(),
        status: TransactionStatus::Completed,
        created_at: Utc::now(),
    };

    if !transaction.is_balanced() {
        // A programming error in entry construction; the transaction rolls
        // back and nothing is committed.
        error!(
            tx = %transaction.id,
            credits = transaction.credit_total(),
            debits = transaction.debit_total(),
            "unbalanced entry set rejected"
        );
        return Err(LedgerError::InvalidTransactionShape(
            "credit and debit totals differ".to_string(),
        ));
    }

    tx.insert_transaction(&transaction)?;
    if let Some(key) = &request.idempotency_key {
        tx.record_idempotency(key, transaction.id)?;
    }

    Ok(ExecuteOutcome {
        transaction,
        credited,
        clipped,
        replayed: false,
    })
}

/// Reconstruct the caller-visible outcome from a previously committed
/// transaction.
fn replay_outcome(request: &TransactionRequest, prior: LedgerTransaction) -> ExecuteOutcome {
    let (credited, requested) = match (request.primary_target(), &request.operation) {
        (Some(target), Operation::Award { amount, .. })
        | (Some(target), Operation::Transfer { amount, .. }) => {
            (prior.net_for(WalletOwner::User(target)), *amount)
        }
        _ => (0, 0),
    };

    ExecuteOutcome {
        transaction: prior,
        credited,
        clipped: credited < requested,
        replayed: true,
    }
}
