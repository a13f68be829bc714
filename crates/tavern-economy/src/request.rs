//! Transaction requests accepted by the ledger engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tavern_shared::metadata::Metadata;
use tavern_shared::Coins;

/// Who backs a system-awarded credit and which counters it consumes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Funding {
    /// Organic user activity: debits the treasury balance but does not
    /// count against the daily bot-funding budget.
    Organic,
    /// Bot-attributed or promotional credit: debits the treasury *and*
    /// consumes the daily spend limit.
    Promotional,
}

/// The economic operation to perform. The typed shapes keep system wallets
/// out of user-facing positions: only `TreasuryRefill` touches the mint,
/// and awards/spends always pair a user wallet with the treasury.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Credit a user from the treasury.
    Award {
        to: Uuid,
        amount: Coins,
        funding: Funding,
    },
    /// Debit a user; the coins return to the treasury sink.
    Spend {
        from: Uuid,
        amount: Coins,
        #[serde(default)]
        allow_overdraft: bool,
    },
    /// Move coins between two user wallets. Does not touch the treasury
    /// except to absorb a cap-clipped remainder.
    Transfer { from: Uuid, to: Uuid, amount: Coins },
    /// Admin override: move a percentage of a user's balance back to the
    /// treasury.
    Drain { from: Uuid, percent: u8 },
    /// Admin refill of the treasury, balanced against the mint.
    TreasuryRefill { amount: Coins },
}

/// A full request: the operation plus its audit context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub operation: Operation,
    /// Semantic origin, e.g. `forum.reply.posted`.
    pub trigger: String,
    /// Originating surface: `web`, `bot`, or `admin`.
    pub channel: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// At-most-once token. Replays return the original result.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl TransactionRequest {
    /// The wallet whose credited amount the caller cares about, if any.
    pub(crate) fn primary_target(&self) -> Option<Uuid> {
        match self.operation {
            Operation::Award { to, .. } | Operation::Transfer { to, .. } => Some(to),
            _ => None,
        }
    }
}
