//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer as a response body.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tavern_shared::metadata::Metadata;
use tavern_shared::{
    ActionOutcome, BotActionKind, BotPurpose, Coins, ContentKind, EntryDirection, TargetKind,
    TransactionKind, TransactionStatus, TrustLevel, WalletOwner, Xp,
};

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A coin wallet. Balances are only ever mutated by the ledger engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub owner: WalletOwner,
    pub balance: Coins,
    /// Per-wallet cap override. `None` means the treasury's global default
    /// applies (system wallets are uncapped).
    pub cap: Option<Coins>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// An atomic, balanced set of credit/debit entries representing one
/// economic event. Immutable once committed; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub entries: Vec<LedgerEntry>,
    pub idempotency_key: Option<String>,
    /// Semantic origin, e.g. `forum.reply.posted`.
    pub trigger: String,
    /// Originating surface: `web`, `bot`, or `admin`.
    pub channel: String,
    pub metadata: Metadata,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Sum of credit amounts across all entries.
    pub fn credit_total(&self) -> Coins {
        self.entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Credit)
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of debit amounts across all entries.
    pub fn debit_total(&self) -> Coins {
        self.entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Debit)
            .map(|e| e.amount)
            .sum()
    }

    /// The balance invariant: every credit has a matching debit.
    pub fn is_balanced(&self) -> bool {
        !self.entries.is_empty() && self.credit_total() == self.debit_total()
    }

    /// The net effect of this transaction on one wallet.
    pub fn net_for(&self, owner: WalletOwner) -> Coins {
        self.entries
            .iter()
            .filter(|e| e.wallet == owner)
            .map(|e| match e.direction {
                EntryDirection::Credit => e.amount,
                EntryDirection::Debit => -e.amount,
            })
            .sum()
    }
}

/// One credit or debit line, owned by its parent transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub wallet: WalletOwner,
    pub direction: EntryDirection,
    /// Always positive; the direction carries the sign.
    pub amount: Coins,
    pub memo: Option<String>,
}

/// Maps a caller-supplied idempotency key to the transaction it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

/// The global funding pool: the treasury wallet balance joined with the
/// daily-cap counters and the default user-wallet ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Treasury {
    pub balance: Coins,
    pub daily_spend_limit: Coins,
    pub today_spent: Coins,
    pub day_start: NaiveDate,
    /// Global default ceiling applied to user wallets without an override.
    pub wallet_cap_amount: Coins,
}

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

/// A synthetic actor definition. Deactivated rather than deleted so its
/// action history stays intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bot {
    pub id: Uuid,
    pub name: String,
    pub purpose: BotPurpose,
    pub trust: TrustLevel,
    /// Per-action daily maximums. Missing kinds are capped at zero.
    pub activity_caps: BTreeMap<BotActionKind, u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// Daily cap for one action kind (zero when not configured).
    pub fn cap_for(&self, kind: BotActionKind) -> u32 {
        self.activity_caps.get(&kind).copied().unwrap_or(0)
    }
}

/// Append-only audit row for one bot action attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotAction {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub kind: BotActionKind,
    pub target_kind: Option<TargetKind>,
    pub target_id: Option<Uuid>,
    /// Coins moved, if the action carried a transaction.
    pub coins: Option<Coins>,
    pub transaction_id: Option<Uuid>,
    pub outcome: ActionOutcome,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Content read model
// ---------------------------------------------------------------------------

/// A recently-created thread or listing, synced in by the platform for
/// bot target selection. The platform owns the real content tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentItem {
    pub id: Uuid,
    pub author_id: Uuid,
    pub kind: ContentKind,
    /// Asking price; listings only.
    pub price: Option<Coins>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rank progression
// ---------------------------------------------------------------------------

/// Per-user XP totals. `current_xp` is strictly non-decreasing; `weekly_xp`
/// resets when the week rolls over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRankProgress {
    pub user_id: Uuid,
    pub current_xp: Xp,
    pub weekly_xp: Xp,
    pub week_start: NaiveDate,
    pub current_rank_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// One rung of the rank ladder. Reference data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankTier {
    pub id: i64,
    pub name: String,
    pub min_xp: Xp,
    pub unlocks: Vec<FeatureUnlock>,
}

/// A feature gated behind a rank tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureUnlock {
    pub id: i64,
    pub tier_id: i64,
    pub feature_key: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_invariant_helpers() {
        let user = WalletOwner::User(Uuid::new_v4());
        let tx = LedgerTransaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Earn,
            entries: vec![
                LedgerEntry {
                    wallet: user,
                    direction: EntryDirection::Credit,
                    amount: 50,
                    memo: None,
                },
                LedgerEntry {
                    wallet: WalletOwner::Treasury,
                    direction: EntryDirection::Debit,
                    amount: 50,
                    memo: None,
                },
            ],
            idempotency_key: None,
            trigger: "forum.reply.posted".to_string(),
            channel: "web".to_string(),
            metadata: Metadata::new(),
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        };

        assert!(tx.is_balanced());
        assert_eq!(tx.net_for(user), 50);
        assert_eq!(tx.net_for(WalletOwner::Treasury), -50);
        assert_eq!(tx.net_for(WalletOwner::Mint), 0);
    }

    #[test]
    fn empty_transaction_is_not_balanced() {
        let tx = LedgerTransaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Adjustment,
            entries: vec![],
            idempotency_key: None,
            trigger: "admin.treasury.refill".to_string(),
            channel: "admin".to_string(),
            metadata: Metadata::new(),
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        };
        assert!(!tx.is_balanced());
    }
}
