use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coin amounts are whole, indivisible units.
pub type Coins = i64;

/// Experience points.
pub type Xp = i64;

// The owner of a wallet. User wallets are keyed by the platform user id;
// `Treasury` and `Mint` are the two system wallets. Serialized as the
// plain key string (`"treasury"`, `"mint"`, or the user UUID) both in
// storage and over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletOwner {
    User(Uuid),
    /// The single global funding wallet backing all system-awarded credits.
    Treasury,
    /// Issuance counter-wallet. Only treasury refills debit it; its negative
    /// balance equals the total coins ever issued.
    Mint,
}

impl WalletOwner {
    /// Storage key used in the `wallets` table and in ledger entries.
    pub fn to_key(&self) -> String {
        match self {
            WalletOwner::User(id) => id.to_string(),
            WalletOwner::Treasury => "treasury".to_string(),
            WalletOwner::Mint => "mint".to_string(),
        }
    }

    pub fn from_key(s: &str) -> Result<Self, uuid::Error> {
        match s {
            "treasury" => Ok(WalletOwner::Treasury),
            "mint" => Ok(WalletOwner::Mint),
            other => Uuid::parse_str(other).map(WalletOwner::User),
        }
    }

    pub fn is_system(&self) -> bool {
        !matches!(self, WalletOwner::User(_))
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl Serialize for WalletOwner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}

impl<'de> Deserialize<'de> for WalletOwner {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        WalletOwner::from_key(&key).map_err(serde::de::Error::custom)
    }
}

/// What initiated a ledger transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
            TransactionKind::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "earn" => Some(TransactionKind::Earn),
            "spend" => Some(TransactionKind::Spend),
            "adjustment" => Some(TransactionKind::Adjustment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Credit => "credit",
            EntryDirection::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryDirection::Credit),
            "debit" => Some(EntryDirection::Debit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

/// Bot category. Selection and action behavior branch on this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BotPurpose {
    Engagement,
    Marketplace,
    Referral,
}

impl BotPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotPurpose::Engagement => "engagement",
            BotPurpose::Marketplace => "marketplace",
            BotPurpose::Referral => "referral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "engagement" => Some(BotPurpose::Engagement),
            "marketplace" => Some(BotPurpose::Marketplace),
            "referral" => Some(BotPurpose::Referral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum BotActionKind {
    Like,
    Follow,
    Purchase,
    Referral,
}

impl BotActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotActionKind::Like => "like",
            BotActionKind::Follow => "follow",
            BotActionKind::Purchase => "purchase",
            BotActionKind::Referral => "referral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "like" => Some(BotActionKind::Like),
            "follow" => Some(BotActionKind::Follow),
            "purchase" => Some(BotActionKind::Purchase),
            "referral" => Some(BotActionKind::Referral),
            _ => None,
        }
    }

    pub const ALL: [BotActionKind; 4] = [
        BotActionKind::Like,
        BotActionKind::Follow,
        BotActionKind::Purchase,
        BotActionKind::Referral,
    ];
}

/// Per-bot trust level, 1 (new, cautious) through 5 (established).
///
/// Higher trust raises the probability that the bot acts on a given tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrustLevel(u8);

impl TrustLevel {
    pub const MIN: TrustLevel = TrustLevel(1);
    pub const MAX: TrustLevel = TrustLevel(5);

    /// Clamps into the valid 1..=5 range.
    pub fn new(level: u8) -> Self {
        TrustLevel(level.clamp(1, 5))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Probability that a bot with this trust level acts at all on one tick.
    pub fn act_probability(&self) -> f64 {
        // 1 -> 0.15, 5 -> 0.75
        f64::from(self.0) * 0.15
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel(1)
    }
}

/// What a bot action was aimed at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Thread,
    Listing,
    User,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Thread => "thread",
            TargetKind::Listing => "listing",
            TargetKind::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "thread" => Some(TargetKind::Thread),
            "listing" => Some(TargetKind::Listing),
            "user" => Some(TargetKind::User),
            _ => None,
        }
    }
}

/// Outcome recorded on a bot action audit row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Completed,
    Failed,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Completed => "completed",
            ActionOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ActionOutcome::Completed),
            "failed" => Some(ActionOutcome::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Content read model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Thread,
    Listing,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Thread => "thread",
            ContentKind::Listing => "listing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "thread" => Some(ContentKind::Thread),
            "listing" => Some(ContentKind::Listing),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_owner_key_round_trip() {
        let user = WalletOwner::User(Uuid::new_v4());
        assert_eq!(WalletOwner::from_key(&user.to_key()).unwrap(), user);
        assert_eq!(
            WalletOwner::from_key("treasury").unwrap(),
            WalletOwner::Treasury
        );
        assert_eq!(WalletOwner::from_key("mint").unwrap(), WalletOwner::Mint);
        assert!(WalletOwner::from_key("not-a-uuid").is_err());
    }

    #[test]
    fn trust_level_clamps() {
        assert_eq!(TrustLevel::new(0), TrustLevel::MIN);
        assert_eq!(TrustLevel::new(9), TrustLevel::MAX);
        assert!(TrustLevel::new(5).act_probability() <= 1.0);
        assert!(TrustLevel::new(1).act_probability() > 0.0);
    }
}
