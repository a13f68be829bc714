//! Bot registry: admin-managed bot definitions.
//!
//! Bots are soft-deleted (deactivated) rather than purged so their action
//! history survives for audit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use tavern_shared::{BotActionKind, BotPurpose, TrustLevel};
use tavern_store::{Bot, BotAction, Database};

use crate::error::BotError;

/// Input for creating a bot. Caps left empty fall back to a conservative
/// default for the purpose.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewBot {
    pub name: String,
    pub purpose: BotPurpose,
    #[serde(default)]
    pub trust: Option<u8>,
    #[serde(default)]
    pub activity_caps: BTreeMap<BotActionKind, u32>,
}

/// Default per-action daily maximums for a freshly created bot.
pub fn default_caps(purpose: BotPurpose) -> BTreeMap<BotActionKind, u32> {
    let mut caps = BTreeMap::new();
    match purpose {
        BotPurpose::Engagement => {
            caps.insert(BotActionKind::Like, 10);
            caps.insert(BotActionKind::Follow, 5);
        }
        BotPurpose::Marketplace => {
            caps.insert(BotActionKind::Purchase, 3);
        }
        BotPurpose::Referral => {
            caps.insert(BotActionKind::Referral, 2);
        }
    }
    caps
}

/// CRUD over bot definitions.
#[derive(Clone)]
pub struct BotRegistry {
    db: Arc<Mutex<Database>>,
}

impl BotRegistry {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub async fn create(&self, spec: NewBot) -> Result<Bot, BotError> {
        if spec.name.trim().is_empty() {
            return Err(BotError::InvalidDefinition("bot name is empty".to_string()));
        }

        let bot = Bot {
            id: Uuid::new_v4(),
            name: spec.name,
            purpose: spec.purpose,
            trust: TrustLevel::new(spec.trust.unwrap_or(1)),
            activity_caps: if spec.activity_caps.is_empty() {
                default_caps(spec.purpose)
            } else {
                spec.activity_caps
            },
            is_active: true,
            created_at: Utc::now(),
        };

        let mut db = self.db.lock().await;
        db.with_tx::<_, BotError>(|tx| Ok(tx.insert_bot(&bot)?))?;

        info!(bot = %bot.id, name = %bot.name, purpose = bot.purpose.as_str(), "bot created");
        Ok(bot)
    }

    /// Replace a bot's mutable fields (name, purpose, trust, caps).
    pub async fn update(&self, bot: &Bot) -> Result<(), BotError> {
        let mut db = self.db.lock().await;
        db.with_tx::<_, BotError>(|tx| Ok(tx.update_bot(bot)?))
    }

    /// Activate or deactivate a bot.
    pub async fn toggle(&self, id: Uuid, active: bool) -> Result<Bot, BotError> {
        let mut db = self.db.lock().await;
        let bot = db.with_tx::<_, BotError>(|tx| Ok(tx.set_bot_active(id, active)?))?;
        info!(bot = %id, active, "bot toggled");
        Ok(bot)
    }

    pub async fn get(&self, id: Uuid) -> Result<Bot, BotError> {
        let db = self.db.lock().await;
        Ok(db.get_bot(id)?)
    }

    pub async fn list(&self) -> Result<Vec<Bot>, BotError> {
        let db = self.db.lock().await;
        Ok(db.list_bots()?)
    }

    /// A bot's most recent audit rows, newest first.
    pub async fn recent_actions(&self, id: Uuid, limit: u32) -> Result<Vec<BotAction>, BotError> {
        let db = self.db.lock().await;
        db.view(|tx| Ok(tx.recent_bot_actions(id, limit)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (tempfile::TempDir, BotRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, BotRegistry::new(Arc::new(Mutex::new(db))))
    }

    #[tokio::test]
    async fn create_applies_purpose_defaults() {
        let (_dir, registry) = test_registry();

        let bot = registry
            .create(NewBot {
                name: "bazaar-wanderer".to_string(),
                purpose: BotPurpose::Marketplace,
                trust: Some(4),
                activity_caps: BTreeMap::new(),
            })
            .await
            .unwrap();

        assert!(bot.is_active);
        assert_eq!(bot.trust.get(), 4);
        assert_eq!(bot.cap_for(BotActionKind::Purchase), 3);
        assert_eq!(bot.cap_for(BotActionKind::Like), 0);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let (_dir, registry) = test_registry();
        let err = registry
            .create(NewBot {
                name: "  ".to_string(),
                purpose: BotPurpose::Engagement,
                trust: None,
                activity_caps: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn toggle_round_trip() {
        let (_dir, registry) = test_registry();
        let bot = registry
            .create(NewBot {
                name: "cheerful-badger".to_string(),
                purpose: BotPurpose::Engagement,
                trust: None,
                activity_caps: BTreeMap::new(),
            })
            .await
            .unwrap();

        let off = registry.toggle(bot.id, false).await.unwrap();
        assert!(!off.is_active);
        let on = registry.toggle(bot.id, true).await.unwrap();
        assert!(on.is_active);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }
}
