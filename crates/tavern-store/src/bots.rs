//! Bot definitions and the append-only bot action audit trail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tavern_shared::{ActionOutcome, BotActionKind, BotPurpose, TargetKind, TrustLevel};

use crate::convert::{bad_enum, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Bot, BotAction};
use crate::tx::StoreTx;

impl StoreTx<'_> {
    pub fn insert_bot(&self, bot: &Bot) -> Result<()> {
        self.conn.execute(
            "INSERT INTO bots (id, name, purpose, trust, activity_caps, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                bot.id.to_string(),
                bot.name,
                bot.purpose.as_str(),
                bot.trust.get(),
                caps_to_json(&bot.activity_caps)?,
                bot.is_active,
                bot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Update a bot's mutable fields (name, purpose, trust, caps, active flag).
    pub fn update_bot(&self, bot: &Bot) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE bots SET name = ?2, purpose = ?3, trust = ?4, activity_caps = ?5,
                             is_active = ?6
             WHERE id = ?1",
            params![
                bot.id.to_string(),
                bot.name,
                bot.purpose.as_str(),
                bot.trust.get(),
                caps_to_json(&bot.activity_caps)?,
                bot.is_active,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Toggle the active flag. Bots are never deleted, only deactivated,
    /// so their action history survives.
    pub fn set_bot_active(&self, id: Uuid, active: bool) -> Result<Bot> {
        let affected = self.conn.execute(
            "UPDATE bots SET is_active = ?2 WHERE id = ?1",
            params![id.to_string(), active],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_bot(id)
    }

    pub fn get_bot(&self, id: Uuid) -> Result<Bot> {
        self.conn
            .query_row(
                "SELECT id, name, purpose, trust, activity_caps, is_active, created_at
                 FROM bots WHERE id = ?1",
                params![id.to_string()],
                row_to_bot,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_bots(&self) -> Result<Vec<Bot>> {
        self.collect_bots("SELECT id, name, purpose, trust, activity_caps, is_active, created_at
                           FROM bots ORDER BY created_at ASC")
    }

    pub fn list_active_bots(&self) -> Result<Vec<Bot>> {
        self.collect_bots(
            "SELECT id, name, purpose, trust, activity_caps, is_active, created_at
             FROM bots WHERE is_active = 1 ORDER BY created_at ASC",
        )
    }

    fn collect_bots(&self, sql: &str) -> Result<Vec<Bot>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_bot)?;

        let mut bots = Vec::new();
        for row in rows {
            bots.push(row?);
        }
        Ok(bots)
    }

    // -- actions ------------------------------------------------------------

    pub fn insert_bot_action(&self, action: &BotAction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO bot_actions
                 (id, bot_id, kind, target_kind, target_id, coins, transaction_id, outcome, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                action.id.to_string(),
                action.bot_id.to_string(),
                action.kind.as_str(),
                action.target_kind.map(|k| k.as_str()),
                action.target_id.map(|id| id.to_string()),
                action.coins,
                action.transaction_id.map(|id| id.to_string()),
                action.outcome.as_str(),
                action.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Completed actions of one kind since `since` (daily allowance check).
    pub fn count_actions_since(
        &self,
        bot_id: Uuid,
        kind: BotActionKind,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM bot_actions
             WHERE bot_id = ?1 AND kind = ?2 AND outcome = 'completed' AND created_at >= ?3",
            params![bot_id.to_string(), kind.as_str(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Whether this bot ever completed an action against this target.
    pub fn has_acted_on(&self, bot_id: Uuid, target_id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM bot_actions
                 WHERE bot_id = ?1 AND target_id = ?2 AND outcome = 'completed'
                 LIMIT 1",
                params![bot_id.to_string(), target_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn recent_bot_actions(&self, bot_id: Uuid, limit: u32) -> Result<Vec<BotAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, bot_id, kind, target_kind, target_id, coins, transaction_id, outcome, created_at
             FROM bot_actions WHERE bot_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![bot_id.to_string(), limit], row_to_action)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row?);
        }
        Ok(actions)
    }
}

impl Database {
    pub fn list_bots(&self) -> Result<Vec<Bot>> {
        self.view(|tx| tx.list_bots())
    }

    pub fn get_bot(&self, id: Uuid) -> Result<Bot> {
        self.view(|tx| tx.get_bot(id))
    }
}

fn caps_to_json(caps: &BTreeMap<BotActionKind, u32>) -> Result<String> {
    let map: BTreeMap<&str, u32> = caps.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    Ok(serde_json::to_string(&map)?)
}

fn caps_from_json(idx: usize, s: &str) -> rusqlite::Result<BTreeMap<BotActionKind, u32>> {
    let raw: BTreeMap<String, u32> = serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let mut caps = BTreeMap::new();
    for (key, value) in raw {
        let kind = BotActionKind::from_str(&key).ok_or_else(|| bad_enum(idx, &key))?;
        caps.insert(kind, value);
    }
    Ok(caps)
}

fn row_to_bot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bot> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let purpose_str: String = row.get(2)?;
    let trust: u8 = row.get(3)?;
    let caps_str: String = row.get(4)?;
    let is_active: bool = row.get(5)?;
    let ts_str: String = row.get(6)?;

    Ok(Bot {
        id: parse_uuid(0, &id_str)?,
        name,
        purpose: BotPurpose::from_str(&purpose_str).ok_or_else(|| bad_enum(2, &purpose_str))?,
        trust: TrustLevel::new(trust),
        activity_caps: caps_from_json(4, &caps_str)?,
        is_active,
        created_at: parse_ts(6, &ts_str)?,
    })
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<BotAction> {
    let id_str: String = row.get(0)?;
    let bot_id_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let target_kind_str: Option<String> = row.get(3)?;
    let target_id_str: Option<String> = row.get(4)?;
    let coins: Option<i64> = row.get(5)?;
    let tx_id_str: Option<String> = row.get(6)?;
    let outcome_str: String = row.get(7)?;
    let ts_str: String = row.get(8)?;

    let target_kind = match target_kind_str {
        Some(s) => Some(TargetKind::from_str(&s).ok_or_else(|| bad_enum(3, &s))?),
        None => None,
    };
    let target_id = match target_id_str {
        Some(s) => Some(parse_uuid(4, &s)?),
        None => None,
    };
    let transaction_id = match tx_id_str {
        Some(s) => Some(parse_uuid(6, &s)?),
        None => None,
    };

    Ok(BotAction {
        id: parse_uuid(0, &id_str)?,
        bot_id: parse_uuid(1, &bot_id_str)?,
        kind: BotActionKind::from_str(&kind_str).ok_or_else(|| bad_enum(2, &kind_str))?,
        target_kind,
        target_id,
        coins,
        transaction_id,
        outcome: ActionOutcome::from_str(&outcome_str)
            .ok_or_else(|| bad_enum(7, &outcome_str))?,
        created_at: parse_ts(8, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn sample_bot() -> Bot {
        let mut caps = BTreeMap::new();
        caps.insert(BotActionKind::Like, 10);
        caps.insert(BotActionKind::Follow, 5);
        Bot {
            id: Uuid::new_v4(),
            name: "cheerful-badger".to_string(),
            purpose: BotPurpose::Engagement,
            trust: TrustLevel::new(3),
            activity_caps: caps,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bot_round_trip() {
        let (_dir, mut db) = test_db();
        let bot = sample_bot();

        db.with_tx::<_, StoreError>(|tx| tx.insert_bot(&bot)).unwrap();

        let loaded = db.get_bot(bot.id).unwrap();
        assert_eq!(loaded, bot);
        assert_eq!(loaded.cap_for(BotActionKind::Like), 10);
        assert_eq!(loaded.cap_for(BotActionKind::Purchase), 0);
    }

    #[test]
    fn toggle_deactivates_without_deleting() {
        let (_dir, mut db) = test_db();
        let bot = sample_bot();

        db.with_tx::<_, StoreError>(|tx| {
            tx.insert_bot(&bot)?;
            let toggled = tx.set_bot_active(bot.id, false)?;
            assert!(!toggled.is_active);
            assert!(tx.list_active_bots()?.is_empty());
            assert_eq!(tx.list_bots()?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn action_counting_and_target_dedup() {
        let (_dir, mut db) = test_db();
        let bot = sample_bot();
        let target = Uuid::new_v4();
        let day_start = Utc::now() - Duration::hours(1);

        db.with_tx::<_, StoreError>(|tx| {
            tx.insert_bot(&bot)?;

            tx.insert_bot_action(&BotAction {
                id: Uuid::new_v4(),
                bot_id: bot.id,
                kind: BotActionKind::Like,
                target_kind: Some(TargetKind::Thread),
                target_id: Some(target),
                coins: Some(2),
                transaction_id: Some(Uuid::new_v4()),
                outcome: ActionOutcome::Completed,
                created_at: Utc::now(),
            })?;

            // Failed attempts do not consume the daily allowance.
            tx.insert_bot_action(&BotAction {
                id: Uuid::new_v4(),
                bot_id: bot.id,
                kind: BotActionKind::Like,
                target_kind: Some(TargetKind::Thread),
                target_id: Some(Uuid::new_v4()),
                coins: None,
                transaction_id: None,
                outcome: ActionOutcome::Failed,
                created_at: Utc::now(),
            })?;

            assert_eq!(
                tx.count_actions_since(bot.id, BotActionKind::Like, day_start)?,
                1
            );
            assert!(tx.has_acted_on(bot.id, target)?);
            assert!(!tx.has_acted_on(bot.id, Uuid::new_v4())?);
            Ok(())
        })
        .unwrap();
    }
}
