//! Rank progression persistence: per-user XP rows and the tier ladder.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tavern_shared::Xp;

use crate::convert::{date_str, parse_date, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{FeatureUnlock, RankTier, UserRankProgress};
use crate::tx::StoreTx;

impl StoreTx<'_> {
    pub fn get_rank_progress(&self, user_id: Uuid) -> Result<Option<UserRankProgress>> {
        self.conn
            .query_row(
                "SELECT user_id, current_xp, weekly_xp, week_start, current_rank_id, updated_at
                 FROM user_rank_progress WHERE user_id = ?1",
                params![user_id.to_string()],
                row_to_progress,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Fetch a user's progress row, creating a fresh one anchored at
    /// `week_start` when the user has never earned XP.
    pub fn get_or_create_rank_progress(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<UserRankProgress> {
        if let Some(progress) = self.get_rank_progress(user_id)? {
            return Ok(progress);
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO user_rank_progress
                 (user_id, current_xp, weekly_xp, week_start, current_rank_id, updated_at)
             VALUES (?1, 0, 0, ?2, NULL, ?3)",
            params![user_id.to_string(), date_str(week_start), now.to_rfc3339()],
        )?;

        Ok(UserRankProgress {
            user_id,
            current_xp: 0,
            weekly_xp: 0,
            week_start,
            current_rank_id: None,
            updated_at: now,
        })
    }

    /// Roll the weekly window if `week_start` is past the stored one.
    ///
    /// Same compare-and-swap shape as the treasury daily reset: zero rows
    /// match when another writer already advanced the window.
    pub fn roll_rank_week(&self, user_id: Uuid, week_start: NaiveDate) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE user_rank_progress SET weekly_xp = 0, week_start = ?2, updated_at = ?3
             WHERE user_id = ?1 AND week_start < ?2",
            params![
                user_id.to_string(),
                date_str(week_start),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(affected > 0)
    }

    /// Apply an XP award and possible rank change to the stored row.
    pub fn apply_xp_award(
        &self,
        user_id: Uuid,
        awarded: Xp,
        new_rank_id: Option<i64>,
    ) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE user_rank_progress
             SET current_xp = current_xp + ?2,
                 weekly_xp = weekly_xp + ?2,
                 current_rank_id = ?3,
                 updated_at = ?4
             WHERE user_id = ?1",
            params![
                user_id.to_string(),
                awarded,
                new_rank_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// The full tier ladder with unlocks, ascending by XP threshold.
    pub fn rank_tiers(&self) -> Result<Vec<RankTier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, min_xp FROM rank_tiers ORDER BY min_xp ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok(RankTier {
                id: row.get(0)?,
                name: row.get(1)?,
                min_xp: row.get(2)?,
                unlocks: Vec::new(),
            })
        })?;

        let mut tiers = Vec::new();
        for row in rows {
            let mut tier: RankTier = row?;
            tier.unlocks = self.unlocks_for(tier.id)?;
            tiers.push(tier);
        }
        Ok(tiers)
    }

    fn unlocks_for(&self, tier_id: i64) -> Result<Vec<FeatureUnlock>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tier_id, feature_key, description
             FROM feature_unlocks WHERE tier_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![tier_id], |row| {
            Ok(FeatureUnlock {
                id: row.get(0)?,
                tier_id: row.get(1)?,
                feature_key: row.get(2)?,
                description: row.get(3)?,
            })
        })?;

        let mut unlocks = Vec::new();
        for row in rows {
            unlocks.push(row?);
        }
        Ok(unlocks)
    }
}

impl Database {
    pub fn rank_tiers(&self) -> Result<Vec<RankTier>> {
        self.view(|tx| tx.rank_tiers())
    }

    pub fn rank_progress(&self, user_id: Uuid) -> Result<Option<UserRankProgress>> {
        self.view(|tx| tx.get_rank_progress(user_id))
    }
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRankProgress> {
    let user_str: String = row.get(0)?;
    let current_xp: Xp = row.get(1)?;
    let weekly_xp: Xp = row.get(2)?;
    let week_str: String = row.get(3)?;
    let current_rank_id: Option<i64> = row.get(4)?;
    let updated_str: String = row.get(5)?;

    Ok(UserRankProgress {
        user_id: parse_uuid(0, &user_str)?,
        current_xp,
        weekly_xp,
        week_start: parse_date(3, &week_str)?,
        current_rank_id,
        updated_at: parse_ts(5, &updated_str)?,
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

    #[test]
    fn seeded_ladder_is_ascending_with_unlocks() {
        let (_dir, db) = test_db();
        let tiers = db.rank_tiers().unwrap();
        assert!(tiers.len() >= 3);
        assert!(tiers.windows(2).all(|w| w[0].min_xp < w[1].min_xp));
        assert_eq!(tiers[0].min_xp, 0);
        // At least one non-base tier carries unlocks.
        assert!(tiers.iter().skip(1).any(|t| !t.unlocks.is_empty()));
    }

    #[test]
    fn progress_create_award_and_week_roll() {
        let (_dir, mut db) = test_db();
        let user = Uuid::new_v4();
        let week = Utc::now().date_naive() - Duration::days(7);

        db.with_tx::<_, StoreError>(|tx| {
            let progress = tx.get_or_create_rank_progress(user, week)?;
            assert_eq!(progress.current_xp, 0);

            tx.apply_xp_award(user, 120, Some(1))?;

            let next_week = week + Duration::days(7);
            assert!(tx.roll_rank_week(user, next_week)?);
            assert!(!tx.roll_rank_week(user, next_week)?);
            Ok(())
        })
        .unwrap();

        let progress = db.rank_progress(user).unwrap().unwrap();
        // Lifetime XP survives the weekly reset.
        assert_eq!(progress.current_xp, 120);
        assert_eq!(progress.weekly_xp, 0);
        assert_eq!(progress.current_rank_id, Some(1));
    }
}
