//! The XP/rank accumulator.
//!
//! Lifetime XP is strictly non-decreasing; weekly XP is capped and resets
//! when the week rolls over. The weekly boundary is detected lazily on the
//! next award rather than by a cron job, and the reset is a compare-and-swap
//! on the stored `week_start` so concurrent first-awards of the week cannot
//! double-reset. Awards for one user are serialized through the same
//! database mutex as ledger commits.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use tavern_shared::metadata::Metadata;
use tavern_shared::Xp;
use tavern_store::{Database, FeatureUnlock, RankTier, StoreTx, UserRankProgress};

use crate::error::RankError;

/// What one XP award did.
#[derive(Debug, Clone, Serialize)]
pub struct XpResult {
    pub user_id: Uuid,
    /// XP actually added after the weekly-cap clip (may be zero).
    pub awarded: Xp,
    /// Whether the award was reduced by the weekly cap.
    pub clipped: bool,
    pub current_xp: Xp,
    pub weekly_xp: Xp,
    pub rank_changed: bool,
    /// The user's rank after the award, if any tier is reached.
    pub rank: Option<RankTier>,
    /// Features newly in range because of this award. Delivery (email,
    /// notification) is the surrounding platform's concern.
    pub newly_unlocked: Vec<FeatureUnlock>,
}

/// Tracks per-user XP and resolves rank transitions.
#[derive(Clone)]
pub struct RankAccumulator {
    db: Arc<Mutex<Database>>,
    weekly_cap: Xp,
}

impl RankAccumulator {
    pub fn new(db: Arc<Mutex<Database>>, weekly_cap: Xp) -> Self {
        Self { db, weekly_cap }
    }

    /// Award XP for an activity, clipping to the weekly headroom.
    ///
    /// A user already at the weekly cap gets a zero-award result with
    /// `clipped = true` rather than an error: earning must not dead-end
    /// a user flow.
    pub async fn award_xp(
        &self,
        user_id: Uuid,
        activity: &str,
        amount: Xp,
        metadata: Metadata,
    ) -> Result<XpResult, RankError> {
        if amount <= 0 {
            return Err(RankError::InvalidAmount(amount));
        }

        let weekly_cap = self.weekly_cap;
        let mut db = self.db.lock().await;
        let result = db.with_tx(|tx| award_in(tx, user_id, amount, weekly_cap))?;

        if result.rank_changed {
            info!(
                user = %user_id,
                activity,
                awarded = result.awarded,
                rank = result.rank.as_ref().map(|r| r.name.as_str()).unwrap_or(""),
                unlocked = result.newly_unlocked.len(),
                "rank transition"
            );
        } else {
            debug!(
                user = %user_id,
                activity,
                awarded = result.awarded,
                clipped = result.clipped,
                ?metadata,
                "xp awarded"
            );
        }

        Ok(result)
    }

    /// The tier ladder, ascending.
    pub async fn tiers(&self) -> Result<Vec<RankTier>, RankError> {
        let db = self.db.lock().await;
        Ok(db.rank_tiers()?)
    }

    /// A user's progress row, if they have ever earned XP.
    pub async fn progress(&self, user_id: Uuid) -> Result<Option<UserRankProgress>, RankError> {
        let db = self.db.lock().await;
        Ok(db.rank_progress(user_id)?)
    }
}

/// Monday of the week containing `today`.
fn week_start_of(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

fn award_in(
    tx: &StoreTx<'_>,
    user_id: Uuid,
    amount: Xp,
    weekly_cap: Xp,
) -> Result<XpResult, RankError> {
    let this_week = week_start_of(Utc::now().date_naive());

    let mut progress = tx.get_or_create_rank_progress(user_id, this_week)?;
    if progress.week_start < this_week && tx.roll_rank_week(user_id, this_week)? {
        progress.weekly_xp = 0;
        progress.week_start = this_week;
    }

    let headroom = (weekly_cap - progress.weekly_xp).max(0);
    let awarded = amount.min(headroom);
    let clipped = awarded < amount;

    let tiers = tx.rank_tiers()?;
    let old_xp = progress.current_xp;
    let new_xp = old_xp + awarded;

    let new_rank = tiers.iter().filter(|t| t.min_xp <= new_xp).next_back();
    let rank_changed = new_rank.map(|t| t.id) != progress.current_rank_id;

    // Tiers crossed by this award; handles multi-tier jumps.
    let newly_unlocked: Vec<FeatureUnlock> = if awarded > 0 {
        tiers
            .iter()
            .filter(|t| t.min_xp > old_xp && t.min_xp <= new_xp)
            .flat_map(|t| t.unlocks.iter().cloned())
            .collect()
    } else {
        Vec::new()
    };

    if awarded > 0 {
        tx.apply_xp_award(user_id, awarded, new_rank.map(|t| t.id))?;
    }

    Ok(XpResult {
        user_id,
        awarded,
        clipped,
        current_xp: new_xp,
        weekly_xp: progress.weekly_xp + awarded,
        rank_changed: rank_changed && awarded > 0,
        rank: new_rank.cloned(),
        newly_unlocked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_accumulator(weekly_cap: Xp) -> (tempfile::TempDir, RankAccumulator, Arc<Mutex<Database>>)
    {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let db = Arc::new(Mutex::new(db));
        (dir, RankAccumulator::new(db.clone(), weekly_cap), db)
    }

    #[tokio::test]
    async fn first_award_creates_progress_and_base_rank() {
        let (_dir, ranks, _db) = test_accumulator(700);
        let user = Uuid::new_v4();

        let result = ranks
            .award_xp(user, "forum.reply.posted", 50, Metadata::new())
            .await
            .unwrap();

        assert_eq!(result.awarded, 50);
        assert!(!result.clipped);
        assert_eq!(result.current_xp, 50);
        // The seeded ladder starts at 0 XP, so the first award lands a rank.
        assert!(result.rank_changed);
        let rank = result.rank.unwrap();
        assert_eq!(rank.min_xp, 0);
        // The base tier carries no unlocks.
        assert!(result.newly_unlocked.is_empty());
    }

    #[tokio::test]
    async fn crossing_a_threshold_returns_new_unlocks() {
        let (_dir, ranks, db) = test_accumulator(10_000);
        let user = Uuid::new_v4();

        ranks
            .award_xp(user, "forum.thread.posted", 490, Metadata::new())
            .await
            .unwrap();

        // Next tier of the seeded ladder sits at 500.
        let result = ranks
            .award_xp(user, "forum.reply.posted", 20, Metadata::new())
            .await
            .unwrap();

        assert_eq!(result.current_xp, 510);
        assert!(result.rank_changed);
        assert_eq!(result.rank.as_ref().unwrap().min_xp, 500);
        assert!(!result.newly_unlocked.is_empty());

        let progress = db.lock().await.rank_progress(user).unwrap().unwrap();
        assert_eq!(progress.current_xp, 510);
        assert_eq!(progress.current_rank_id, Some(result.rank.unwrap().id));
    }

    #[tokio::test]
    async fn weekly_cap_clips_and_then_zeroes() {
        let (_dir, ranks, _db) = test_accumulator(100);
        let user = Uuid::new_v4();

        let result = ranks
            .award_xp(user, "forum.reply.posted", 90, Metadata::new())
            .await
            .unwrap();
        assert_eq!(result.awarded, 90);

        // Only 10 of headroom left.
        let result = ranks
            .award_xp(user, "forum.reply.posted", 30, Metadata::new())
            .await
            .unwrap();
        assert_eq!(result.awarded, 10);
        assert!(result.clipped);
        assert_eq!(result.weekly_xp, 100);

        // At the cap: zero award, no error, lifetime XP unchanged.
        let result = ranks
            .award_xp(user, "forum.reply.posted", 5, Metadata::new())
            .await
            .unwrap();
        assert_eq!(result.awarded, 0);
        assert!(result.clipped);
        assert_eq!(result.current_xp, 100);
        assert!(!result.rank_changed);
    }

    #[tokio::test]
    async fn week_rollover_resets_weekly_but_not_lifetime() {
        let (_dir, ranks, db) = test_accumulator(100);
        let user = Uuid::new_v4();

        ranks
            .award_xp(user, "forum.reply.posted", 100, Metadata::new())
            .await
            .unwrap();

        // Pretend the progress row is from last week.
        let last_week = week_start_of(Utc::now().date_naive()) - Duration::days(7);
        db.lock()
            .await
            .conn()
            .execute(
                "UPDATE user_rank_progress SET week_start = ?1 WHERE user_id = ?2",
                rusqlite::params![
                    last_week.format("%Y-%m-%d").to_string(),
                    user.to_string()
                ],
            )
            .unwrap();

        let result = ranks
            .award_xp(user, "forum.reply.posted", 40, Metadata::new())
            .await
            .unwrap();

        assert_eq!(result.awarded, 40);
        assert_eq!(result.weekly_xp, 40);
        assert_eq!(result.current_xp, 140);
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let (_dir, ranks, _db) = test_accumulator(100);
        let err = ranks
            .award_xp(Uuid::new_v4(), "forum.reply.posted", 0, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RankError::InvalidAmount(0)));
    }
}
