//! The tick scheduler: drives every active bot through one capped,
//! probabilistic action per tick.
//!
//! Failure policy: one bot failing (treasury exhausted, storage hiccup)
//! is recorded as a failed `BotAction` with no linked transaction and the
//! tick continues with the next bot. A tick that overruns its wall-clock
//! budget finishes the bot in flight and defers the rest to the next tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tavern_shared::metadata;
use tavern_shared::triggers;
use tavern_shared::{ActionOutcome, BotActionKind, Coins, ContentKind};
use tavern_store::{Bot, BotAction, ContentItem, Database};
use tavern_economy::{Funding, LedgerEngine, Operation, TransactionRequest};

use serde_json::json;

use crate::config::BotConfig;
use crate::error::BotError;
use crate::selector::{self, Candidate, PlannedAction, SelectionCtx};

/// What one bot did (or did not do) during a tick.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    Acted {
        kind: BotActionKind,
        target_id: Option<Uuid>,
        coins: Option<Coins>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BotTickEntry {
    pub bot_id: Uuid,
    pub bot_name: String,
    pub outcome: TickOutcome,
}

/// Summary of one scheduler tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub considered: usize,
    pub acted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Bots not started because the tick ran past its budget.
    pub deferred: usize,
    pub entries: Vec<BotTickEntry>,
}

/// Drives bot ticks. One logical driver fires on a timer (or manually via
/// the admin API); bots within a tick are independent but every
/// ledger-touching operation serializes on the database mutex.
#[derive(Clone)]
pub struct BotScheduler {
    db: Arc<Mutex<Database>>,
    engine: LedgerEngine,
    config: BotConfig,
}

impl BotScheduler {
    pub fn new(db: Arc<Mutex<Database>>, engine: LedgerEngine, config: BotConfig) -> Self {
        Self { db, engine, config }
    }

    /// Run one tick over all active bots.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let now = Utc::now();
        let mut report = TickReport::default();

        let (bots, content) = {
            let db = self.db.lock().await;
            let bots = match db.list_bots() {
                Ok(bots) => bots,
                Err(e) => {
                    warn!(error = %e, "tick aborted: could not load bots");
                    return report;
                }
            };
            let since = now - Duration::minutes(self.config.lookback_minutes);
            let content = match db.recent_content(since) {
                Ok(content) => content,
                Err(e) => {
                    warn!(error = %e, "tick aborted: could not scan content");
                    return report;
                }
            };
            (bots, content)
        };

        let active: Vec<Bot> = bots.into_iter().filter(|b| b.is_active).collect();
        report.considered = active.len();

        let mut rng = StdRng::from_entropy();

        for bot in &active {
            if started.elapsed() > self.config.tick_budget {
                report.deferred = report.considered - report.acted - report.skipped - report.failed;
                warn!(
                    deferred = report.deferred,
                    budget_secs = self.config.tick_budget.as_secs(),
                    "tick budget exhausted, deferring remaining bots"
                );
                break;
            }

            let outcome = match self.run_bot(bot, &content, now, &mut rng).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Isolated per bot: record the failure and move on.
                    warn!(bot = %bot.id, error = %e, "bot action failed");
                    self.record_failure(bot).await;
                    TickOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            match &outcome {
                TickOutcome::Acted { .. } => report.acted += 1,
                TickOutcome::Skipped { .. } => report.skipped += 1,
                TickOutcome::Failed { .. } => report.failed += 1,
            }
            report.entries.push(BotTickEntry {
                bot_id: bot.id,
                bot_name: bot.name.clone(),
                outcome,
            });
        }

        info!(
            considered = report.considered,
            acted = report.acted,
            skipped = report.skipped,
            failed = report.failed,
            deferred = report.deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bot tick complete"
        );

        report
    }

    /// Select and execute one action for one bot.
    async fn run_bot(
        &self,
        bot: &Bot,
        content: &[ContentItem],
        now: DateTime<Utc>,
        rng: &mut StdRng,
    ) -> Result<TickOutcome, BotError> {
        // Remaining daily allowance per action kind; skip the bot outright
        // when everything is exhausted.
        let allowances = self.remaining_allowances(bot, now).await?;
        if allowances.values().all(|&remaining| remaining == 0) {
            debug!(bot = %bot.id, "daily caps exhausted");
            return Ok(TickOutcome::Skipped {
                reason: "daily caps exhausted".to_string(),
            });
        }

        // Trust modulates how often the bot engages at all.
        if rng.gen::<f64>() > bot.trust.act_probability() {
            return Ok(TickOutcome::Skipped {
                reason: "sat out this tick".to_string(),
            });
        }

        let (threads, listings, authors) = self.build_candidates(bot, content, now).await?;
        let treasury = self.engine.treasury_status().await?;

        let ctx = SelectionCtx {
            allowances: &allowances,
            threads: &threads,
            listings: &listings,
            authors: &authors,
            like_reward: self.config.like_reward,
            referral_bonus: self.config.referral_bonus,
            treasury_remaining_today: (treasury.daily_spend_limit - treasury.today_spent).max(0),
        };

        let Some(planned) = selector::strategy_for(bot.purpose).plan(&ctx, rng) else {
            debug!(bot = %bot.id, "no eligible targets");
            return Ok(TickOutcome::Skipped {
                reason: "no eligible targets".to_string(),
            });
        };

        self.execute_planned(bot, planned, now).await
    }

    async fn remaining_allowances(
        &self,
        bot: &Bot,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<BotActionKind, u32>, BotError> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();

        let db = self.db.lock().await;
        db.view(|tx| {
            let mut allowances = BTreeMap::new();
            for (&kind, &cap) in &bot.activity_caps {
                let taken = tx.count_actions_since(bot.id, kind, day_start)?;
                allowances.insert(kind, cap.saturating_sub(taken));
            }
            Ok(allowances)
        })
    }

    /// Split fresh content into per-purpose candidate pools, dropping
    /// anything this bot already acted on and weighting by recency.
    async fn build_candidates(
        &self,
        bot: &Bot,
        content: &[ContentItem],
        now: DateTime<Utc>,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>, Vec<Candidate>), BotError> {
        let window_secs = (self.config.lookback_minutes * 60) as f64;
        let db = self.db.lock().await;

        db.view(|tx| {
            let mut threads = Vec::new();
            let mut listings = Vec::new();
            let mut authors = Vec::new();
            let mut seen_authors = std::collections::HashSet::new();

            for item in content {
                let age_secs = (now - item.created_at).num_seconds().max(0) as f64;
                let weight = (window_secs - age_secs).max(1.0);

                if !tx.has_acted_on(bot.id, item.id)? {
                    let candidate = Candidate {
                        item: item.clone(),
                        weight,
                    };
                    match item.kind {
                        ContentKind::Thread => threads.push(candidate),
                        ContentKind::Listing => listings.push(candidate),
                    }
                }

                if seen_authors.insert(item.author_id) && !tx.has_acted_on(bot.id, item.author_id)? {
                    authors.push(Candidate {
                        item: item.clone(),
                        weight,
                    });
                }
            }

            Ok((threads, listings, authors))
        })
    }

    /// Execute the planned action: ledger first (when coins move), then the
    /// audit row, in one atomic unit with the idempotency key tying retries
    /// to the original transaction.
    async fn execute_planned(
        &self,
        bot: &Bot,
        planned: PlannedAction,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, BotError> {
        let transaction_id = match (planned.cost, planned.beneficiary) {
            (cost, Some(beneficiary)) if cost > 0 => {
                let outcome = self
                    .engine
                    .execute(TransactionRequest {
                        operation: Operation::Award {
                            to: beneficiary,
                            amount: cost,
                            funding: Funding::Promotional,
                        },
                        trigger: planned.trigger.to_string(),
                        channel: triggers::channel::BOT.to_string(),
                        metadata: metadata::bag([
                            (metadata::KEY_BOT_ID, json!(bot.id)),
                            (metadata::KEY_CONTENT_ID, json!(planned.target_id)),
                        ]),
                        idempotency_key: Some(selector::idempotency_key(
                            bot.id,
                            planned.kind,
                            planned.target_id,
                        )),
                    })
                    .await?;
                Some(outcome.transaction.id)
            }
            _ => None,
        };

        let action = BotAction {
            id: Uuid::new_v4(),
            bot_id: bot.id,
            kind: planned.kind,
            target_kind: Some(planned.target_kind),
            target_id: Some(planned.target_id),
            coins: (planned.cost > 0).then_some(planned.cost),
            transaction_id,
            outcome: ActionOutcome::Completed,
            created_at: now,
        };

        {
            let mut db = self.db.lock().await;
            db.with_tx::<_, BotError>(|tx| Ok(tx.insert_bot_action(&action)?))?;
        }

        debug!(
            bot = %bot.id,
            kind = planned.kind.as_str(),
            target = %planned.target_id,
            coins = planned.cost,
            "bot acted"
        );

        Ok(TickOutcome::Acted {
            kind: planned.kind,
            target_id: action.target_id,
            coins: action.coins,
        })
    }

    /// Record a failed attempt as an audit row with no linked transaction.
    async fn record_failure(&self, bot: &Bot) {
        let action = BotAction {
            id: Uuid::new_v4(),
            bot_id: bot.id,
            kind: primary_kind(bot.purpose),
            target_kind: None,
            target_id: None,
            coins: None,
            transaction_id: None,
            outcome: ActionOutcome::Failed,
            created_at: Utc::now(),
        };

        let mut db = self.db.lock().await;
        if let Err(e) = db.with_tx::<_, BotError>(|tx| Ok(tx.insert_bot_action(&action)?)) {
            warn!(bot = %bot.id, error = %e, "could not record failed bot action");
        }
    }

}

/// The action kind a purpose leads with; used to label failure audit rows
/// when the failure happened before or during execution.
fn primary_kind(purpose: tavern_shared::BotPurpose) -> BotActionKind {
    match purpose {
        tavern_shared::BotPurpose::Engagement => BotActionKind::Like,
        tavern_shared::BotPurpose::Marketplace => BotActionKind::Purchase,
        tavern_shared::BotPurpose::Referral => BotActionKind::Referral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavern_economy::LedgerError;
    use tavern_shared::{BotPurpose, TrustLevel, WalletOwner};
    use tavern_store::StoreError;

    struct Harness {
        _dir: tempfile::TempDir,
        db: Arc<Mutex<Database>>,
        engine: LedgerEngine,
        scheduler: BotScheduler,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let db = Arc::new(Mutex::new(db));
        let engine = LedgerEngine::new(db.clone());
        let scheduler = BotScheduler::new(db.clone(), engine.clone(), BotConfig::default());
        Harness {
            _dir: dir,
            db,
            engine,
            scheduler,
        }
    }

    /// Maximum-trust bot so the activation roll cannot skip it... often.
    /// Tests that need determinism loop until the bot acts.
    fn eager_bot(purpose: BotPurpose, caps: &[(BotActionKind, u32)]) -> Bot {
        Bot {
            id: Uuid::new_v4(),
            name: format!("{}-bot", purpose.as_str()),
            purpose,
            trust: TrustLevel::MAX,
            activity_caps: caps.iter().copied().collect(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn insert_bot(h: &Harness, bot: &Bot) {
        h.db.lock()
            .await
            .with_tx::<_, StoreError>(|tx| tx.insert_bot(bot))
            .unwrap();
    }

    async fn insert_thread(h: &Harness, author: Uuid) -> ContentItem {
        let item = ContentItem {
            id: Uuid::new_v4(),
            author_id: author,
            kind: ContentKind::Thread,
            price: None,
            created_at: Utc::now(),
        };
        h.db.lock()
            .await
            .with_tx::<_, StoreError>(|tx| tx.upsert_content(&item))
            .unwrap();
        item
    }

    /// Tick until the bot takes an action (the trust roll makes any single
    /// tick probabilistic).
    async fn tick_until_acted(h: &Harness, max_ticks: usize) -> TickReport {
        for _ in 0..max_ticks {
            let report = h.scheduler.tick().await;
            if report.acted > 0 {
                return report;
            }
        }
        panic!("bot never acted within {max_ticks} ticks");
    }

    #[tokio::test]
    async fn tick_with_no_bots_is_empty() {
        let h = harness();
        let report = h.scheduler.tick().await;
        assert_eq!(report.considered, 0);
        assert_eq!(report.acted + report.skipped + report.failed, 0);
    }

    #[tokio::test]
    async fn tick_with_no_content_is_a_noop_not_a_failure() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Like, 5)]);
        insert_bot(&h, &bot).await;

        let report = h.scheduler.tick().await;
        assert_eq!(report.considered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.acted, 0);
    }

    #[tokio::test]
    async fn inactive_bots_are_not_considered() {
        let h = harness();
        let mut bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Like, 5)]);
        bot.is_active = false;
        insert_bot(&h, &bot).await;
        insert_thread(&h, Uuid::new_v4()).await;

        let report = h.scheduler.tick().await;
        assert_eq!(report.considered, 0);
    }

    #[tokio::test]
    async fn engagement_like_credits_the_author_and_is_audited() {
        let h = harness();
        // Like-only caps make the outcome deterministic once the bot acts.
        let bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Like, 5)]);
        insert_bot(&h, &bot).await;
        let author = Uuid::new_v4();
        let thread = insert_thread(&h, author).await;

        let report = tick_until_acted(&h, 200).await;
        assert_eq!(report.acted, 1);

        // Author got the like reward, funded by the treasury daily budget.
        let wallet = h.engine.wallet(WalletOwner::User(author)).await.unwrap();
        assert_eq!(wallet.balance, BotConfig::default().like_reward);
        let treasury = h.engine.treasury_status().await.unwrap();
        assert_eq!(treasury.today_spent, BotConfig::default().like_reward);

        // Audit row links the transaction.
        let actions = h
            .db
            .lock()
            .await
            .view::<_, StoreError>(|tx| tx.recent_bot_actions(bot.id, 10))
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, BotActionKind::Like);
        assert_eq!(actions[0].target_id, Some(thread.id));
        assert!(actions[0].transaction_id.is_some());
        assert_eq!(actions[0].outcome, ActionOutcome::Completed);
    }

    #[tokio::test]
    async fn bot_never_acts_twice_on_the_same_target() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Like, 50)]);
        insert_bot(&h, &bot).await;
        let author = Uuid::new_v4();
        insert_thread(&h, author).await;

        tick_until_acted(&h, 200).await;

        // The only thread is now consumed; further ticks cannot act on it.
        for _ in 0..50 {
            h.scheduler.tick().await;
        }

        let actions = h
            .db
            .lock()
            .await
            .view::<_, StoreError>(|tx| tx.recent_bot_actions(bot.id, 100))
            .unwrap();
        let likes = actions
            .iter()
            .filter(|a| a.kind == BotActionKind::Like && a.outcome == ActionOutcome::Completed)
            .count();
        assert_eq!(likes, 1);
    }

    #[tokio::test]
    async fn daily_cap_stops_further_actions() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Like, 1)]);
        insert_bot(&h, &bot).await;
        insert_thread(&h, Uuid::new_v4()).await;
        insert_thread(&h, Uuid::new_v4()).await;

        tick_until_acted(&h, 200).await;

        // Cap of one like per day: every further tick skips the bot.
        for _ in 0..30 {
            let report = h.scheduler.tick().await;
            assert_eq!(report.acted, 0);
        }
    }

    #[tokio::test]
    async fn budget_below_action_cost_skips_cleanly() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Referral, &[(BotActionKind::Referral, 5)]);
        insert_bot(&h, &bot).await;
        insert_thread(&h, Uuid::new_v4()).await;

        // Daily budget below the referral bonus: the strategy plans nothing.
        h.db.lock()
            .await
            .with_tx::<_, StoreError>(|tx| {
                tx.roll_treasury_day(Utc::now().date_naive())?;
                tx.set_daily_spend_limit(1)
            })
            .unwrap();

        for _ in 0..30 {
            let report = h.scheduler.tick().await;
            // Never a hard failure: the bot skips cleanly.
            assert_eq!(report.failed, 0);
            assert_eq!(report.acted, 0);
        }
    }

    #[tokio::test]
    async fn marketplace_purchase_pays_the_seller() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Marketplace, &[(BotActionKind::Purchase, 5)]);
        insert_bot(&h, &bot).await;

        let seller = Uuid::new_v4();
        let listing = ContentItem {
            id: Uuid::new_v4(),
            author_id: seller,
            kind: ContentKind::Listing,
            price: Some(40),
            created_at: Utc::now(),
        };
        h.db.lock()
            .await
            .with_tx::<_, StoreError>(|tx| tx.upsert_content(&listing))
            .unwrap();

        tick_until_acted(&h, 200).await;

        let wallet = h.engine.wallet(WalletOwner::User(seller)).await.unwrap();
        assert_eq!(wallet.balance, 40);
        let treasury = h.engine.treasury_status().await.unwrap();
        assert_eq!(treasury.today_spent, 40);
    }

    #[tokio::test]
    async fn follow_is_coinless() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Engagement, &[(BotActionKind::Follow, 5)]);
        insert_bot(&h, &bot).await;
        let author = Uuid::new_v4();
        insert_thread(&h, author).await;

        tick_until_acted(&h, 200).await;

        // No coins moved, no transaction linked.
        let wallet = h.engine.wallet(WalletOwner::User(author)).await.unwrap();
        assert_eq!(wallet.balance, 0);
        let treasury = h.engine.treasury_status().await.unwrap();
        assert_eq!(treasury.today_spent, 0);

        let actions = h
            .db
            .lock()
            .await
            .view::<_, StoreError>(|tx| tx.recent_bot_actions(bot.id, 10))
            .unwrap();
        assert_eq!(actions[0].kind, BotActionKind::Follow);
        assert!(actions[0].transaction_id.is_none());
        assert!(actions[0].coins.is_none());
    }

    #[tokio::test]
    async fn ledger_failure_is_recorded_per_bot() {
        let h = harness();
        let bot = eager_bot(BotPurpose::Referral, &[(BotActionKind::Referral, 5)]);
        insert_bot(&h, &bot).await;
        insert_thread(&h, Uuid::new_v4()).await;

        // Daily budget passes the advisory check but the treasury wallet
        // itself is empty, so the ledger call fails at commit time.
        let balance = h.engine.treasury_status().await.unwrap().balance;
        h.db.lock()
            .await
            .with_tx::<_, StoreError>(|tx| {
                tx.adjust_balance(WalletOwner::Treasury, -balance)
            })
            .unwrap();

        let mut saw_failure = false;
        for _ in 0..200 {
            let report = h.scheduler.tick().await;
            if report.failed > 0 {
                saw_failure = true;
                assert!(matches!(
                    report.entries.iter().find(|e| matches!(e.outcome, TickOutcome::Failed { .. })),
                    Some(_)
                ));
                break;
            }
        }
        assert!(saw_failure, "expected a recorded per-bot failure");

        let actions = h
            .db
            .lock()
            .await
            .view::<_, StoreError>(|tx| tx.recent_bot_actions(bot.id, 10))
            .unwrap();
        let failed = actions
            .iter()
            .find(|a| a.outcome == ActionOutcome::Failed)
            .expect("failed action recorded");
        assert!(failed.transaction_id.is_none());

        // A ledger-level failure must not leave a committed transaction.
        let err = h
            .engine
            .execute(TransactionRequest {
                operation: Operation::Award {
                    to: Uuid::new_v4(),
                    amount: 1,
                    funding: Funding::Promotional,
                },
                trigger: triggers::BOT_REFERRAL.to_string(),
                channel: triggers::channel::BOT.to_string(),
                metadata: Default::default(),
                idempotency_key: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientTreasuryFunds));
    }
}
