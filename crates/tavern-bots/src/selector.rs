//! Target selection: which content or user a bot acts on, and how.
//!
//! Candidates come from the content read model within a lookback window,
//! are filtered to targets the bot has not already acted on, weighted by
//! recency, and picked probabilistically so repeated ticks do not produce
//! a detectable scan order. Each purpose has its own strategy.

use std::collections::BTreeMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;
use uuid::Uuid;

use tavern_shared::triggers;
use tavern_shared::{BotActionKind, BotPurpose, Coins, ContentKind, TargetKind};
use tavern_store::ContentItem;

/// A selectable target with a recency weight (fresher is heavier).
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub item: ContentItem,
    pub weight: f64,
}

/// Everything a strategy may look at when planning an action.
pub(crate) struct SelectionCtx<'a> {
    /// Remaining daily allowance per action kind.
    pub allowances: &'a BTreeMap<BotActionKind, u32>,
    /// Fresh threads the bot has not acted on.
    pub threads: &'a [Candidate],
    /// Fresh listings the bot has not acted on.
    pub listings: &'a [Candidate],
    /// Thread/listing authors the bot has not acted on (for follows and
    /// referrals).
    pub authors: &'a [Candidate],
    pub like_reward: Coins,
    pub referral_bonus: Coins,
    /// Advisory view of the treasury's remaining daily budget. The ledger
    /// engine re-checks atomically at commit time.
    pub treasury_remaining_today: Coins,
}

impl SelectionCtx<'_> {
    fn allowance(&self, kind: BotActionKind) -> u32 {
        self.allowances.get(&kind).copied().unwrap_or(0)
    }
}

/// A concrete action ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedAction {
    pub kind: BotActionKind,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    /// User credited if the action moves coins.
    pub beneficiary: Option<Uuid>,
    /// Coins moved; zero means a coinless action with no transaction.
    pub cost: Coins,
    pub trigger: &'static str,
}

/// Per-purpose selection behavior.
pub(crate) trait PurposeStrategy {
    /// Plan one action, or `None` when no eligible target exists (a clean
    /// no-op for this bot, not a failure).
    fn plan(&self, ctx: &SelectionCtx<'_>, rng: &mut dyn RngCore) -> Option<PlannedAction>;
}

pub(crate) fn strategy_for(purpose: BotPurpose) -> &'static dyn PurposeStrategy {
    match purpose {
        BotPurpose::Engagement => &EngagementStrategy,
        BotPurpose::Marketplace => &MarketplaceStrategy,
        BotPurpose::Referral => &ReferralStrategy,
    }
}

/// Weighted random pick; heavier candidates are more likely but nothing
/// is deterministic.
pub(crate) fn pick_weighted<'a>(
    candidates: &'a [Candidate],
    rng: &mut dyn RngCore,
) -> Option<&'a Candidate> {
    if candidates.is_empty() {
        return None;
    }
    let dist = WeightedIndex::new(candidates.iter().map(|c| c.weight.max(f64::EPSILON))).ok()?;
    candidates.get(dist.sample(rng))
}

// ---------------------------------------------------------------------------
// Engagement: likes on fresh threads, follows of their authors
// ---------------------------------------------------------------------------

struct EngagementStrategy;

impl PurposeStrategy for EngagementStrategy {
    fn plan(&self, ctx: &SelectionCtx<'_>, rng: &mut dyn RngCore) -> Option<PlannedAction> {
        let can_like = ctx.allowance(BotActionKind::Like) > 0
            && !ctx.threads.is_empty()
            && ctx.like_reward <= ctx.treasury_remaining_today;
        let can_follow = ctx.allowance(BotActionKind::Follow) > 0 && !ctx.authors.is_empty();

        let kind = match (can_like, can_follow) {
            (true, true) => {
                // Likes dominate real engagement patterns.
                if rng.next_u32() % 4 < 3 {
                    BotActionKind::Like
                } else {
                    BotActionKind::Follow
                }
            }
            (true, false) => BotActionKind::Like,
            (false, true) => BotActionKind::Follow,
            (false, false) => return None,
        };

        match kind {
            BotActionKind::Like => {
                let target = pick_weighted(ctx.threads, rng)?;
                Some(PlannedAction {
                    kind: BotActionKind::Like,
                    target_kind: TargetKind::Thread,
                    target_id: target.item.id,
                    beneficiary: Some(target.item.author_id),
                    cost: ctx.like_reward,
                    trigger: triggers::BOT_LIKE,
                })
            }
            _ => {
                let target = pick_weighted(ctx.authors, rng)?;
                Some(PlannedAction {
                    kind: BotActionKind::Follow,
                    target_kind: TargetKind::User,
                    target_id: target.item.author_id,
                    beneficiary: None,
                    cost: 0,
                    trigger: triggers::BOT_FOLLOW,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Marketplace: purchases of affordable fresh listings
// ---------------------------------------------------------------------------

struct MarketplaceStrategy;

impl PurposeStrategy for MarketplaceStrategy {
    fn plan(&self, ctx: &SelectionCtx<'_>, rng: &mut dyn RngCore) -> Option<PlannedAction> {
        if ctx.allowance(BotActionKind::Purchase) == 0 {
            return None;
        }

        // Listings the remaining daily budget can still cover.
        let affordable: Vec<Candidate> = ctx
            .listings
            .iter()
            .filter(|c| {
                c.item.kind == ContentKind::Listing
                    && matches!(c.item.price, Some(p) if p > 0 && p <= ctx.treasury_remaining_today)
            })
            .cloned()
            .collect();

        let target = pick_weighted(&affordable, rng)?;
        Some(PlannedAction {
            kind: BotActionKind::Purchase,
            target_kind: TargetKind::Listing,
            target_id: target.item.id,
            beneficiary: Some(target.item.author_id),
            cost: target.item.price.unwrap_or(0),
            trigger: triggers::BOT_PURCHASE,
        })
    }
}

// ---------------------------------------------------------------------------
// Referral: bonuses for recently active authors
// ---------------------------------------------------------------------------

struct ReferralStrategy;

impl PurposeStrategy for ReferralStrategy {
    fn plan(&self, ctx: &SelectionCtx<'_>, rng: &mut dyn RngCore) -> Option<PlannedAction> {
        if ctx.allowance(BotActionKind::Referral) == 0
            || ctx.referral_bonus > ctx.treasury_remaining_today
        {
            return None;
        }

        let target = pick_weighted(ctx.authors, rng)?;
        Some(PlannedAction {
            kind: BotActionKind::Referral,
            target_kind: TargetKind::User,
            target_id: target.item.author_id,
            beneficiary: Some(target.item.author_id),
            cost: ctx.referral_bonus,
            trigger: triggers::BOT_REFERRAL,
        })
    }
}

/// Idempotency key for a bot action: a retried tick cannot double-act on
/// the same target.
pub(crate) fn idempotency_key(bot_id: Uuid, kind: BotActionKind, target_id: Uuid) -> String {
    format!("bot:{}:{}:{}", bot_id, kind.as_str(), target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tavern_shared::TrustLevel;
    use tavern_store::Bot;

    fn candidate(kind: ContentKind, price: Option<Coins>, weight: f64) -> Candidate {
        Candidate {
            item: ContentItem {
                id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                kind,
                price,
                created_at: Utc::now() - Duration::minutes(5),
            },
            weight,
        }
    }

    fn bot(purpose: BotPurpose) -> Bot {
        Bot {
            id: Uuid::new_v4(),
            name: "test-bot".to_string(),
            purpose,
            trust: TrustLevel::new(3),
            activity_caps: crate::registry::default_caps(purpose),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn pick_weighted_handles_empty_and_heavy() {
        let mut rng = rng();
        assert!(pick_weighted(&[], &mut rng).is_none());

        // One candidate overwhelmingly heavier than the other.
        let heavy = candidate(ContentKind::Thread, None, 10_000.0);
        let light = candidate(ContentKind::Thread, None, 0.0001);
        let candidates = vec![heavy.clone(), light];

        let mut heavy_picks = 0;
        for _ in 0..50 {
            if pick_weighted(&candidates, &mut rng).unwrap().item.id == heavy.item.id {
                heavy_picks += 1;
            }
        }
        assert!(heavy_picks > 40);
    }

    #[test]
    fn engagement_plans_like_or_follow() {
        let b = bot(BotPurpose::Engagement);
        let threads = vec![candidate(ContentKind::Thread, None, 1.0)];
        let authors = threads.clone();
        let ctx = SelectionCtx {
            allowances: &b.activity_caps,
            threads: &threads,
            listings: &[],
            authors: &authors,
            like_reward: 2,
            referral_bonus: 25,
            treasury_remaining_today: 1000,
        };

        let mut rng = rng();
        let planned = strategy_for(BotPurpose::Engagement)
            .plan(&ctx, &mut rng)
            .unwrap();
        assert!(matches!(
            planned.kind,
            BotActionKind::Like | BotActionKind::Follow
        ));
        if planned.kind == BotActionKind::Like {
            assert_eq!(planned.cost, 2);
            assert_eq!(planned.target_id, threads[0].item.id);
        } else {
            assert_eq!(planned.cost, 0);
        }
    }

    #[test]
    fn engagement_fallbacks_to_follow_when_budget_gone() {
        let b = bot(BotPurpose::Engagement);
        let threads = vec![candidate(ContentKind::Thread, None, 1.0)];
        let authors = threads.clone();
        let ctx = SelectionCtx {
            allowances: &b.activity_caps,
            threads: &threads,
            listings: &[],
            authors: &authors,
            like_reward: 2,
            referral_bonus: 25,
            // Nothing left to fund likes with.
            treasury_remaining_today: 0,
        };

        let mut rng = rng();
        let planned = strategy_for(BotPurpose::Engagement)
            .plan(&ctx, &mut rng)
            .unwrap();
        assert_eq!(planned.kind, BotActionKind::Follow);
    }

    #[test]
    fn marketplace_skips_unaffordable_listings() {
        let b = bot(BotPurpose::Marketplace);
        let listings = vec![
            candidate(ContentKind::Listing, Some(40), 1.0),
            candidate(ContentKind::Listing, Some(900), 1.0),
        ];
        let ctx = SelectionCtx {
            allowances: &b.activity_caps,
            threads: &[],
            listings: &listings,
            authors: &[],
            like_reward: 2,
            referral_bonus: 25,
            treasury_remaining_today: 100,
        };

        let mut rng = rng();
        for _ in 0..20 {
            let planned = strategy_for(BotPurpose::Marketplace)
                .plan(&ctx, &mut rng)
                .unwrap();
            assert_eq!(planned.kind, BotActionKind::Purchase);
            assert_eq!(planned.cost, 40);
        }
    }

    #[test]
    fn marketplace_with_no_listings_is_a_noop() {
        let b = bot(BotPurpose::Marketplace);
        let threads = vec![candidate(ContentKind::Thread, None, 1.0)];
        let ctx = SelectionCtx {
            allowances: &b.activity_caps,
            threads: &threads,
            listings: &[],
            authors: &threads,
            like_reward: 2,
            referral_bonus: 25,
            treasury_remaining_today: 1000,
        };

        let mut rng = rng();
        assert!(strategy_for(BotPurpose::Marketplace)
            .plan(&ctx, &mut rng)
            .is_none());
    }

    #[test]
    fn referral_targets_an_author() {
        let b = bot(BotPurpose::Referral);
        let authors = vec![candidate(ContentKind::Thread, None, 1.0)];
        let ctx = SelectionCtx {
            allowances: &b.activity_caps,
            threads: &[],
            listings: &[],
            authors: &authors,
            like_reward: 2,
            referral_bonus: 25,
            treasury_remaining_today: 1000,
        };

        let mut rng = rng();
        let planned = strategy_for(BotPurpose::Referral)
            .plan(&ctx, &mut rng)
            .unwrap();
        assert_eq!(planned.kind, BotActionKind::Referral);
        assert_eq!(planned.target_kind, TargetKind::User);
        assert_eq!(planned.beneficiary, Some(authors[0].item.author_id));
        assert_eq!(planned.cost, 25);
    }

    #[test]
    fn idempotency_key_is_stable() {
        let bot_id = Uuid::new_v4();
        let target = Uuid::new_v4();
        let a = idempotency_key(bot_id, BotActionKind::Like, target);
        let b = idempotency_key(bot_id, BotActionKind::Like, target);
        assert_eq!(a, b);
        assert!(a.starts_with("bot:"));
    }
}
