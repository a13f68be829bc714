//! Well-known trigger tags recorded on ledger transactions.
//!
//! A trigger names the semantic origin of a coin movement. Route handlers
//! and the bot engine pass these verbatim; free-form tags are allowed but
//! the constants below are the documented vocabulary.

pub const FORUM_THREAD_POSTED: &str = "forum.thread.posted";
pub const FORUM_REPLY_POSTED: &str = "forum.reply.posted";
pub const FORUM_REPLY_LIKED: &str = "forum.reply.liked";

pub const MARKET_PURCHASE: &str = "market.purchase";
pub const MARKET_SALE: &str = "market.sale";

pub const BOT_LIKE: &str = "bot.engagement.like";
pub const BOT_FOLLOW: &str = "bot.engagement.follow";
pub const BOT_PURCHASE: &str = "bot.marketplace.purchase";
pub const BOT_REFERRAL: &str = "bot.referral.bonus";

pub const ADMIN_REFILL: &str = "admin.treasury.refill";
pub const ADMIN_DRAIN: &str = "admin.wallet.drain";

/// Channel tags: the surface a transaction originated from.
pub mod channel {
    pub const WEB: &str = "web";
    pub const BOT: &str = "bot";
    pub const ADMIN: &str = "admin";
}
