//! Bot engine tunables, passed down by value from the server config.

use std::time::Duration;

use tavern_shared::constants::{
    BOT_LOOKBACK_MINUTES, DEFAULT_LIKE_REWARD, DEFAULT_REFERRAL_BONUS, DEFAULT_TICK_BUDGET_SECS,
};
use tavern_shared::Coins;

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// How far back the selector scans for fresh content.
    pub lookback_minutes: i64,

    /// Wall-clock budget for one tick. In-flight bot actions complete past
    /// the deadline but no new bot is started.
    pub tick_budget: Duration,

    /// Coin reward a bot like grants the content author.
    pub like_reward: Coins,

    /// Coin bonus a referral bot grants its target user.
    pub referral_bonus: Coins,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: BOT_LOOKBACK_MINUTES,
            tick_budget: Duration::from_secs(DEFAULT_TICK_BUDGET_SECS),
            like_reward: DEFAULT_LIKE_REWARD,
            referral_bonus: DEFAULT_REFERRAL_BONUS,
        }
    }
}
