//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tavern_bots::BotConfig;
use tavern_shared::constants;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Explicit database file path. When unset, the platform data
    /// directory is used.
    /// Env: `DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Tavern Node"`
    pub instance_name: String,

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Whether the bot tick timer runs. Disable to drive ticks manually
    /// via the admin API.
    /// Env: `BOT_TICKS_ENABLED` (true/false)
    /// Default: `true`
    pub bot_ticks_enabled: bool,

    /// Seconds between scheduled bot ticks.
    /// Env: `TICK_INTERVAL_SECS`
    /// Default: `300`
    pub tick_interval_secs: u64,

    /// Wall-clock budget for one tick, in seconds.
    /// Env: `TICK_BUDGET_SECS`
    /// Default: `60`
    pub tick_budget_secs: u64,

    /// Lookback window for bot target selection, in minutes.
    /// Env: `LOOKBACK_MINUTES`
    /// Default: `30`
    pub lookback_minutes: i64,

    /// Weekly XP cap per user.
    /// Env: `WEEKLY_XP_CAP`
    /// Default: `700`
    pub weekly_xp_cap: i64,

    /// Coin reward attached to a bot like.
    /// Env: `LIKE_REWARD`
    pub like_reward: i64,

    /// Coin bonus attached to a bot referral.
    /// Env: `REFERRAL_BONUS`
    pub referral_bonus: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], constants::DEFAULT_HTTP_PORT).into(),
            db_path: None,
            instance_name: "Tavern Node".to_string(),
            admin_token: None,
            bot_ticks_enabled: true,
            tick_interval_secs: constants::DEFAULT_TICK_INTERVAL_SECS,
            tick_budget_secs: constants::DEFAULT_TICK_BUDGET_SECS,
            lookback_minutes: constants::BOT_LOOKBACK_MINUTES,
            weekly_xp_cap: constants::DEFAULT_WEEKLY_XP_CAP,
            like_reward: constants::DEFAULT_LIKE_REWARD,
            referral_bonus: constants::DEFAULT_REFERRAL_BONUS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(token) = std::env::var("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Ok(val) = std::env::var("BOT_TICKS_ENABLED") {
            config.bot_ticks_enabled = val != "false" && val != "0";
        }

        parse_env("TICK_INTERVAL_SECS", &mut config.tick_interval_secs);
        parse_env("TICK_BUDGET_SECS", &mut config.tick_budget_secs);
        parse_env("LOOKBACK_MINUTES", &mut config.lookback_minutes);
        parse_env("WEEKLY_XP_CAP", &mut config.weekly_xp_cap);
        parse_env("LIKE_REWARD", &mut config.like_reward);
        parse_env("REFERRAL_BONUS", &mut config.referral_bonus);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn bot_config(&self) -> BotConfig {
        BotConfig {
            lookback_minutes: self.lookback_minutes,
            tick_budget: Duration::from_secs(self.tick_budget_secs),
            like_reward: self.like_reward,
            referral_bonus: self.referral_bonus,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, out: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(parsed) = val.parse::<T>() {
            *out = parsed;
        } else {
            tracing::warn!(key, value = %val, "Invalid value, using default");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_token.is_none());
        assert!(config.bot_ticks_enabled);
        assert_eq!(config.weekly_xp_cap, 700);
    }

    #[test]
    fn test_bot_config_shares_rewards() {
        let mut config = ServerConfig::default();
        config.like_reward = 7;
        config.tick_budget_secs = 10;
        let bots = config.bot_config();
        assert_eq!(bots.like_reward, 7);
        assert_eq!(bots.tick_budget, Duration::from_secs(10));
    }
}
