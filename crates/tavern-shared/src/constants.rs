/// Application name
pub const APP_NAME: &str = "Tavern";

/// Default weekly XP cap per user
pub const DEFAULT_WEEKLY_XP_CAP: i64 = 700;

/// Retention window for idempotency records, in days
pub const IDEMPOTENCY_RETENTION_DAYS: i64 = 30;

/// Lookback window for bot target selection, in minutes
pub const BOT_LOOKBACK_MINUTES: i64 = 30;

/// Default interval between bot ticks, in seconds
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 300;

/// Wall-clock budget for a single tick, in seconds. In-flight bot actions
/// complete past the deadline but no new bot is started.
pub const DEFAULT_TICK_BUDGET_SECS: u64 = 60;

/// Default coin reward attached to a bot like
pub const DEFAULT_LIKE_REWARD: i64 = 2;

/// Default coin bonus attached to a bot referral
pub const DEFAULT_REFERRAL_BONUS: i64 = 25;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
