//! v001 -- Initial schema creation.
//!
//! Creates the ledger core (`wallets`, `ledger_transactions`, `ledger_entries`,
//! `idempotency_records`, `treasury`), the bot engine tables (`bots`,
//! `bot_actions`, `content_items`), and the progression tables
//! (`user_rank_progress`, `rank_tiers`, `feature_unlocks`).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Wallets
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS wallets (
    owner      TEXT PRIMARY KEY NOT NULL,    -- user UUID, 'treasury' or 'mint'
    balance    INTEGER NOT NULL DEFAULT 0,
    cap        INTEGER,                      -- NULL = global default applies
    created_at TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Ledger transactions and entries (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ledger_transactions (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    kind            TEXT NOT NULL,              -- earn | spend | adjustment
    idempotency_key TEXT UNIQUE,                -- nullable, unique when present
    trigger_tag     TEXT NOT NULL,              -- semantic origin, e.g. forum.reply.posted
    channel         TEXT NOT NULL,              -- web | bot | admin
    metadata        TEXT NOT NULL,              -- JSON object
    status          TEXT NOT NULL,              -- completed | failed
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL,               -- FK -> ledger_transactions(id)
    position       INTEGER NOT NULL,            -- order within the transaction
    wallet         TEXT NOT NULL,               -- wallet owner key
    direction      TEXT NOT NULL,               -- credit | debit
    amount         INTEGER NOT NULL CHECK (amount > 0),
    memo           TEXT,

    FOREIGN KEY (transaction_id) REFERENCES ledger_transactions(id)
);

CREATE INDEX IF NOT EXISTS idx_entries_transaction
    ON ledger_entries(transaction_id, position);

CREATE INDEX IF NOT EXISTS idx_entries_wallet
    ON ledger_entries(wallet);

-- ----------------------------------------------------------------
-- Idempotency records
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS idempotency_records (
    key            TEXT PRIMARY KEY NOT NULL,
    transaction_id TEXT NOT NULL,               -- FK -> ledger_transactions(id)
    created_at     TEXT NOT NULL,
    expires_at     TEXT NOT NULL,

    FOREIGN KEY (transaction_id) REFERENCES ledger_transactions(id)
);

CREATE INDEX IF NOT EXISTS idx_idempotency_expires
    ON idempotency_records(expires_at);

-- ----------------------------------------------------------------
-- Treasury counters (singleton row, id is always 1)
--
-- The treasury *balance* lives in the wallets table like every other
-- wallet; this row carries the daily-cap accounting and the global
-- default wallet ceiling.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS treasury (
    id                INTEGER PRIMARY KEY CHECK (id = 1),
    daily_spend_limit INTEGER NOT NULL,
    today_spent       INTEGER NOT NULL DEFAULT 0,
    day_start         TEXT NOT NULL,            -- YYYY-MM-DD
    wallet_cap_amount INTEGER NOT NULL
);

-- Seeded with day_start in the past so the first funding rolls the window.
INSERT OR IGNORE INTO treasury
    (id, daily_spend_limit, today_spent, day_start, wallet_cap_amount)
VALUES
    (1, 5000, 0, '1970-01-01', 10000);

-- Opening float: the treasury starts funded, balanced against the mint so
-- the sum of all wallet balances stays zero.
INSERT OR IGNORE INTO wallets (owner, balance, cap, created_at, updated_at)
VALUES
    ('treasury', 100000, NULL, '1970-01-01T00:00:00Z', '1970-01-01T00:00:00Z'),
    ('mint', -100000, NULL, '1970-01-01T00:00:00Z', '1970-01-01T00:00:00Z');

-- ----------------------------------------------------------------
-- Bots
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS bots (
    id            TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    name          TEXT NOT NULL,
    purpose       TEXT NOT NULL,                -- engagement | marketplace | referral
    trust         INTEGER NOT NULL DEFAULT 1,   -- 1..=5
    activity_caps TEXT NOT NULL,                -- JSON: action kind -> daily max
    is_active     INTEGER NOT NULL DEFAULT 1,   -- boolean 0/1
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bot_actions (
    id             TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    bot_id         TEXT NOT NULL,               -- FK -> bots(id)
    kind           TEXT NOT NULL,               -- like | follow | purchase | referral
    target_kind    TEXT,                        -- thread | listing | user
    target_id      TEXT,
    coins          INTEGER,                     -- NULL for coinless actions
    transaction_id TEXT,                        -- NULL for coinless or failed actions
    outcome        TEXT NOT NULL,               -- completed | failed
    created_at     TEXT NOT NULL,

    FOREIGN KEY (bot_id) REFERENCES bots(id)
);

CREATE INDEX IF NOT EXISTS idx_bot_actions_bot_ts
    ON bot_actions(bot_id, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_bot_actions_target
    ON bot_actions(bot_id, target_id);

-- ----------------------------------------------------------------
-- Content read model (synced in by the platform, read by bots)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS content_items (
    id         TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    author_id  TEXT NOT NULL,                   -- user UUID
    kind       TEXT NOT NULL,                   -- thread | listing
    price      INTEGER,                         -- listings only
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_created
    ON content_items(created_at DESC);

-- ----------------------------------------------------------------
-- Rank progression
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_rank_progress (
    user_id         TEXT PRIMARY KEY NOT NULL,  -- user UUID
    current_xp      INTEGER NOT NULL DEFAULT 0,
    weekly_xp       INTEGER NOT NULL DEFAULT 0,
    week_start      TEXT NOT NULL,              -- YYYY-MM-DD
    current_rank_id INTEGER,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rank_tiers (
    id     INTEGER PRIMARY KEY,
    name   TEXT NOT NULL,
    min_xp INTEGER NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS feature_unlocks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tier_id     INTEGER NOT NULL,               -- FK -> rank_tiers(id)
    feature_key TEXT NOT NULL,
    description TEXT NOT NULL,

    FOREIGN KEY (tier_id) REFERENCES rank_tiers(id)
);

CREATE INDEX IF NOT EXISTS idx_unlocks_tier ON feature_unlocks(tier_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
