//! v002 -- Seed the default rank ladder.
//!
//! Reference data only; admins manage tiers afterwards. `INSERT OR IGNORE`
//! keeps the seed idempotent for databases that already carry a ladder.

use rusqlite::Connection;

const UP_SQL: &str = r#"
INSERT OR IGNORE INTO rank_tiers (id, name, min_xp) VALUES
    (1, 'Newcomer', 0),
    (2, 'Regular', 500),
    (3, 'Veteran', 2000),
    (4, 'Luminary', 5000);

INSERT OR IGNORE INTO feature_unlocks (tier_id, feature_key, description) VALUES
    (2, 'avatar_frame', 'Decorative frame around the profile avatar'),
    (2, 'marketplace_sell', 'Permission to list items on the marketplace'),
    (3, 'custom_title', 'Free-form title shown under the username'),
    (3, 'poll_create', 'Permission to attach polls to threads'),
    (4, 'beta_access', 'Early access to experimental features'),
    (4, 'lounge_access', 'Access to the private lounge forum');
"#;

/// Apply the rank seed migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
