//! Metadata bag attached to ledger transactions.
//!
//! The bag is an opaque string-to-JSON map at the storage layer; the keys
//! below are the documented, versioned vocabulary validated at the API
//! boundary rather than deep inside the engine.

use std::collections::BTreeMap;

use serde_json::Value;

/// Ordered map so serialized metadata is stable for tests and audits.
pub type Metadata = BTreeMap<String, Value>;

pub const KEY_CONTENT_ID: &str = "content_id";
pub const KEY_BOT_ID: &str = "bot_id";
pub const KEY_ADMIN_ID: &str = "admin_id";
pub const KEY_REASON: &str = "reason";
pub const KEY_ACTIVITY: &str = "activity";
pub const KEY_TARGET_USER: &str = "target_user";

/// Build a metadata bag from `(key, value)` pairs.
pub fn bag<I, K>(pairs: I) -> Metadata
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bag_is_ordered() {
        let m = bag([(KEY_REASON, json!("test")), (KEY_ADMIN_ID, json!("a1"))]);
        let keys: Vec<&str> = m.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![KEY_ADMIN_ID, KEY_REASON]);
    }
}
