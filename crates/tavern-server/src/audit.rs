//! Audit events for admin-initiated overrides.
//!
//! Events are emitted on the dedicated `audit` tracing target with
//! structured fields; shipping and retention belong to whatever collector
//! the operator points at it.

use serde_json::Value;

/// Record one admin action.
pub fn record(action: &str, admin_id: &str, detail: Value) {
    tracing::info!(
        target: "audit",
        action,
        admin = admin_id,
        detail = %detail,
        "admin override"
    );
}
