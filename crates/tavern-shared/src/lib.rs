//! # tavern-shared
//!
//! Domain types shared across the Tavern economy crates: wallet owners,
//! transaction/entry enums, bot classification, trigger tags, and the
//! well-known metadata keys attached to ledger transactions.

pub mod constants;
pub mod metadata;
pub mod triggers;
pub mod types;

pub use types::*;
