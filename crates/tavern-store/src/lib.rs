//! # tavern-store
//!
//! Durable SQLite storage for the Tavern economy core.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers for every domain model,
//! plus [`Database::with_tx`], which runs a closure against a [`StoreTx`]
//! inside one SQL transaction. Every ledger commit goes through `with_tx`
//! so that idempotency checks, balance mutations, and treasury accounting
//! are a single atomic unit.

pub mod bots;
pub mod content;
pub mod database;
pub mod idempotency;
pub mod ledger;
pub mod migrations;
pub mod models;
pub mod ranks;
pub mod treasury;
pub mod wallets;

mod convert;
mod error;
mod tx;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use tx::StoreTx;
