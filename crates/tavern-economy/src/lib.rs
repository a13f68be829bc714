//! # tavern-economy
//!
//! The economy core: a ledgered, idempotent coin-transaction engine
//! ([`LedgerEngine`]), the capped global treasury that funds all
//! system-awarded credits, wallet-cap enforcement, and the weekly-capped
//! XP/rank accumulator ([`RankAccumulator`]).
//!
//! Every coin movement is a balanced set of credit/debit entries committed
//! atomically: the idempotency check, balance validation, cap clipping,
//! treasury funding, and row writes share one SQL transaction, serialized
//! behind one async mutex over the database.

pub mod caps;
pub mod engine;
pub mod ranks;
pub mod request;

mod error;
mod treasury;

pub use engine::{ExecuteOutcome, LedgerEngine};
pub use error::{LedgerError, RankError};
pub use ranks::{RankAccumulator, XpResult};
pub use request::{Funding, Operation, TransactionRequest};
