//! Typed access to the store within a single SQL transaction.
//!
//! [`StoreTx`] is the surface the economy and bot crates program against.
//! [`Database::with_tx`] runs a closure against it inside one rusqlite
//! transaction: the closure returning `Err` rolls everything back, so a
//! ledger commit (idempotency check, balance mutations, treasury counters,
//! audit rows) is all-or-nothing.

use rusqlite::Connection;

use crate::database::Database;
use crate::error::StoreError;

/// A typed view over an open connection or transaction. CRUD methods are
/// implemented in the domain modules (`wallets`, `ledger`, `treasury`, ...).
pub struct StoreTx<'a> {
    pub(crate) conn: &'a Connection,
}

impl<'a> StoreTx<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Database {
    /// Run `f` inside a SQL transaction. Commits when `f` returns `Ok`,
    /// rolls back when it returns `Err`.
    ///
    /// The error type only needs a `From<StoreError>` conversion so domain
    /// crates can thread their own error enums straight through.
    pub fn with_tx<T, E>(
        &mut self,
        f: impl FnOnce(&StoreTx<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let tx = self
            .conn_mut()
            .transaction()
            .map_err(|e| E::from(StoreError::from(e)))?;

        let out = f(&StoreTx::new(&tx))?;

        tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
        Ok(out)
    }

    /// Run a read-only closure against the store without opening an
    /// explicit transaction.
    pub fn view<T, E>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        f(&StoreTx::new(self.conn()))
    }
}
