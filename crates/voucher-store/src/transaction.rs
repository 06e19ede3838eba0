//! Scoped write transaction.

use rusqlite::{Connection, Transaction};

use crate::error::Result;

/// An open `BEGIN IMMEDIATE` transaction.
///
/// All `lock_*` and mutating helpers live on this type, so nothing can write
/// without holding one.  Dropping the guard without [`WriteTx::commit`] rolls
/// everything back.
///
/// Lock order: a nonce row before any balance row; several balance rows in
/// ascending `employee_id` order.
pub struct WriteTx<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> WriteTx<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Explicit rollback; equivalent to dropping the guard.
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.tx
    }
}
