//! Seller nonce rows.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::SellerNonce;
use crate::rows::{ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

const NONCE_COLUMNS: &str =
    "id, seller_id, nonce, hmac_signature, expires_at, consumed, otp, created_at";

impl Database {
    /// Look up a nonce regardless of its consumed flag.
    pub fn find_nonce(&self, nonce: &str) -> Result<Option<SellerNonce>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {NONCE_COLUMNS} FROM seller_nonces WHERE nonce = ?1"),
                params![nonce],
                row_to_nonce,
            )
            .optional()?;
        Ok(row)
    }
}

impl WriteTx<'_> {
    pub fn insert_nonce(&self, nonce: &SellerNonce) -> Result<()> {
        self.conn().execute(
            "INSERT INTO seller_nonces (id, seller_id, nonce, hmac_signature, expires_at,
                                        consumed, otp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                nonce.id.to_string(),
                nonce.seller_id.to_string(),
                nonce.nonce,
                nonce.hmac_signature,
                ts(&nonce.expires_at),
                nonce.consumed,
                nonce.otp,
                ts(&nonce.created_at),
            ],
        )?;
        Ok(())
    }

    /// The seller's most recently created nonce that has not been consumed.
    pub fn latest_unconsumed_nonce(&self, seller_id: Uuid) -> Result<Option<SellerNonce>> {
        latest_unconsumed(self.conn(), seller_id)
    }

    /// Lock an unconsumed nonce row.  `None` when the token is unknown or
    /// already spent.
    pub fn lock_unconsumed_nonce(&self, nonce: &str) -> Result<Option<SellerNonce>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {NONCE_COLUMNS} FROM seller_nonces
                     WHERE nonce = ?1 AND consumed = 0"
                ),
                params![nonce],
                row_to_nonce,
            )
            .optional()?;
        Ok(row)
    }

    /// Flip `consumed` on a row locked by [`WriteTx::lock_unconsumed_nonce`].
    pub fn mark_nonce_consumed(&self, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE seller_nonces SET consumed = 1 WHERE id = ?1 AND consumed = 0",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn latest_unconsumed(conn: &Connection, seller_id: Uuid) -> Result<Option<SellerNonce>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {NONCE_COLUMNS} FROM seller_nonces
                 WHERE seller_id = ?1 AND consumed = 0
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1"
            ),
            params![seller_id.to_string()],
            row_to_nonce,
        )
        .optional()?;
    Ok(row)
}

fn row_to_nonce(row: &Row<'_>) -> rusqlite::Result<SellerNonce> {
    Ok(SellerNonce {
        id: uuid_at(row, 0)?,
        seller_id: uuid_at(row, 1)?,
        nonce: row.get(2)?,
        hmac_signature: row.get(3)?,
        expires_at: ts_at(row, 4)?,
        consumed: row.get(5)?,
        otp: row.get(6)?,
        created_at: ts_at(row, 7)?,
    })
}
