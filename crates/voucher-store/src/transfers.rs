//! Peer-to-peer transfer records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Page, Transfer, TransferDirection, TransferHistoryItem, WallTransfer};
use crate::rows::{offset, ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

impl WriteTx<'_> {
    pub fn transfer_nonce_used(&self, sender_id: Uuid, nonce: &str) -> Result<bool> {
        let used = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM transfers WHERE sender_id = ?1 AND nonce = ?2)",
            params![sender_id.to_string(), nonce],
            |row| row.get(0),
        )?;
        Ok(used)
    }

    /// Fails with a UNIQUE violation on `transfers.sender_id, transfers.nonce`
    /// when the sender already used this nonce.
    pub fn insert_transfer(&self, transfer: &Transfer) -> Result<()> {
        self.conn().execute(
            "INSERT INTO transfers (id, sender_id, recipient_id, coupon_type_id, quantity,
                                    nonce, device_signature, appreciation_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                transfer.id.to_string(),
                transfer.sender_id.to_string(),
                transfer.recipient_id.to_string(),
                transfer.coupon_type_id.to_string(),
                transfer.quantity,
                transfer.nonce,
                transfer.device_signature,
                transfer.appreciation_message,
                ts(&transfer.created_at),
            ],
        )?;
        Ok(())
    }
}

impl Database {
    /// Transfers the user sent or received, newest first.
    pub fn transfer_history(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<TransferHistoryItem>> {
        let user = user_id.to_string();
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM transfers WHERE sender_id = ?1 OR recipient_id = ?1",
            params![user],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT t.id, t.sender_id = ?1, s.name, r.name, t.coupon_type_id, t.quantity,
                    t.appreciation_message, t.created_at
             FROM transfers t
             JOIN users s ON s.id = t.sender_id
             JOIN users r ON r.id = t.recipient_id
             WHERE t.sender_id = ?1 OR t.recipient_id = ?1
             ORDER BY t.created_at DESC, t.rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![user, limit, offset(page, limit)], |row| {
            let sent: bool = row.get(1)?;
            let sender_name: String = row.get(2)?;
            let recipient_name: String = row.get(3)?;
            let (direction, counterparty_name) = if sent {
                (TransferDirection::Sent, recipient_name)
            } else {
                (TransferDirection::Received, sender_name)
            };
            Ok(TransferHistoryItem {
                id: uuid_at(row, 0)?,
                direction,
                counterparty_name,
                coupon_type_id: uuid_at(row, 4)?,
                quantity: row.get(5)?,
                appreciation_message: row.get(6)?,
                created_at: ts_at(row, 7)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// Transfers where both parties opted into public recognition.
    pub fn appreciation_wall(&self, page: u32, limit: u32) -> Result<Page<WallTransfer>> {
        const PUBLIC_ONLY: &str = "FROM transfers t
             JOIN users s ON s.id = t.sender_id
             JOIN users r ON r.id = t.recipient_id
             WHERE s.public_recognition = 1 AND r.public_recognition = 1";

        let total: i64 =
            self.conn()
                .query_row(&format!("SELECT COUNT(*) {PUBLIC_ONLY}"), [], |row| row.get(0))?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT s.name, r.name, t.quantity, t.appreciation_message, t.created_at
             {PUBLIC_ONLY}
             ORDER BY t.created_at DESC, t.rowid DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset(page, limit)], |row| {
            Ok(WallTransfer {
                sender_name: row.get(0)?,
                recipient_name: row.get(1)?,
                quantity: row.get(2)?,
                appreciation_message: row.get(3)?,
                created_at: ts_at(row, 4)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }
}
