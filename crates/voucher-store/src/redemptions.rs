//! Redemption records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Page, Redemption, SellerFeedItem};
use crate::rows::{enum_at, offset, ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

const REDEMPTION_COLUMNS: &str = "id, employee_id, seller_id, coupon_type_id, quantity, nonce,
     device_signature, idempotency_key, status, remaining_balance, streak_count, created_at";

fn count_recent_completed(
    conn: &Connection,
    seller_id: Uuid,
    since: &DateTime<Utc>,
) -> Result<u32> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM redemptions
         WHERE seller_id = ?1 AND status = 'COMPLETED' AND created_at > ?2",
        params![seller_id.to_string(), ts(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}

impl WriteTx<'_> {
    /// Same count as [`Database::count_recent_completed`], exact while the
    /// write lock is held.
    pub fn count_recent_completed(&self, seller_id: Uuid, since: &DateTime<Utc>) -> Result<u32> {
        count_recent_completed(self.conn(), seller_id, since)
    }

    /// Fails with a UNIQUE violation on `redemptions.idempotency_key` when
    /// another redemption already claimed the key.
    pub fn insert_redemption(&self, redemption: &Redemption) -> Result<()> {
        self.conn().execute(
            "INSERT INTO redemptions (id, employee_id, seller_id, coupon_type_id, quantity,
                                      nonce, device_signature, idempotency_key, status,
                                      remaining_balance, streak_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                redemption.id.to_string(),
                redemption.employee_id.to_string(),
                redemption.seller_id.to_string(),
                redemption.coupon_type_id.to_string(),
                redemption.quantity,
                redemption.nonce,
                redemption.device_signature,
                redemption.idempotency_key,
                redemption.status.as_str(),
                redemption.remaining_balance,
                redemption.streak_count,
                ts(&redemption.created_at),
            ],
        )?;
        Ok(())
    }
}

impl Database {
    pub fn find_redemption_by_key(&self, idempotency_key: &str) -> Result<Option<Redemption>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {REDEMPTION_COLUMNS} FROM redemptions WHERE idempotency_key = ?1"),
                params![idempotency_key],
                row_to_redemption,
            )
            .optional()?;
        Ok(row)
    }

    /// COMPLETED redemptions at `seller_id` strictly after `since`.
    pub fn count_recent_completed(&self, seller_id: Uuid, since: &DateTime<Utc>) -> Result<u32> {
        count_recent_completed(self.conn(), seller_id, since)
    }

    /// An employee's redemptions, newest first.
    pub fn redemption_history(
        &self,
        employee_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<Redemption>> {
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM redemptions WHERE employee_id = ?1",
            params![employee_id.to_string()],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM redemptions
             WHERE employee_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![employee_id.to_string(), limit, offset(page, limit)],
            row_to_redemption,
        )?;

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

    /// Latest completed redemptions at a seller, for the kiosk's live feed.
    pub fn seller_feed(&self, seller_id: Uuid, limit: u32) -> Result<Vec<SellerFeedItem>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.id, c.name, u.name, r.quantity, r.created_at
             FROM redemptions r
             JOIN coupon_types c ON c.id = r.coupon_type_id
             JOIN users u ON u.id = r.employee_id
             WHERE r.seller_id = ?1 AND r.status = 'COMPLETED'
             ORDER BY r.created_at DESC, r.rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![seller_id.to_string(), limit], |row| {
            Ok(SellerFeedItem {
                id: uuid_at(row, 0)?,
                coupon_name: row.get(1)?,
                employee_name: row.get(2)?,
                quantity: row.get(3)?,
                created_at: ts_at(row, 4)?,
            })
        })?;

        let mut feed = Vec::new();
        for row in rows {
            feed.push(row?);
        }
        Ok(feed)
    }
}

fn row_to_redemption(row: &Row<'_>) -> rusqlite::Result<Redemption> {
    Ok(Redemption {
        id: uuid_at(row, 0)?,
        employee_id: uuid_at(row, 1)?,
        seller_id: uuid_at(row, 2)?,
        coupon_type_id: uuid_at(row, 3)?,
        quantity: row.get(4)?,
        nonce: row.get(5)?,
        device_signature: row.get(6)?,
        idempotency_key: row.get(7)?,
        status: enum_at(row, 8)?,
        remaining_balance: row.get(9)?,
        streak_count: row.get(10)?,
        created_at: ts_at(row, 11)?,
    })
}
