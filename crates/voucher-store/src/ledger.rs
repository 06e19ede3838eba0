//! Append-only ledger.
//!
//! There is deliberately no update or delete path for `ledger_entries`.

use rusqlite::{params, Row};
use uuid::Uuid;

use voucher_shared::types::LedgerEntryType;

use crate::database::Database;
use crate::error::Result;
use crate::models::{CarbonLedgerRow, DateRange, GlobalLedgerEntry, LedgerEntry, Page};
use crate::rows::{enum_at, offset, opt_uuid_at, ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

impl WriteTx<'_> {
    pub fn append_ledger(&self, entry: &LedgerEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO ledger_entries (id, employee_id, seller_id, type, amount_minor,
                                         quantity, ref_nonce, coupon_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.to_string(),
                entry.employee_id.to_string(),
                entry.seller_id.map(|s| s.to_string()),
                entry.entry_type.as_str(),
                entry.amount_minor,
                entry.quantity,
                entry.ref_nonce,
                entry.coupon_type,
                ts(&entry.created_at),
            ],
        )?;
        Ok(())
    }
}

impl Database {
    /// One page of an employee's ledger, newest first, optionally bounded by
    /// an inclusive `created_at` range.
    pub fn ledger_page(
        &self,
        employee_id: Uuid,
        page: u32,
        limit: u32,
        range: Option<DateRange>,
    ) -> Result<Page<LedgerEntry>> {
        let start = range.map(|r| ts(&r.start));
        let end = range.map(|r| ts(&r.end));

        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ledger_entries
             WHERE employee_id = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)",
            params![employee_id.to_string(), start, end],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT id, employee_id, seller_id, type, amount_minor, quantity,
                    ref_nonce, coupon_type, created_at
             FROM ledger_entries
             WHERE employee_id = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4 OFFSET ?5",
        )?;

        let rows = stmt.query_map(
            params![employee_id.to_string(), start, end, limit, offset(page, limit)],
            row_to_entry,
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

    /// Every employee's entries, newest first, with optional range and type
    /// filters.
    pub fn global_ledger_page(
        &self,
        page: u32,
        limit: u32,
        range: Option<DateRange>,
        entry_type: Option<LedgerEntryType>,
    ) -> Result<Page<GlobalLedgerEntry>> {
        let start = range.map(|r| ts(&r.start));
        let end = range.map(|r| ts(&r.end));
        let kind = entry_type.map(|t| t.as_str());

        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ledger_entries
             WHERE (?1 IS NULL OR created_at >= ?1)
               AND (?2 IS NULL OR created_at <= ?2)
               AND (?3 IS NULL OR type = ?3)",
            params![start, end, kind],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT le.id, le.employee_id, le.seller_id, le.type, le.amount_minor, le.quantity,
                    le.ref_nonce, le.coupon_type, le.created_at, e.name, s.name
             FROM ledger_entries le
             LEFT JOIN users e ON e.id = le.employee_id
             LEFT JOIN users s ON s.id = le.seller_id
             WHERE (?1 IS NULL OR le.created_at >= ?1)
               AND (?2 IS NULL OR le.created_at <= ?2)
               AND (?3 IS NULL OR le.type = ?3)
             ORDER BY le.created_at DESC, le.rowid DESC
             LIMIT ?4 OFFSET ?5",
        )?;

        let rows = stmt.query_map(params![start, end, kind, limit, offset(page, limit)], |row| {
            Ok(GlobalLedgerEntry {
                entry: row_to_entry(row)?,
                employee_name: row.get(9)?,
                seller_name: row.get(10)?,
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

    /// One page of an employee's ledger, newest first, with the footprint of
    /// each entry's coupon type.
    pub fn carbon_ledger_page(
        &self,
        employee_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<CarbonLedgerRow>> {
        let employee = employee_id.to_string();
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE employee_id = ?1",
            params![employee],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT le.id, le.employee_id, le.seller_id, le.type, le.amount_minor, le.quantity,
                    le.ref_nonce, le.coupon_type, le.created_at,
                    COALESCE(ct.co2e_grams_per_serving, 0)
             FROM ledger_entries le
             LEFT JOIN coupon_types ct ON ct.name = le.coupon_type
             WHERE le.employee_id = ?1
             ORDER BY le.created_at DESC, le.rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![employee, limit, offset(page, limit)], |row| {
            Ok(CarbonLedgerRow {
                entry: row_to_entry(row)?,
                co2e_grams_per_serving: row.get(9)?,
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

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: uuid_at(row, 0)?,
        employee_id: uuid_at(row, 1)?,
        seller_id: opt_uuid_at(row, 2)?,
        entry_type: enum_at(row, 3)?,
        amount_minor: row.get(4)?,
        quantity: row.get(5)?,
        ref_nonce: row.get(6)?,
        coupon_type: row.get(7)?,
        created_at: ts_at(row, 8)?,
    })
}
