//! Per-employee balance rows ([`EmployeeCoupon`]).
//!
//! A balance row is a cached projection of the ledger.  Rows are created
//! lazily on first credit and are never deleted.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{BalanceView, EmployeeCoupon};
use crate::rows::{ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

impl Database {
    /// Every balance row the employee holds, joined with its catalog entry.
    pub fn list_balances(&self, employee_id: Uuid) -> Result<Vec<BalanceView>> {
        let mut stmt = self.conn().prepare(
            "SELECT b.coupon_type_id, c.name, b.balance, c.eco_points_modifier, b.last_updated
             FROM employee_coupons b
             JOIN coupon_types c ON c.id = b.coupon_type_id
             WHERE b.employee_id = ?1
             ORDER BY c.name ASC",
        )?;

        let rows = stmt.query_map(params![employee_id.to_string()], |row| {
            Ok(BalanceView {
                coupon_type_id: uuid_at(row, 0)?,
                coupon_type_name: row.get(1)?,
                balance: row.get(2)?,
                eco_points_modifier: row.get(3)?,
                last_updated: ts_at(row, 4)?,
            })
        })?;

        let mut balances = Vec::new();
        for row in rows {
            balances.push(row?);
        }
        Ok(balances)
    }

    pub fn get_balance(
        &self,
        employee_id: Uuid,
        coupon_type_id: Uuid,
    ) -> Result<Option<EmployeeCoupon>> {
        select_balance(self.conn(), employee_id, coupon_type_id)
    }
}

impl WriteTx<'_> {
    pub fn lock_balance(
        &self,
        employee_id: Uuid,
        coupon_type_id: Uuid,
    ) -> Result<Option<EmployeeCoupon>> {
        select_balance(self.conn(), employee_id, coupon_type_id)
    }

    /// Lock two employees' rows for one coupon type, always in ascending
    /// `employee_id` order.  Results come back in argument order.
    pub fn lock_balance_pair(
        &self,
        first: Uuid,
        second: Uuid,
        coupon_type_id: Uuid,
    ) -> Result<(Option<EmployeeCoupon>, Option<EmployeeCoupon>)> {
        if first <= second {
            let a = self.lock_balance(first, coupon_type_id)?;
            let b = self.lock_balance(second, coupon_type_id)?;
            Ok((a, b))
        } else {
            let b = self.lock_balance(second, coupon_type_id)?;
            let a = self.lock_balance(first, coupon_type_id)?;
            Ok((a, b))
        }
    }

    /// Lock the row, creating it with a zero balance if it does not exist.
    pub fn lock_or_create_balance(
        &self,
        employee_id: Uuid,
        coupon_type_id: Uuid,
        now: &DateTime<Utc>,
    ) -> Result<EmployeeCoupon> {
        self.conn().execute(
            "INSERT OR IGNORE INTO employee_coupons
                 (employee_id, coupon_type_id, balance, last_updated)
             VALUES (?1, ?2, 0, ?3)",
            params![employee_id.to_string(), coupon_type_id.to_string(), ts(now)],
        )?;
        select_balance(self.conn(), employee_id, coupon_type_id)?.ok_or(StoreError::NotFound)
    }

    /// Overwrite the balance of an existing row.
    pub fn set_balance(
        &self,
        employee_id: Uuid,
        coupon_type_id: Uuid,
        balance: i64,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        if balance < 0 {
            return Err(StoreError::Constraint(format!(
                "balance for {employee_id} would become {balance}"
            )));
        }
        let affected = self.conn().execute(
            "UPDATE employee_coupons SET balance = ?3, last_updated = ?4
             WHERE employee_id = ?1 AND coupon_type_id = ?2",
            params![
                employee_id.to_string(),
                coupon_type_id.to_string(),
                balance,
                ts(now)
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn select_balance(
    conn: &Connection,
    employee_id: Uuid,
    coupon_type_id: Uuid,
) -> Result<Option<EmployeeCoupon>> {
    let row = conn
        .query_row(
            "SELECT employee_id, coupon_type_id, balance, last_updated
             FROM employee_coupons
             WHERE employee_id = ?1 AND coupon_type_id = ?2",
            params![employee_id.to_string(), coupon_type_id.to_string()],
            row_to_balance,
        )
        .optional()?;
    Ok(row)
}

fn row_to_balance(row: &Row<'_>) -> rusqlite::Result<EmployeeCoupon> {
    Ok(EmployeeCoupon {
        employee_id: uuid_at(row, 0)?,
        coupon_type_id: uuid_at(row, 1)?,
        balance: row.get(2)?,
        last_updated: ts_at(row, 3)?,
    })
}
