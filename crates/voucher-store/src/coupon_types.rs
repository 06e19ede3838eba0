//! CRUD operations for [`CouponType`] records.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::CouponType;
use crate::rows::uuid_at;
use crate::transaction::WriteTx;

const COUPON_TYPE_COLUMNS: &str =
    "id, name, description, amount_minor, co2e_grams_per_serving, eco_points_modifier, is_active";

impl Database {
    pub fn insert_coupon_type(&self, coupon_type: &CouponType) -> Result<()> {
        insert_coupon_type(self.conn(), coupon_type)
    }

    pub fn find_coupon_type(&self, id: Uuid) -> Result<Option<CouponType>> {
        select_coupon_type(self.conn(), id)
    }

    /// Active catalog entries ordered by name.
    pub fn list_active_coupon_types(&self) -> Result<Vec<CouponType>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COUPON_TYPE_COLUMNS} FROM coupon_types
             WHERE is_active = 1
             ORDER BY name ASC"
        ))?;

        let rows = stmt.query_map([], row_to_coupon_type)?;

        let mut types = Vec::new();
        for row in rows {
            types.push(row?);
        }
        Ok(types)
    }
}

impl WriteTx<'_> {
    pub fn insert_coupon_type(&self, coupon_type: &CouponType) -> Result<()> {
        insert_coupon_type(self.conn(), coupon_type)
    }

    pub fn find_coupon_type(&self, id: Uuid) -> Result<Option<CouponType>> {
        select_coupon_type(self.conn(), id)
    }
}

fn insert_coupon_type(conn: &Connection, coupon_type: &CouponType) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO coupon_types ({COUPON_TYPE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            coupon_type.id.to_string(),
            coupon_type.name,
            coupon_type.description,
            coupon_type.amount_minor,
            coupon_type.co2e_grams_per_serving,
            coupon_type.eco_points_modifier,
            coupon_type.is_active,
        ],
    )?;
    Ok(())
}

fn select_coupon_type(conn: &Connection, id: Uuid) -> Result<Option<CouponType>> {
    let coupon_type = conn
        .query_row(
            &format!("SELECT {COUPON_TYPE_COLUMNS} FROM coupon_types WHERE id = ?1"),
            params![id.to_string()],
            row_to_coupon_type,
        )
        .optional()?;
    Ok(coupon_type)
}

fn row_to_coupon_type(row: &Row<'_>) -> rusqlite::Result<CouponType> {
    Ok(CouponType {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        amount_minor: row.get(3)?,
        co2e_grams_per_serving: row.get(4)?,
        eco_points_modifier: row.get(5)?,
        is_active: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temp_db;

    #[test]
    fn inactive_types_are_hidden() {
        let (_dir, db) = temp_db();
        let latte = CouponType::new("Latte", 350);
        let mut retired = CouponType::new("Mocha", 400);
        retired.is_active = false;
        db.insert_coupon_type(&latte).unwrap();
        db.insert_coupon_type(&retired).unwrap();

        let active = db.list_active_coupon_types().unwrap();
        assert_eq!(active, vec![latte.clone()]);
        assert_eq!(db.find_coupon_type(retired.id).unwrap(), Some(retired));
        assert!(db.find_coupon_type(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn names_are_unique() {
        let (_dir, db) = temp_db();
        db.insert_coupon_type(&CouponType::new("Latte", 350)).unwrap();
        let err = db
            .insert_coupon_type(&CouponType::new("Latte", 400))
            .unwrap_err();
        assert!(err.is_unique_violation("coupon_types.name"), "got {err:?}");
    }
}
