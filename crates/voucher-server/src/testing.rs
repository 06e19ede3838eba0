//! Shared fixtures for the engine tests.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use voucher_shared::types::Role;
use voucher_store::{CouponType, Database, User};

/// Migrated database in a fresh temp dir.  Keep the `TempDir` alive for as
/// long as the database is used.
pub(crate) fn temp_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("voucher.db")).unwrap();
    (dir, db)
}

/// 2024-06-03 12:00:00 UTC, a Monday.
pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

fn seed(db: &Database, name: &str, role: Role) -> User {
    let user = User::new(format!("{name}-{}@example.com", Uuid::new_v4()), name, role);
    db.insert_user(&user).unwrap();
    user
}

pub(crate) fn seed_employee(db: &Database, name: &str) -> User {
    seed(db, name, Role::Employee)
}

pub(crate) fn seed_seller(db: &Database, name: &str) -> User {
    seed(db, name, Role::Seller)
}

pub(crate) fn seed_admin(db: &Database, name: &str) -> User {
    seed(db, name, Role::Admin)
}

pub(crate) fn seed_coupon_type(db: &Database, name: &str, amount_minor: i64) -> CouponType {
    let coupon_type = CouponType::new(name, amount_minor);
    db.insert_coupon_type(&coupon_type).unwrap();
    coupon_type
}

/// Set a balance row directly, bypassing the ledger.
pub(crate) fn set_balance(
    db: &mut Database,
    employee_id: Uuid,
    coupon_type_id: Uuid,
    balance: i64,
) {
    let now = t0();
    let tx = db.begin_write().unwrap();
    tx.lock_or_create_balance(employee_id, coupon_type_id, &now)
        .unwrap();
    tx.set_balance(employee_id, coupon_type_id, balance, &now)
        .unwrap();
    tx.commit().unwrap();
}

pub(crate) fn balance_of(db: &Database, employee_id: Uuid, coupon_type_id: Uuid) -> Option<i64> {
    db.get_balance(employee_id, coupon_type_id)
        .unwrap()
        .map(|row| row.balance)
}

pub(crate) fn count_rows(db: &Database, sql: &str, id: Uuid) -> i64 {
    db.conn()
        .query_row(sql, [id.to_string()], |row| row.get(0))
        .unwrap()
}
