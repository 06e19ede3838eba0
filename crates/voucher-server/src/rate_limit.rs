//! Per-seller redemption throttle.
//!
//! A sliding window over COMPLETED redemption rows, so every server process
//! sharing the database sees the same count.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use voucher_shared::constants::{MAX_REDEMPTIONS_PER_SELLER, RATE_LIMIT_WINDOW_SECS};
use voucher_store::{Database, WriteTx};

use crate::error::ServerError;

#[derive(Debug, Clone, Copy)]
pub struct SellerRateLimit {
    max: u32,
    window: Duration,
}

impl SellerRateLimit {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }

    /// Reject once the seller already has `max` completed redemptions newer
    /// than `now - window`.
    pub fn check(
        &self,
        db: &Database,
        seller_id: Uuid,
        now: &DateTime<Utc>,
    ) -> Result<(), ServerError> {
        let recent = db.count_recent_completed(seller_id, &(*now - self.window))?;
        self.admit(seller_id, recent)
    }

    /// [`check`](Self::check) under the write lock. Concurrent writers are
    /// serialized here, so the count cannot go stale before the insert.
    pub fn check_locked(
        &self,
        tx: &WriteTx<'_>,
        seller_id: Uuid,
        now: &DateTime<Utc>,
    ) -> Result<(), ServerError> {
        let recent = tx.count_recent_completed(seller_id, &(*now - self.window))?;
        self.admit(seller_id, recent)
    }

    fn admit(&self, seller_id: Uuid, recent: u32) -> Result<(), ServerError> {
        if recent >= self.max {
            warn!(seller = %seller_id, recent, max = self.max, "Seller rate limit exceeded");
            return Err(ServerError::RateLimitExceeded);
        }
        Ok(())
    }
}

impl Default for SellerRateLimit {
    fn default() -> Self {
        Self::new(
            MAX_REDEMPTIONS_PER_SELLER,
            Duration::seconds(RATE_LIMIT_WINDOW_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_coupon_type, seed_employee, seed_seller, t0, temp_db};
    use voucher_shared::types::RedemptionStatus;
    use voucher_store::Redemption;

    fn completed_at(
        db: &mut Database,
        employee: Uuid,
        seller: Uuid,
        coupon: Uuid,
        at: DateTime<Utc>,
    ) {
        let tx = db.begin_write().unwrap();
        tx.insert_redemption(&Redemption {
            id: Uuid::new_v4(),
            employee_id: employee,
            seller_id: seller,
            coupon_type_id: coupon,
            quantity: 1,
            nonce: Uuid::new_v4().to_string(),
            device_signature: String::new(),
            idempotency_key: None,
            status: RedemptionStatus::Completed,
            remaining_balance: 0,
            streak_count: 1,
            created_at: at,
        })
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_window_slides() {
        let (_dir, mut db) = temp_db();
        let employee = seed_employee(&db, "ana");
        let seller = seed_seller(&db, "kiosk");
        let latte = seed_coupon_type(&db, "Latte", 350);
        let limit = SellerRateLimit::new(2, Duration::seconds(60));

        completed_at(&mut db, employee.id, seller.id, latte.id, t0());
        completed_at(&mut db, employee.id, seller.id, latte.id, t0() + Duration::seconds(10));

        let now = t0() + Duration::seconds(30);
        assert_eq!(
            limit.check(&db, seller.id, &now).unwrap_err(),
            ServerError::RateLimitExceeded
        );
        // Other sellers are unaffected.
        assert!(limit.check(&db, Uuid::new_v4(), &now).is_ok());
        // The oldest row falls out of the window.
        let later = t0() + Duration::seconds(61);
        assert!(limit.check(&db, seller.id, &later).is_ok());
    }

    #[test]
    fn test_locked_check_sees_uncommitted_rows() {
        let (_dir, mut db) = temp_db();
        let employee = seed_employee(&db, "ana");
        let seller = seed_seller(&db, "kiosk");
        let latte = seed_coupon_type(&db, "Latte", 350);
        let limit = SellerRateLimit::new(1, Duration::seconds(60));

        let tx = db.begin_write().unwrap();
        assert!(limit.check_locked(&tx, seller.id, &t0()).is_ok());
        tx.insert_redemption(&Redemption {
            id: Uuid::new_v4(),
            employee_id: employee.id,
            seller_id: seller.id,
            coupon_type_id: latte.id,
            quantity: 1,
            nonce: "n-1".into(),
            device_signature: String::new(),
            idempotency_key: None,
            status: RedemptionStatus::Completed,
            remaining_balance: 0,
            streak_count: 1,
            created_at: t0(),
        })
        .unwrap();
        assert_eq!(
            limit.check_locked(&tx, seller.id, &t0()).unwrap_err(),
            ServerError::RateLimitExceeded
        );
        tx.rollback().unwrap();

        assert!(limit.check(&db, seller.id, &t0()).is_ok());
    }
}
