//! Redemption engine.
//!
//! `RECEIVED -> IDEMPOTENCY_CHECK -> RATE_LIMIT_CHECK -> [NONCE_LOCK ->
//! NONCE_VERIFY -> BALANCE_LOCK -> BALANCE_CHECK -> DEBIT -> LEDGER_APPEND ->
//! REDEMPTION_RECORD -> NONCE_CONSUME -> STREAK_UPDATE] -> COMMITTED -> NOTIFY`
//!
//! Everything in brackets runs in one write transaction; any failure there
//! rolls the whole redemption back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use voucher_shared::constants::REDEMPTION_ENGAGEMENT_POINTS;
use voucher_shared::money::line_total;
use voucher_shared::streak;
use voucher_shared::types::{BadgeKind, LedgerEntryType, RedemptionStatus};
use voucher_store::{Database, LedgerEntry, Page, Redemption, SellerFeedItem, User};

use crate::clock::Clock;
use crate::error::ServerError;
use crate::gamification::sweep_badges;
use crate::nonce_authority::NonceAuthority;
use crate::notify::{Notification, NotificationDispatcher};
use crate::rate_limit::SellerRateLimit;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    /// Seller the client read off the QR code.
    #[serde(default, rename = "sellerUUID", alias = "sellerId")]
    pub seller_uuid: Option<Uuid>,
    pub nonce: String,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
    /// Client-side clock, informational only.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_signature: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Result of a redemption.  A replayed idempotency key yields exactly the
/// outcome the first submission produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionOutcome {
    pub id: Uuid,
    pub status: RedemptionStatus,
    pub remaining_balance: i64,
    pub streak_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Redemption> for RedemptionOutcome {
    fn from(r: &Redemption) -> Self {
        Self {
            id: r.id,
            status: r.status,
            remaining_balance: r.remaining_balance,
            streak_count: r.streak_count,
            created_at: r.created_at,
        }
    }
}

struct Committed {
    redemption: Redemption,
    employee: User,
    badges: Vec<BadgeKind>,
}

pub struct RedemptionEngine {
    nonces: Arc<NonceAuthority>,
    rate_limit: SellerRateLimit,
    clock: Arc<dyn Clock>,
    notifications: NotificationDispatcher,
}

impl RedemptionEngine {
    pub fn new(
        nonces: Arc<NonceAuthority>,
        rate_limit: SellerRateLimit,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            nonces,
            rate_limit,
            clock,
            notifications,
        }
    }

    pub fn redeem(
        &self,
        db: &mut Database,
        employee_id: Uuid,
        req: &RedeemRequest,
    ) -> Result<RedemptionOutcome, ServerError> {
        validate(req)?;
        let key = idempotency_key(req);

        if let Some(key) = key {
            if let Some(previous) = db.find_redemption_by_key(key)? {
                info!(redemption = %previous.id, key, "Idempotent replay");
                return Ok(RedemptionOutcome::from(&previous));
            }
        }

        let now = self.clock.now();
        if let Some(client_ts) = req.timestamp {
            debug!(skew_ms = (now - client_ts).num_milliseconds(), "Client clock skew");
        }

        // Throttle the seller the nonce actually belongs to, not the one the
        // client claims.
        let rate_seller = db
            .find_nonce(&req.nonce)?
            .map(|row| row.seller_id)
            .or(req.seller_uuid);
        if let Some(seller_id) = rate_seller {
            self.rate_limit.check(db, seller_id, &now)?;
        }

        let committed = match self.commit(db, employee_id, req, key, now) {
            Ok(committed) => committed,
            Err(err) => {
                if let Some(previous) = concurrent_duplicate(db, key, &err)? {
                    info!(redemption = %previous.id, "Concurrent duplicate resolved to replay");
                    return Ok(RedemptionOutcome::from(&previous));
                }
                warn!(employee = %employee_id, code = err.code(), "Redemption rejected");
                return Err(err);
            }
        };

        let redemption = &committed.redemption;
        info!(
            redemption = %redemption.id,
            employee = %employee_id,
            seller = %redemption.seller_id,
            quantity = redemption.quantity,
            remaining = redemption.remaining_balance,
            streak = redemption.streak_count,
            badges = ?committed.badges,
            "Redemption completed"
        );

        self.notify(db, &committed);
        Ok(RedemptionOutcome::from(redemption))
    }

    fn commit(
        &self,
        db: &mut Database,
        employee_id: Uuid,
        req: &RedeemRequest,
        key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Committed, ServerError> {
        let tx = db.begin_write()?;

        let nonce_row = self
            .nonces
            .verify_and_lock(&tx, &req.nonce, req.seller_uuid, &now)?;
        self.rate_limit
            .check_locked(&tx, nonce_row.seller_id, &now)?;

        let coupon_type = tx
            .find_coupon_type(req.coupon_type_id)?
            .ok_or(ServerError::CouponTypeNotFound)?;

        let balance = tx
            .lock_balance(employee_id, coupon_type.id)?
            .filter(|row| row.balance >= req.quantity)
            .ok_or(ServerError::InsufficientBalance)?;
        let remaining = balance.balance - req.quantity;
        tx.set_balance(employee_id, coupon_type.id, remaining, &now)?;

        tx.append_ledger(&LedgerEntry {
            id: Uuid::new_v4(),
            employee_id,
            seller_id: Some(nonce_row.seller_id),
            entry_type: LedgerEntryType::Redemption,
            amount_minor: line_total(coupon_type.amount_minor, req.quantity)?,
            quantity: req.quantity,
            ref_nonce: Some(nonce_row.nonce.clone()),
            coupon_type: Some(coupon_type.name.clone()),
            created_at: now,
        })?;

        let mut employee = tx
            .lock_user(employee_id)?
            .ok_or(ServerError::EmployeeNotFound)?;
        let (next_streak, change) = streak::advance(&employee.streak(), now);

        let redemption = Redemption {
            id: Uuid::new_v4(),
            employee_id,
            seller_id: nonce_row.seller_id,
            coupon_type_id: coupon_type.id,
            quantity: req.quantity,
            nonce: nonce_row.nonce.clone(),
            device_signature: req.device_signature.clone(),
            idempotency_key: key.map(str::to_string),
            status: RedemptionStatus::Completed,
            remaining_balance: remaining,
            streak_count: next_streak.current_streak,
            created_at: now,
        };
        tx.insert_redemption(&redemption).map_err(|e| {
            if e.is_unique_violation("redemptions.idempotency_key") {
                ServerError::DuplicateSubmission
            } else {
                ServerError::from(e)
            }
        })?;

        tx.mark_nonce_consumed(nonce_row.id)?;

        employee.apply_streak(next_streak);
        employee.engagement_points += REDEMPTION_ENGAGEMENT_POINTS;
        tx.save_gamification(&employee)?;
        debug!(
            employee = %employee_id,
            ?change,
            streak = employee.current_streak,
            "Streak updated"
        );
        let badges = sweep_badges(&tx, &employee, &now)?;

        tx.commit()?;

        Ok(Committed {
            redemption,
            employee,
            badges,
        })
    }

    fn notify(&self, db: &Database, committed: &Committed) {
        let redemption = &committed.redemption;
        let seller_name = match db.find_user(redemption.seller_id) {
            Ok(Some(seller)) => seller.name,
            _ => "Unknown Seller".to_string(),
        };
        self.notifications.dispatch(vec![
            Notification::new(
                redemption.employee_id,
                "Coupon Redeemed",
                format!("{} coupon(s) redeemed at {seller_name}", redemption.quantity),
            ),
            Notification::new(
                redemption.seller_id,
                "Coupon Redeemed",
                format!(
                    "{} coupon(s) redeemed by {}",
                    redemption.quantity, committed.employee.name
                ),
            ),
        ]);
    }

    /// An employee's redemptions, newest first.
    pub fn history(
        &self,
        db: &Database,
        employee_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<Redemption>, ServerError> {
        Ok(db.redemption_history(employee_id, page, limit)?)
    }

    pub fn seller_feed(
        &self,
        db: &Database,
        seller_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SellerFeedItem>, ServerError> {
        Ok(db.seller_feed(seller_id, limit)?)
    }
}

fn validate(req: &RedeemRequest) -> Result<(), ServerError> {
    if req.quantity < 1 {
        return Err(ServerError::Validation("quantity must be at least 1".into()));
    }
    if req.nonce.trim().is_empty() {
        return Err(ServerError::Validation("nonce is required".into()));
    }
    Ok(())
}

fn idempotency_key(req: &RedeemRequest) -> Option<&str> {
    req.idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// A duplicate submission that raced past the pre-check loses either the
/// nonce lock or the idempotency-key insert.  If the winner has committed,
/// its redemption is the answer.
fn concurrent_duplicate(
    db: &Database,
    key: Option<&str>,
    err: &ServerError,
) -> Result<Option<Redemption>, ServerError> {
    let Some(key) = key else {
        return Ok(None);
    };
    if !matches!(err, ServerError::NonceInvalid | ServerError::DuplicateSubmission) {
        return Ok(None);
    }
    Ok(db.find_redemption_by_key(key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Duration;
    use voucher_store::{CouponType, StoreOptions};

    use crate::clock::ManualClock;
    use crate::nonce_authority::NoncePayload;
    use crate::notify::tests::RecordingNotifier;
    use crate::testing::{
        balance_of, count_rows, seed_coupon_type, seed_employee, seed_seller, set_balance, t0,
        temp_db,
    };

    struct Harness {
        dir: tempfile::TempDir,
        db: Database,
        clock: Arc<ManualClock>,
        nonces: Arc<NonceAuthority>,
        engine: RedemptionEngine,
        recorder: Arc<RecordingNotifier>,
        employee: User,
        seller: User,
        latte: CouponType,
    }

    impl Harness {
        fn new(balance: i64) -> Self {
            let (dir, mut db) = temp_db();
            let employee = seed_employee(&db, "ana");
            let seller = seed_seller(&db, "kiosk");
            let latte = seed_coupon_type(&db, "Latte", 350);
            set_balance(&mut db, employee.id, latte.id, balance);

            let clock = Arc::new(ManualClock::new(t0()));
            let nonces = Arc::new(NonceAuthority::new(
                b"unit-secret".to_vec(),
                Duration::minutes(10),
                Duration::seconds(30),
                clock.clone(),
            ));
            let recorder = Arc::new(RecordingNotifier::default());
            let engine = RedemptionEngine::new(
                nonces.clone(),
                SellerRateLimit::default(),
                clock.clone(),
                NotificationDispatcher::new(recorder.clone()),
            );
            Self {
                dir,
                db,
                clock,
                nonces,
                engine,
                recorder,
                employee,
                seller,
                latte,
            }
        }

        fn path(&self) -> PathBuf {
            self.dir.path().join("voucher.db")
        }

        fn fresh_nonce(&mut self) -> NoncePayload {
            self.nonces.force_refresh(&mut self.db, self.seller.id).unwrap()
        }

        fn request(&self, nonce: &NoncePayload, quantity: i64, key: Option<&str>) -> RedeemRequest {
            RedeemRequest {
                seller_uuid: Some(self.seller.id),
                nonce: nonce.nonce.clone(),
                coupon_type_id: self.latte.id,
                quantity,
                timestamp: Some(self.clock.now()),
                device_signature: "device-sig".into(),
                idempotency_key: key.map(str::to_string),
            }
        }

        fn redeem(&mut self, req: &RedeemRequest) -> Result<RedemptionOutcome, ServerError> {
            self.engine.redeem(&mut self.db, self.employee.id, req)
        }

        fn balance(&self) -> Option<i64> {
            balance_of(&self.db, self.employee.id, self.latte.id)
        }

        fn ledger_rows(&self) -> i64 {
            count_rows(
                &self.db,
                "SELECT COUNT(*) FROM ledger_entries
                 WHERE employee_id = ?1 AND type = 'REDEMPTION'",
                self.employee.id,
            )
        }
    }

    #[test]
    fn test_redeem_three_of_five() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();

        let outcome = h.redeem(&h.request(&nonce, 3, Some("k-1"))).unwrap();
        assert_eq!(outcome.status, RedemptionStatus::Completed);
        assert_eq!(outcome.remaining_balance, 2);
        assert_eq!(outcome.streak_count, 1);
        assert_eq!(outcome.created_at, t0());
        assert_eq!(h.balance(), Some(2));

        let ledger = h.db.ledger_page(h.employee.id, 1, 10, None).unwrap();
        let entry = ledger
            .items
            .iter()
            .find(|e| e.entry_type == LedgerEntryType::Redemption)
            .unwrap();
        assert_eq!(h.ledger_rows(), 1);
        assert_eq!(entry.quantity, 3);
        assert_eq!(entry.amount_minor, 1050);
        assert_eq!(entry.seller_id, Some(h.seller.id));
        assert_eq!(entry.ref_nonce.as_deref(), Some(nonce.nonce.as_str()));
        assert_eq!(entry.coupon_type.as_deref(), Some("Latte"));

        assert!(h.db.find_nonce(&nonce.nonce).unwrap().unwrap().consumed);

        let employee = h.db.get_user(h.employee.id).unwrap();
        assert_eq!(employee.engagement_points, 10);
        assert_eq!(employee.current_streak, 1);
        assert_eq!(employee.longest_streak, 1);
        assert_eq!(employee.last_redemption_date, Some(t0()));
        let badges = h.db.earned_badges(h.employee.id).unwrap();
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].kind, BadgeKind::FirstRedemption);
    }

    #[test]
    fn test_insufficient_balance_changes_nothing() {
        let mut h = Harness::new(2);
        let nonce = h.fresh_nonce();

        let err = h.redeem(&h.request(&nonce, 3, None)).unwrap_err();
        assert_eq!(err, ServerError::InsufficientBalance);
        assert_eq!(h.balance(), Some(2));
        assert_eq!(h.ledger_rows(), 0);
        assert!(!h.db.find_nonce(&nonce.nonce).unwrap().unwrap().consumed);
        assert_eq!(h.db.get_user(h.employee.id).unwrap().engagement_points, 0);
        assert!(h.recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_balance_row_is_insufficient() {
        let mut h = Harness::new(0);
        let other = seed_coupon_type(&h.db, "Mocha", 400);
        let nonce = h.fresh_nonce();
        let mut req = h.request(&nonce, 1, None);
        req.coupon_type_id = other.id;
        assert_eq!(h.redeem(&req).unwrap_err(), ServerError::InsufficientBalance);
    }

    #[test]
    fn test_unknown_coupon_type() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();
        let mut req = h.request(&nonce, 1, None);
        req.coupon_type_id = Uuid::new_v4();
        assert_eq!(h.redeem(&req).unwrap_err(), ServerError::CouponTypeNotFound);
    }

    #[test]
    fn test_validation_runs_first() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();
        let zero = h.request(&nonce, 0, None);
        assert!(matches!(h.redeem(&zero), Err(ServerError::Validation(_))));
        let mut blank = h.request(&nonce, 1, None);
        blank.nonce = "  ".into();
        assert!(matches!(h.redeem(&blank), Err(ServerError::Validation(_))));
    }

    #[test]
    fn test_nonce_is_single_use() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();

        h.redeem(&h.request(&nonce, 1, None)).unwrap();
        let err = h.redeem(&h.request(&nonce, 1, None)).unwrap_err();
        assert_eq!(err, ServerError::NonceInvalid);
        assert_eq!(h.balance(), Some(4));
        assert_eq!(h.ledger_rows(), 1);
    }

    #[test]
    fn test_seller_mismatch() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();
        let mut req = h.request(&nonce, 1, None);
        req.seller_uuid = Some(seed_seller(&h.db, "elsewhere").id);
        assert_eq!(h.redeem(&req).unwrap_err(), ServerError::SellerMismatch);
        assert_eq!(h.balance(), Some(5));
    }

    #[test]
    fn test_tampered_row_fails_signature() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();
        h.db.conn()
            .execute(
                "UPDATE seller_nonces SET seller_id = ?1 WHERE nonce = ?2",
                [seed_seller(&h.db, "forger").id.to_string(), nonce.nonce.clone()],
            )
            .unwrap();
        let mut req = h.request(&nonce, 1, None);
        req.seller_uuid = None;
        assert_eq!(h.redeem(&req).unwrap_err(), ServerError::SignatureMismatch);
        assert_eq!(h.balance(), Some(5));
    }

    #[test]
    fn test_drift_allowance() {
        let mut h = Harness::new(5);

        let on_time = h.fresh_nonce();
        h.clock.set(on_time.expires_at + Duration::seconds(29));
        h.redeem(&h.request(&on_time, 1, None)).unwrap();

        h.clock.set(t0());
        let late = h.fresh_nonce();
        h.clock.set(late.expires_at + Duration::seconds(31));
        let err = h.redeem(&h.request(&late, 1, None)).unwrap_err();
        assert_eq!(err, ServerError::NonceExpired);
        assert_eq!(h.balance(), Some(4));
    }

    #[test]
    fn test_idempotent_replay_is_identical() {
        let mut h = Harness::new(5);
        let first_nonce = h.fresh_nonce();
        let first = h.redeem(&h.request(&first_nonce, 2, Some("same-key"))).unwrap();

        // Later, with a different nonce and quantity: still the first outcome.
        h.clock.advance(Duration::minutes(1));
        let second_nonce = h.fresh_nonce();
        let second = h
            .redeem(&h.request(&second_nonce, 1, Some("same-key")))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.balance(), Some(3));
        assert_eq!(h.ledger_rows(), 1);
        assert!(!h.db.find_nonce(&second_nonce.nonce).unwrap().unwrap().consumed);
    }

    #[test]
    fn test_streak_follows_calendar_days() {
        let mut h = Harness::new(10);
        let redeem_at = |h: &mut Harness, at: DateTime<Utc>| {
            h.clock.set(at);
            let nonce = h.fresh_nonce();
            h.redeem(&h.request(&nonce, 1, None)).unwrap().streak_count
        };

        assert_eq!(redeem_at(&mut h, t0()), 1);
        assert_eq!(redeem_at(&mut h, t0() + Duration::hours(3)), 1);
        assert_eq!(redeem_at(&mut h, t0() + Duration::days(1)), 2);
        assert_eq!(redeem_at(&mut h, t0() + Duration::days(2)), 3);
        assert_eq!(redeem_at(&mut h, t0() + Duration::days(5)), 1);

        let employee = h.db.get_user(h.employee.id).unwrap();
        assert_eq!(employee.current_streak, 1);
        assert_eq!(employee.longest_streak, 3);
        // Every completed redemption earns engagement points.
        assert_eq!(employee.engagement_points, 50);
    }

    #[test]
    fn test_rate_limit_after_120() {
        let mut h = Harness::new(200);

        for i in 0..130 {
            let nonce = h.fresh_nonce();
            let result = h.redeem(&h.request(&nonce, 1, None));
            if i < 120 {
                assert!(result.is_ok(), "request {} failed: {result:?}", i + 1);
            } else {
                assert_eq!(result.unwrap_err(), ServerError::RateLimitExceeded);
                assert!(!h.db.find_nonce(&nonce.nonce).unwrap().unwrap().consumed);
            }
        }
        assert_eq!(h.balance(), Some(80));

        // Unknown nonces are throttled against the claimed seller.
        let spare = h.fresh_nonce();
        let mut bogus = h.request(&spare, 1, None);
        bogus.nonce = "not-a-real-nonce".into();
        assert_eq!(h.redeem(&bogus).unwrap_err(), ServerError::RateLimitExceeded);

        // The window slides.
        h.clock.advance(Duration::seconds(61));
        let nonce = h.fresh_nonce();
        assert!(h.redeem(&h.request(&nonce, 1, None)).is_ok());
    }

    #[test]
    fn test_concurrent_requests_at_rate_limit_boundary() {
        let mut h = Harness::new(200);
        for _ in 0..119 {
            let nonce = h.fresh_nonce();
            h.redeem(&h.request(&nonce, 1, None)).unwrap();
        }

        let nonces: Vec<NoncePayload> = (0..16).map(|_| h.fresh_nonce()).collect();
        let requests: Vec<RedeemRequest> = nonces.iter().map(|n| h.request(n, 1, None)).collect();
        let path = h.path();
        let engine = &h.engine;
        let employee_id = h.employee.id;

        let results: Vec<Result<RedemptionOutcome, ServerError>> = std::thread::scope(|s| {
            let handles: Vec<_> = requests
                .iter()
                .map(|req| {
                    let path = path.clone();
                    s.spawn(move || {
                        let mut db = Database::connect(&path, &StoreOptions::default()).unwrap();
                        engine.redeem(&mut db, employee_id, req)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "{results:?}");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(*err, ServerError::RateLimitExceeded);
        }
        let completed = count_rows(
            &h.db,
            "SELECT COUNT(*) FROM redemptions WHERE seller_id = ?1 AND status = 'COMPLETED'",
            h.seller.id,
        );
        assert_eq!(completed, 120);
        assert_eq!(h.balance(), Some(80));
    }

    #[test]
    fn test_dual_notification_after_commit() {
        let mut h = Harness::new(5);
        let nonce = h.fresh_nonce();
        h.redeem(&h.request(&nonce, 2, None)).unwrap();

        let seen = h.recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].user_id, h.employee.id);
        assert_eq!(seen[0].body, "2 coupon(s) redeemed at kiosk");
        assert_eq!(seen[1].user_id, h.seller.id);
        assert_eq!(seen[1].body, "2 coupon(s) redeemed by ana");
    }

    #[test]
    fn test_concurrent_same_nonce_single_winner() {
        let mut h = Harness::new(10);
        let nonce = h.fresh_nonce();
        let path = h.path();
        let engine = &h.engine;
        let employee_id = h.employee.id;
        let requests: Vec<RedeemRequest> = (0..8).map(|_| h.request(&nonce, 1, None)).collect();

        let results: Vec<Result<RedemptionOutcome, ServerError>> = std::thread::scope(|s| {
            let handles: Vec<_> = requests
                .iter()
                .map(|req| {
                    let path = path.clone();
                    s.spawn(move || {
                        let mut db = Database::connect(&path, &StoreOptions::default()).unwrap();
                        engine.redeem(&mut db, employee_id, req)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "{results:?}");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(*err, ServerError::NonceInvalid);
        }
        assert_eq!(h.balance(), Some(9));
        assert_eq!(h.ledger_rows(), 1);
    }

    #[test]
    fn test_concurrent_duplicate_key_single_effect() {
        let mut h = Harness::new(10);
        let nonces: Vec<NoncePayload> = (0..6).map(|_| h.fresh_nonce()).collect();
        let path = h.path();
        let engine = &h.engine;
        let employee_id = h.employee.id;
        // Same key, some sharing a nonce and some not.
        let requests: Vec<RedeemRequest> = nonces
            .iter()
            .enumerate()
            .map(|(i, n)| h.request(if i % 2 == 0 { &nonces[0] } else { n }, 1, Some("dup")))
            .collect();

        let results: Vec<RedemptionOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = requests
                .iter()
                .map(|req| {
                    let path = path.clone();
                    s.spawn(move || {
                        let mut db = Database::connect(&path, &StoreOptions::default()).unwrap();
                        engine.redeem(&mut db, employee_id, req).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|w| w[0] == w[1]), "{results:?}");
        assert_eq!(h.balance(), Some(9));
        assert_eq!(h.ledger_rows(), 1);
    }
}
