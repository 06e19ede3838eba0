//! Eco-points, badges, streak status and the leaderboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use voucher_shared::constants::CARBON_GRAMS_PER_ECO_POINT;
use voucher_shared::gamification::{
    carbon_footprint_grams, eco_points_delta, newly_earned, next_milestone, Beverage,
};
use voucher_shared::time::utc_day;
use voucher_shared::types::{BadgeKind, LedgerEntryType};
use voucher_store::{
    CarbonLedgerRow, Database, DepartmentStanding, EarnedBadge, LeaderboardRow, Page, User,
    WriteTx,
};

use crate::clock::Clock;
use crate::error::ServerError;
use crate::paging::PageQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoPointsAward {
    pub eco_points_added: i64,
    pub total_eco_points: i64,
    pub carbon_footprint_grams: i64,
    pub badges_awarded: Vec<BadgeKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationStats {
    pub engagement_points: i64,
    pub eco_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_redemption_date: Option<DateTime<Utc>>,
    pub badges: Vec<EarnedBadge>,
    pub leaderboard_rank: u32,
    pub carbon_saved_grams: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStatus {
    pub current_streak: i64,
    pub longest_streak: i64,
    /// The streak is alive but nothing has been redeemed today yet.
    pub streak_at_risk: bool,
    pub next_milestone: i64,
    pub days_to_milestone: i64,
    pub reward: &'static str,
}

/// One row of an employee's carbon ledger.  Only redemptions earn points or
/// save carbon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarbonLedgerEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub title: String,
    pub eco_points: i64,
    pub co2e_saved_grams: i64,
    pub created_at: DateTime<Utc>,
}

impl From<CarbonLedgerRow> for CarbonLedgerEntry {
    fn from(row: CarbonLedgerRow) -> Self {
        let entry = row.entry;
        let label = entry.coupon_type.as_deref().unwrap_or("Voucher");
        let title = match entry.entry_type {
            LedgerEntryType::Issuance => format!("Allotted {label}"),
            LedgerEntryType::Redemption => format!("Redeemed {label}"),
            LedgerEntryType::TransferDebit => format!("Gifted {label}"),
            LedgerEntryType::TransferCredit => format!("Received {label}"),
            other => format!("{other} {label}"),
        };

        let (eco_points, co2e_saved_grams) = if entry.entry_type == LedgerEntryType::Redemption {
            let beverage = Beverage::classify(label);
            let per_serving = if row.co2e_grams_per_serving > 0 {
                row.co2e_grams_per_serving
            } else {
                beverage.co2e_grams()
            };
            (
                eco_points_delta(beverage, false).saturating_mul(entry.quantity),
                per_serving.saturating_mul(entry.quantity),
            )
        } else {
            (0, 0)
        };

        Self {
            id: entry.id,
            entry_type: entry.entry_type,
            title,
            eco_points,
            co2e_saved_grams,
            created_at: entry.created_at,
        }
    }
}

/// Award every badge `user` now qualifies for and does not hold yet.  Runs
/// inside the caller's transaction.
pub fn sweep_badges(
    tx: &WriteTx<'_>,
    user: &User,
    now: &DateTime<Utc>,
) -> Result<Vec<BadgeKind>, ServerError> {
    let owned = tx.owned_badges(user.id)?;
    let mut awarded = Vec::new();
    for kind in newly_earned(&user.progress(), now, &owned) {
        if tx.award_badge(user.id, kind, now)? {
            info!(user = %user.id, badge = %kind, "Badge awarded");
            awarded.push(kind);
        }
    }
    Ok(awarded)
}

pub struct GamificationService {
    clock: Arc<dyn Clock>,
}

impl GamificationService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn award_eco_points(
        &self,
        db: &mut Database,
        employee_id: Uuid,
        beverage_label: &str,
        reusable_cup: bool,
    ) -> Result<EcoPointsAward, ServerError> {
        let beverage = Beverage::classify(beverage_label);
        let delta = eco_points_delta(beverage, reusable_cup);
        let now = self.clock.now();

        let tx = db.begin_write()?;
        let mut user = tx
            .lock_user(employee_id)?
            .ok_or(ServerError::UserNotFound)?;
        user.eco_points += delta;
        tx.save_gamification(&user)?;
        let badges_awarded = sweep_badges(&tx, &user, &now)?;
        tx.commit()?;

        info!(user = %employee_id, ?beverage, delta, total = user.eco_points, "Eco-points awarded");
        Ok(EcoPointsAward {
            eco_points_added: delta,
            total_eco_points: user.eco_points,
            carbon_footprint_grams: carbon_footprint_grams(beverage, reusable_cup),
            badges_awarded,
        })
    }

    pub fn stats(
        &self,
        db: &Database,
        employee_id: Uuid,
    ) -> Result<GamificationStats, ServerError> {
        let user = db.find_user(employee_id)?.ok_or(ServerError::UserNotFound)?;
        Ok(GamificationStats {
            engagement_points: user.engagement_points,
            eco_points: user.eco_points,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            last_redemption_date: user.last_redemption_date,
            badges: db.earned_badges(employee_id)?,
            leaderboard_rank: db.engagement_rank(user.engagement_points)?,
            carbon_saved_grams: user.eco_points * CARBON_GRAMS_PER_ECO_POINT,
        })
    }

    pub fn streak_status(
        &self,
        db: &Database,
        employee_id: Uuid,
    ) -> Result<StreakStatus, ServerError> {
        let user = db.find_user(employee_id)?.ok_or(ServerError::UserNotFound)?;
        let today = utc_day(&self.clock.now());
        let redeemed_today = user
            .last_redemption_date
            .as_ref()
            .map(utc_day)
            .is_some_and(|day| day >= today);
        let milestone = next_milestone(user.current_streak);

        Ok(StreakStatus {
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            streak_at_risk: user.current_streak > 0 && !redeemed_today,
            next_milestone: milestone.target,
            days_to_milestone: milestone.target - user.current_streak,
            reward: milestone.reward,
        })
    }

    pub fn leaderboard(
        &self,
        db: &Database,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, ServerError> {
        Ok(db.leaderboard(limit)?)
    }

    pub fn department_leaderboard(
        &self,
        db: &Database,
    ) -> Result<Vec<DepartmentStanding>, ServerError> {
        Ok(db.department_leaderboard()?)
    }

    /// Newest first.
    pub fn carbon_ledger(
        &self,
        db: &Database,
        employee_id: Uuid,
        query: PageQuery,
    ) -> Result<Page<CarbonLedgerEntry>, ServerError> {
        let (page, limit) = query.resolve()?;
        let Page {
            items,
            total,
            page,
            limit,
        } = db.carbon_ledger_page(employee_id, page, limit)?;
        Ok(Page {
            items: items.into_iter().map(CarbonLedgerEntry::from).collect(),
            total,
            page,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{seed_coupon_type, seed_employee, t0, temp_db};
    use chrono::Duration;
    use voucher_shared::types::Role;
    use voucher_store::LedgerEntry;

    fn service(clock: Arc<ManualClock>) -> GamificationService {
        GamificationService::new(clock)
    }

    #[test]
    fn test_eco_points_accumulate_and_award_badge() {
        let (_dir, mut db) = temp_db();
        let ana = seed_employee(&db, "ana");
        let gamification = service(Arc::new(ManualClock::new(t0())));

        let award = gamification
            .award_eco_points(&mut db, ana.id, "green tea", true)
            .unwrap();
        assert_eq!(award.eco_points_added, 27);
        assert_eq!(award.total_eco_points, 27);
        assert_eq!(award.carbon_footprint_grams, 0);
        assert!(award.badges_awarded.is_empty());

        db.conn()
            .execute(
                "UPDATE users SET eco_points = 490 WHERE id = ?1",
                [ana.id.to_string()],
            )
            .unwrap();
        let award = gamification
            .award_eco_points(&mut db, ana.id, "oat latte", false)
            .unwrap();
        assert_eq!(award.total_eco_points, 500);
        assert_eq!(award.badges_awarded, vec![BadgeKind::SustainabilityChampion]);

        // Held badges are never awarded twice.
        let award = gamification
            .award_eco_points(&mut db, ana.id, "oat latte", false)
            .unwrap();
        assert!(award.badges_awarded.is_empty());
    }

    #[test]
    fn test_dairy_never_subtracts() {
        let (_dir, mut db) = temp_db();
        let ana = seed_employee(&db, "ana");
        let gamification = service(Arc::new(ManualClock::new(t0())));
        let award = gamification
            .award_eco_points(&mut db, ana.id, "DAIRY latte", false)
            .unwrap();
        assert_eq!(award.eco_points_added, 0);
        assert_eq!(award.carbon_footprint_grams, 200);
    }

    #[test]
    fn test_unknown_user() {
        let (_dir, mut db) = temp_db();
        let gamification = service(Arc::new(ManualClock::new(t0())));
        assert_eq!(
            gamification
                .award_eco_points(&mut db, Uuid::new_v4(), "tea", false)
                .unwrap_err(),
            ServerError::UserNotFound
        );
        assert_eq!(
            gamification.stats(&db, Uuid::new_v4()).unwrap_err(),
            ServerError::UserNotFound
        );
    }

    #[test]
    fn test_streak_status_flags_risk() {
        let (_dir, db) = temp_db();
        let ana = seed_employee(&db, "ana");
        db.conn()
            .execute(
                "UPDATE users SET current_streak = 5, longest_streak = 9,
                     last_redemption_date = ?2
                 WHERE id = ?1",
                [
                    ana.id.to_string(),
                    voucher_shared::time::to_iso_millis(&(t0() - Duration::days(1))),
                ],
            )
            .unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let gamification = service(clock.clone());

        let status = gamification.streak_status(&db, ana.id).unwrap();
        assert!(status.streak_at_risk);
        assert_eq!(status.next_milestone, 7);
        assert_eq!(status.days_to_milestone, 2);
        assert_eq!(status.reward, "Free Coffee Coupon");

        clock.set(t0() - Duration::days(1) + Duration::hours(1));
        let status = gamification.streak_status(&db, ana.id).unwrap();
        assert!(!status.streak_at_risk);
    }

    #[test]
    fn test_stats_rank_and_carbon() {
        let (_dir, db) = temp_db();
        let ana = seed_employee(&db, "ana");
        let ben = seed_employee(&db, "ben");
        db.conn()
            .execute(
                "UPDATE users SET engagement_points = 40, eco_points = 12 WHERE id = ?1",
                [ben.id.to_string()],
            )
            .unwrap();
        let gamification = service(Arc::new(ManualClock::new(t0())));

        let stats = gamification.stats(&db, ana.id).unwrap();
        assert_eq!(stats.leaderboard_rank, 2);
        let stats = gamification.stats(&db, ben.id).unwrap();
        assert_eq!(stats.leaderboard_rank, 1);
        assert_eq!(stats.carbon_saved_grams, 120);

        let board = gamification.leaderboard(&db, 10).unwrap();
        assert_eq!(board[0].id, ben.id);
    }

    #[test]
    fn test_department_leaderboard() {
        let (_dir, db) = temp_db();
        seed_employee(&db, "cy");
        for (name, department, points) in [("ana", "Ops", 30), ("ben", "Design", 50)] {
            let mut user = User::new(format!("{name}@example.com"), name, Role::Employee);
            user.department = Some(department.into());
            user.engagement_points = points;
            db.insert_user(&user).unwrap();
        }
        let gamification = service(Arc::new(ManualClock::new(t0())));

        let board = gamification.department_leaderboard(&db).unwrap();
        let names: Vec<&str> = board.iter().map(|d| d.department.as_str()).collect();
        assert_eq!(names, vec!["Design", "Ops"]);
        assert_eq!(board[1].total_engagement, 30);
        assert_eq!(board[1].member_count, 1);
    }

    #[test]
    fn test_carbon_ledger_counts_redemptions_only() {
        let (_dir, mut db) = temp_db();
        let ana = seed_employee(&db, "ana");
        let oat = seed_coupon_type(&db, "Oat latte", 400);
        let latte = seed_coupon_type(&db, "Latte", 350);
        db.conn()
            .execute(
                "UPDATE coupon_types SET co2e_grams_per_serving = 50 WHERE id = ?1",
                [latte.id.to_string()],
            )
            .unwrap();

        let entry = |entry_type, coupon: &str, quantity, minutes| LedgerEntry {
            id: Uuid::new_v4(),
            employee_id: ana.id,
            seller_id: None,
            entry_type,
            amount_minor: 0,
            quantity,
            ref_nonce: None,
            coupon_type: Some(coupon.to_string()),
            created_at: t0() + Duration::minutes(minutes),
        };
        let tx = db.begin_write().unwrap();
        tx.append_ledger(&entry(LedgerEntryType::Issuance, &oat.name, 5, 0))
            .unwrap();
        tx.append_ledger(&entry(LedgerEntryType::Redemption, &oat.name, 2, 1))
            .unwrap();
        tx.append_ledger(&entry(LedgerEntryType::Redemption, &latte.name, 1, 2))
            .unwrap();
        tx.commit().unwrap();

        let gamification = service(Arc::new(ManualClock::new(t0())));
        let page = gamification
            .carbon_ledger(&db, ana.id, PageQuery::default())
            .unwrap();
        assert_eq!(page.total, 3);

        let latest = &page.items[0];
        assert_eq!(latest.title, "Redeemed Latte");
        assert_eq!(latest.co2e_saved_grams, 50);
        assert_eq!(latest.eco_points, 0);

        let oat_redeemed = &page.items[1];
        assert_eq!(oat_redeemed.co2e_saved_grams, 120);
        assert_eq!(oat_redeemed.eco_points, 20);

        let issued = &page.items[2];
        assert_eq!(issued.title, "Allotted Oat latte");
        assert_eq!((issued.eco_points, issued.co2e_saved_grams), (0, 0));

        assert!(matches!(
            gamification.carbon_ledger(&db, ana.id, PageQuery::new(1, 0)),
            Err(ServerError::Validation(_))
        ));
    }
}
