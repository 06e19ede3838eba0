//! Domain model structs persisted in the voucher database.
//!
//! Every struct derives `Serialize` so the HTTP layer can hand it straight to
//! clients; field names go out in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voucher_shared::gamification::Progress;
use voucher_shared::streak::StreakState;
use voucher_shared::types::{BadgeKind, LedgerEntryType, RedemptionStatus, Role};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An identity known to the ledger.  Owned by the identity subsystem; the
/// ledger only mutates the gamification fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department: Option<String>,
    pub engagement_points: i64,
    pub eco_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_redemption_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub public_recognition: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A fresh, active user with zeroed gamification state.
    pub fn new(email: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name: name.into(),
            role,
            department: None,
            engagement_points: 0,
            eco_points: 0,
            current_streak: 0,
            longest_streak: 0,
            last_redemption_date: None,
            is_active: true,
            public_recognition: false,
            created_at: Utc::now(),
        }
    }

    pub fn streak(&self) -> StreakState {
        StreakState {
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_redemption_date: self.last_redemption_date,
        }
    }

    pub fn apply_streak(&mut self, streak: StreakState) {
        self.current_streak = streak.current_streak;
        self.longest_streak = streak.longest_streak;
        self.last_redemption_date = streak.last_redemption_date;
    }

    pub fn progress(&self) -> Progress {
        Progress {
            engagement_points: self.engagement_points,
            eco_points: self.eco_points,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
        }
    }
}

// ---------------------------------------------------------------------------
// Coupon catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CouponType {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Value of one unit in minor currency units.
    pub amount_minor: i64,
    pub co2e_grams_per_serving: i64,
    pub eco_points_modifier: i64,
    pub is_active: bool,
}

impl CouponType {
    pub fn new(name: impl Into<String>, amount_minor: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            amount_minor,
            co2e_grams_per_serving: 0,
            eco_points_modifier: 0,
            is_active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Cached projection of the ledger for one (employee, coupon type).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeCoupon {
    pub employee_id: Uuid,
    pub coupon_type_id: Uuid,
    pub balance: i64,
    pub last_updated: DateTime<Utc>,
}

/// Balance row joined with its catalog entry, as shown in the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub coupon_type_id: Uuid,
    pub coupon_type_name: String,
    pub balance: i64,
    pub eco_points_modifier: i64,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Immutable record of one balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub seller_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub amount_minor: i64,
    pub quantity: i64,
    pub ref_nonce: Option<String>,
    pub coupon_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry with both parties' display names, for back-office audits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLedgerEntry {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub employee_name: Option<String>,
    pub seller_name: Option<String>,
}

/// A ledger entry joined to its coupon type's per-serving footprint.  The
/// footprint is 0 when the coupon type is unknown or carries none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarbonLedgerRow {
    pub entry: LedgerEntry,
    pub co2e_grams_per_serving: i64,
}

/// Inclusive `created_at` bounds for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// Seller nonces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SellerNonce {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub nonce: String,
    pub hmac_signature: String,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub otp: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Redemptions / transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub seller_id: Uuid,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
    pub nonce: String,
    pub device_signature: String,
    pub idempotency_key: Option<String>,
    pub status: RedemptionStatus,
    /// Balance left after this redemption, kept so a replay can return it.
    pub remaining_balance: i64,
    /// Streak after this redemption, kept so a replay can return it.
    pub streak_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A redemption as seen on the seller's live feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SellerFeedItem {
    pub id: Uuid,
    pub coupon_name: String,
    pub employee_name: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
    pub nonce: String,
    pub device_signature: String,
    pub appreciation_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferDirection {
    Sent,
    Received,
}

/// A transfer from one participant's point of view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferHistoryItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub direction: TransferDirection,
    pub counterparty_name: String,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
    pub appreciation_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transfer between two users who both opted into public recognition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WallTransfer {
    pub sender_name: String,
    pub recipient_name: String,
    pub quantity: i64,
    pub appreciation_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Badges / audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub kind: BadgeKind,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub engagement_points: i64,
    pub eco_points: i64,
    pub current_streak: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStanding {
    pub rank: u32,
    pub department: String,
    pub total_engagement: i64,
    pub total_eco: i64,
    pub member_count: i64,
    /// Mean engagement points per member, rounded to the nearest integer.
    pub avg_engagement: i64,
}
