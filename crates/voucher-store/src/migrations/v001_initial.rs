//! v001 -- Initial schema creation.
//!
//! Identity (`users`), catalog (`coupon_types`), the money path
//! (`employee_coupons`, `ledger_entries`, `seller_nonces`, `redemptions`,
//! `transfers`), gamification (`badges`, `user_badges`) and `audit_logs`.

use rusqlite::{params, Connection};
use uuid::Uuid;

use voucher_shared::gamification::badge_description;
use voucher_shared::types::BadgeKind;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                   TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email                TEXT NOT NULL UNIQUE,
    name                 TEXT NOT NULL,
    role                 TEXT NOT NULL,               -- EMPLOYEE | SELLER | ADMIN | FINANCE
    department           TEXT,
    engagement_points    INTEGER NOT NULL DEFAULT 0,
    eco_points           INTEGER NOT NULL DEFAULT 0,
    current_streak       INTEGER NOT NULL DEFAULT 0,
    longest_streak       INTEGER NOT NULL DEFAULT 0,
    last_redemption_date TEXT,
    is_active            INTEGER NOT NULL DEFAULT 1,
    public_recognition   INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL                -- RFC-3339, millis, Z
);

CREATE INDEX IF NOT EXISTS idx_users_role_points
    ON users(role, engagement_points DESC);

-- ----------------------------------------------------------------
-- Coupon types
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS coupon_types (
    id                     TEXT PRIMARY KEY NOT NULL,
    name                   TEXT NOT NULL UNIQUE,
    description            TEXT NOT NULL DEFAULT '',
    amount_minor           INTEGER NOT NULL CHECK (amount_minor >= 0),
    co2e_grams_per_serving INTEGER NOT NULL DEFAULT 0,
    eco_points_modifier    INTEGER NOT NULL DEFAULT 0,
    is_active              INTEGER NOT NULL DEFAULT 1
);

-- ----------------------------------------------------------------
-- Balance rows
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS employee_coupons (
    employee_id    TEXT NOT NULL,
    coupon_type_id TEXT NOT NULL,
    balance        INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    last_updated   TEXT NOT NULL,

    PRIMARY KEY (employee_id, coupon_type_id),
    FOREIGN KEY (employee_id) REFERENCES users(id),
    FOREIGN KEY (coupon_type_id) REFERENCES coupon_types(id)
);

-- ----------------------------------------------------------------
-- Ledger (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ledger_entries (
    id           TEXT PRIMARY KEY NOT NULL,
    employee_id  TEXT NOT NULL,
    seller_id    TEXT,
    type         TEXT NOT NULL,
    amount_minor INTEGER NOT NULL,
    quantity     INTEGER NOT NULL,
    ref_nonce    TEXT,
    coupon_type  TEXT,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (employee_id) REFERENCES users(id),
    FOREIGN KEY (seller_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_ledger_employee_created
    ON ledger_entries(employee_id, created_at DESC);

-- ----------------------------------------------------------------
-- Seller nonces
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS seller_nonces (
    id             TEXT PRIMARY KEY NOT NULL,
    seller_id      TEXT NOT NULL,
    nonce          TEXT NOT NULL UNIQUE,
    hmac_signature TEXT NOT NULL,                   -- lowercase hex
    expires_at     TEXT NOT NULL,
    consumed       INTEGER NOT NULL DEFAULT 0,
    otp            TEXT,
    created_at     TEXT NOT NULL,

    FOREIGN KEY (seller_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_seller_nonces_seller
    ON seller_nonces(seller_id, consumed, created_at DESC);

-- ----------------------------------------------------------------
-- Redemptions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS redemptions (
    id                TEXT PRIMARY KEY NOT NULL,
    employee_id       TEXT NOT NULL,
    seller_id         TEXT NOT NULL,
    coupon_type_id    TEXT NOT NULL,
    quantity          INTEGER NOT NULL CHECK (quantity >= 1),
    nonce             TEXT NOT NULL,
    device_signature  TEXT NOT NULL,
    idempotency_key   TEXT UNIQUE,
    status            TEXT NOT NULL,
    remaining_balance INTEGER NOT NULL,
    streak_count      INTEGER NOT NULL,
    created_at        TEXT NOT NULL,

    FOREIGN KEY (employee_id) REFERENCES users(id),
    FOREIGN KEY (seller_id) REFERENCES users(id),
    FOREIGN KEY (coupon_type_id) REFERENCES coupon_types(id)
);

CREATE INDEX IF NOT EXISTS idx_redemptions_seller_created
    ON redemptions(seller_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_redemptions_employee_created
    ON redemptions(employee_id, created_at DESC);

-- ----------------------------------------------------------------
-- Transfers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS transfers (
    id                   TEXT PRIMARY KEY NOT NULL,
    sender_id            TEXT NOT NULL,
    recipient_id         TEXT NOT NULL,
    coupon_type_id       TEXT NOT NULL,
    quantity             INTEGER NOT NULL CHECK (quantity >= 1),
    nonce                TEXT NOT NULL,
    device_signature     TEXT NOT NULL,
    appreciation_message TEXT,
    created_at           TEXT NOT NULL,

    UNIQUE (sender_id, nonce),
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (recipient_id) REFERENCES users(id),
    FOREIGN KEY (coupon_type_id) REFERENCES coupon_types(id)
);

CREATE INDEX IF NOT EXISTS idx_transfers_created ON transfers(created_at DESC);

-- ----------------------------------------------------------------
-- Badges
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS badges (
    id          TEXT PRIMARY KEY NOT NULL,
    kind        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_badges (
    user_id   TEXT NOT NULL,
    badge_id  TEXT NOT NULL,
    earned_at TEXT NOT NULL,

    PRIMARY KEY (user_id, badge_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (badge_id) REFERENCES badges(id)
);

-- ----------------------------------------------------------------
-- Audit log
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS audit_logs (
    id         TEXT PRIMARY KEY NOT NULL,
    actor_id   TEXT NOT NULL,
    action     TEXT NOT NULL,
    entity     TEXT NOT NULL,
    entity_id  TEXT,
    details    TEXT NOT NULL DEFAULT '{}',          -- JSON
    created_at TEXT NOT NULL
);
"#;

/// Apply the v001 migration.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO badges (id, kind, description) VALUES (?1, ?2, ?3)",
    )?;
    for kind in BadgeKind::ALL {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            kind.as_str(),
            badge_description(kind)
        ])?;
    }

    Ok(())
}
