//! Badge ownership.
//!
//! The `badges` catalog is seeded by the initial migration; awarding is an
//! `INSERT OR IGNORE` on the `(user_id, badge_id)` primary key, so awarding
//! twice is a no-op.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use voucher_shared::types::BadgeKind;

use crate::database::Database;
use crate::error::Result;
use crate::models::EarnedBadge;
use crate::rows::{enum_at, ts, ts_at};
use crate::transaction::WriteTx;

impl WriteTx<'_> {
    pub fn owned_badges(&self, user_id: Uuid) -> Result<HashSet<BadgeKind>> {
        let mut stmt = self.conn().prepare(
            "SELECT b.kind FROM user_badges ub
             JOIN badges b ON b.id = ub.badge_id
             WHERE ub.user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| enum_at(row, 0))?;

        let mut owned = HashSet::new();
        for row in rows {
            owned.insert(row?);
        }
        Ok(owned)
    }

    /// Returns `true` if the badge was newly awarded.
    pub fn award_badge(&self, user_id: Uuid, kind: BadgeKind, now: &DateTime<Utc>) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO user_badges (user_id, badge_id, earned_at)
             SELECT ?1, id, ?3 FROM badges WHERE kind = ?2",
            params![user_id.to_string(), kind.as_str(), ts(now)],
        )?;
        Ok(inserted > 0)
    }
}

impl Database {
    /// Badges the user holds, oldest first.
    pub fn earned_badges(&self, user_id: Uuid) -> Result<Vec<EarnedBadge>> {
        let mut stmt = self.conn().prepare(
            "SELECT b.kind, b.description, ub.earned_at
             FROM user_badges ub
             JOIN badges b ON b.id = ub.badge_id
             WHERE ub.user_id = ?1
             ORDER BY ub.earned_at ASC, ub.rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(EarnedBadge {
                kind: enum_at(row, 0)?,
                description: row.get(1)?,
                earned_at: ts_at(row, 2)?,
            })
        })?;

        let mut badges = Vec::new();
        for row in rows {
            badges.push(row?);
        }
        Ok(badges)
    }
}
