//! CRUD operations for [`User`] records.
//!
//! Identity fields are written only by [`Database::insert_user`]; the ledger
//! itself only ever touches the gamification columns.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DepartmentStanding, LeaderboardRow, User};
use crate::rows::{enum_at, opt_ts_at, ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

const USER_COLUMNS: &str = "id, email, name, role, department, engagement_points, eco_points,
     current_streak, longest_streak, last_redemption_date, is_active,
     public_recognition, created_at";

impl Database {
    /// Insert a new user.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, name, role, department, engagement_points,
                                eco_points, current_streak, longest_streak,
                                last_redemption_date, is_active, public_recognition,
                                created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                user.id.to_string(),
                user.email,
                user.name,
                user.role.as_str(),
                user.department,
                user.engagement_points,
                user.eco_points,
                user.current_streak,
                user.longest_streak,
                user.last_redemption_date.as_ref().map(ts),
                user.is_active,
                user.public_recognition,
                ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single user by UUID.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        select_user(self.conn(), id)?.ok_or(StoreError::NotFound)
    }

    pub fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        select_user(self.conn(), id)
    }

    /// Active employees ordered by engagement points, highest first.
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, department, engagement_points, eco_points, current_streak
             FROM users
             WHERE role = 'EMPLOYEE' AND is_active = 1
             ORDER BY engagement_points DESC, name ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(LeaderboardRow {
                rank: 0,
                id: uuid_at(row, 0)?,
                name: row.get(1)?,
                department: row.get(2)?,
                engagement_points: row.get(3)?,
                eco_points: row.get(4)?,
                current_streak: row.get(5)?,
            })
        })?;

        let mut board = Vec::new();
        for (idx, row) in rows.enumerate() {
            let mut entry = row?;
            entry.rank = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            board.push(entry);
        }
        Ok(board)
    }

    /// Employees grouped by department, highest total engagement first.
    /// Employees without a department are left out.
    pub fn department_leaderboard(&self) -> Result<Vec<DepartmentStanding>> {
        let mut stmt = self.conn().prepare(
            "SELECT department, SUM(engagement_points), SUM(eco_points), COUNT(*),
                    CAST(ROUND(AVG(engagement_points)) AS INTEGER)
             FROM users
             WHERE role = 'EMPLOYEE' AND department IS NOT NULL
             GROUP BY department
             ORDER BY SUM(engagement_points) DESC, department ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(DepartmentStanding {
                rank: 0,
                department: row.get(0)?,
                total_engagement: row.get(1)?,
                total_eco: row.get(2)?,
                member_count: row.get(3)?,
                avg_engagement: row.get(4)?,
            })
        })?;

        let mut board = Vec::new();
        for (idx, row) in rows.enumerate() {
            let mut entry = row?;
            entry.rank = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            board.push(entry);
        }
        Ok(board)
    }

    /// 1 + the number of employees with strictly more engagement points.
    pub fn engagement_rank(&self, engagement_points: i64) -> Result<u32> {
        let ahead: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM users
             WHERE role = 'EMPLOYEE' AND engagement_points > ?1",
            params![engagement_points],
            |row| row.get(0),
        )?;
        Ok(ahead + 1)
    }
}

impl WriteTx<'_> {
    /// Read a user under the write lock.
    pub fn lock_user(&self, id: Uuid) -> Result<Option<User>> {
        select_user(self.conn(), id)
    }

    /// Persist the gamification fields of `user`.
    pub fn save_gamification(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "UPDATE users
             SET engagement_points = ?2, eco_points = ?3, current_streak = ?4,
                 longest_streak = ?5, last_redemption_date = ?6
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.engagement_points,
                user.eco_points,
                user.current_streak,
                user.longest_streak,
                user.last_redemption_date.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    /// Returns the new total.
    pub fn add_engagement_points(&self, id: Uuid, delta: i64) -> Result<i64> {
        let affected = self.conn().execute(
            "UPDATE users SET engagement_points = engagement_points + ?2 WHERE id = ?1",
            params![id.to_string(), delta],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        let total = self.conn().query_row(
            "SELECT engagement_points FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn select_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: enum_at(row, 3)?,
        department: row.get(4)?,
        engagement_points: row.get(5)?,
        eco_points: row.get(6)?,
        current_streak: row.get(7)?,
        longest_streak: row.get(8)?,
        last_redemption_date: opt_ts_at(row, 9)?,
        is_active: row.get(10)?,
        public_recognition: row.get(11)?,
        created_at: ts_at(row, 12)?,
    })
}
