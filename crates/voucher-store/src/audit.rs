//! Audit trail for back-office actions.

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::AuditLog;
use crate::rows::{ts, ts_at, uuid_at};
use crate::transaction::WriteTx;

impl WriteTx<'_> {
    pub fn insert_audit_log(&self, log: &AuditLog) -> Result<()> {
        let details = serde_json::to_string(&log.details)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.conn().execute(
            "INSERT INTO audit_logs (id, actor_id, action, entity, entity_id, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.id.to_string(),
                log.actor_id.to_string(),
                log.action,
                log.entity,
                log.entity_id,
                details,
                ts(&log.created_at),
            ],
        )?;
        Ok(())
    }
}

impl Database {
    /// Most recent audit rows first.
    pub fn recent_audit_logs(&self, limit: u32) -> Result<Vec<AuditLog>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, actor_id, action, entity, entity_id, details, created_at
             FROM audit_logs
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let details: String = row.get(5)?;
            Ok((
                AuditLog {
                    id: uuid_at(row, 0)?,
                    actor_id: uuid_at(row, 1)?,
                    action: row.get(2)?,
                    entity: row.get(3)?,
                    entity_id: row.get(4)?,
                    details: serde_json::Value::Null,
                    created_at: ts_at(row, 6)?,
                },
                details,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (mut log, details) = row?;
            log.details =
                serde_json::from_str(&details).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            logs.push(log);
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temp_db;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn details_round_trip_as_json() {
        let (_dir, mut db) = temp_db();
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            action: "COUPON_ISSUED".into(),
            entity: "employee_coupons".into(),
            entity_id: Some("abc".into()),
            details: serde_json::json!({ "quantity": 3 }),
            created_at: Utc::now(),
        };
        let tx = db.begin_write().unwrap();
        tx.insert_audit_log(&log).unwrap();
        tx.commit().unwrap();

        let logs = db.recent_audit_logs(5).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details["quantity"], 3);
        assert_eq!(logs[0].action, "COUPON_ISSUED");
    }
}
