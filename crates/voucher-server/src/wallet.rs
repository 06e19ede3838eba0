//! Balances, the ledger, and back-office issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use voucher_shared::money::{format_minor, line_total, parse_minor};
use voucher_shared::types::{LedgerEntryType, Role};
use voucher_store::{
    AuditLog, BalanceView, CouponType, Database, DateRange, GlobalLedgerEntry, LedgerEntry, Page,
};

use crate::clock::Clock;
use crate::error::ServerError;
use crate::paging::PageQuery;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub employee_id: Uuid,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
}

/// Unit price as sent by back-office tools: `"3.50"` or `3.5`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn to_minor(&self) -> Result<i64, ServerError> {
        Ok(match self {
            AmountInput::Text(text) => parse_minor(text)?,
            AmountInput::Number(number) => parse_minor(&number.to_string())?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponTypeRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub amount: AmountInput,
    #[serde(default)]
    pub co2e_grams_per_serving: i64,
    #[serde(default)]
    pub eco_points_modifier: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    pub employee_id: Uuid,
    pub coupon_type_id: Uuid,
    pub coupon_type_name: String,
    pub amount_issued: i64,
    pub new_balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkItemStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIssueResult {
    pub employee_id: Uuid,
    pub status: BulkItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIssueSummary {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkIssueResult>,
}

pub struct WalletService {
    clock: Arc<dyn Clock>,
}

impl WalletService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn balances(
        &self,
        db: &Database,
        employee_id: Uuid,
    ) -> Result<Vec<BalanceView>, ServerError> {
        Ok(db.list_balances(employee_id)?)
    }

    /// Newest first.  `range` bounds are inclusive.
    pub fn ledger(
        &self,
        db: &Database,
        employee_id: Uuid,
        query: PageQuery,
        range: Option<DateRange>,
    ) -> Result<Page<LedgerEntry>, ServerError> {
        let (page, limit) = query.resolve()?;
        check_range(range)?;
        Ok(db.ledger_page(employee_id, page, limit, range)?)
    }

    /// The whole ledger across employees, for finance audits.
    pub fn global_ledger(
        &self,
        db: &Database,
        query: PageQuery,
        range: Option<DateRange>,
        entry_type: Option<LedgerEntryType>,
    ) -> Result<Page<GlobalLedgerEntry>, ServerError> {
        let (page, limit) = query.resolve()?;
        check_range(range)?;
        Ok(db.global_ledger_page(page, limit, range, entry_type)?)
    }

    pub fn coupon_types(&self, db: &Database) -> Result<Vec<CouponType>, ServerError> {
        Ok(db.list_active_coupon_types()?)
    }

    pub fn create_coupon_type(
        &self,
        db: &mut Database,
        actor_id: Uuid,
        req: &CreateCouponTypeRequest,
    ) -> Result<CouponType, ServerError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServerError::Validation("name is required".into()));
        }
        let mut coupon_type = CouponType::new(name, req.amount.to_minor()?);
        coupon_type.description = req.description.trim().to_string();
        coupon_type.co2e_grams_per_serving = req.co2e_grams_per_serving;
        coupon_type.eco_points_modifier = req.eco_points_modifier;
        let now = self.clock.now();

        let tx = db.begin_write()?;
        tx.insert_coupon_type(&coupon_type).map_err(|e| {
            if e.is_unique_violation("coupon_types.name") {
                ServerError::Validation(format!("coupon type {name:?} already exists"))
            } else {
                ServerError::from(e)
            }
        })?;
        tx.insert_audit_log(&AuditLog {
            id: Uuid::new_v4(),
            actor_id,
            action: "CREATE_COUPON".into(),
            entity: "coupon_types".into(),
            entity_id: Some(coupon_type.id.to_string()),
            details: json!({
                "name": coupon_type.name,
                "amount": format_minor(coupon_type.amount_minor),
            }),
            created_at: now,
        })?;
        tx.commit()?;

        info!(actor = %actor_id, coupon_type = %coupon_type.id, name, "Coupon type created");
        Ok(coupon_type)
    }

    /// Credit `quantity` coupons to an employee, recording an ISSUANCE ledger
    /// entry and an audit row in the same transaction.
    pub fn issue(
        &self,
        db: &mut Database,
        actor_id: Uuid,
        req: &IssueRequest,
    ) -> Result<IssueOutcome, ServerError> {
        if req.quantity < 1 {
            return Err(ServerError::Validation("quantity must be at least 1".into()));
        }
        match db.find_user(req.employee_id)? {
            Some(user) if user.role == Role::Employee => {}
            _ => return Err(ServerError::EmployeeNotFound),
        }

        let now = self.clock.now();
        let outcome = self.commit_issue(db, actor_id, req, now)?;
        info!(
            actor = %actor_id,
            employee = %req.employee_id,
            coupon_type = %req.coupon_type_id,
            quantity = req.quantity,
            new_balance = outcome.new_balance,
            "Coupons issued"
        );
        Ok(outcome)
    }

    fn commit_issue(
        &self,
        db: &mut Database,
        actor_id: Uuid,
        req: &IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome, ServerError> {
        let tx = db.begin_write()?;
        let coupon_type = tx
            .find_coupon_type(req.coupon_type_id)?
            .ok_or(ServerError::CouponTypeNotFound)?;

        let row = tx.lock_or_create_balance(req.employee_id, coupon_type.id, &now)?;
        let new_balance = row
            .balance
            .checked_add(req.quantity)
            .ok_or_else(|| ServerError::Validation("balance would overflow".into()))?;
        tx.set_balance(req.employee_id, coupon_type.id, new_balance, &now)?;

        let amount_minor = line_total(coupon_type.amount_minor, req.quantity)?;
        tx.append_ledger(&LedgerEntry {
            id: Uuid::new_v4(),
            employee_id: req.employee_id,
            seller_id: None,
            entry_type: LedgerEntryType::Issuance,
            amount_minor,
            quantity: req.quantity,
            ref_nonce: None,
            coupon_type: Some(coupon_type.name.clone()),
            created_at: now,
        })?;

        tx.insert_audit_log(&AuditLog {
            id: Uuid::new_v4(),
            actor_id,
            action: "COUPON_ISSUED".into(),
            entity: "employee_coupons".into(),
            entity_id: Some(req.employee_id.to_string()),
            details: json!({
                "couponTypeId": coupon_type.id,
                "quantity": req.quantity,
                "amount": format_minor(amount_minor),
                "newBalance": new_balance,
            }),
            created_at: now,
        })?;

        tx.commit()?;
        Ok(IssueOutcome {
            employee_id: req.employee_id,
            coupon_type_id: coupon_type.id,
            coupon_type_name: coupon_type.name,
            amount_issued: req.quantity,
            new_balance,
        })
    }

    /// Each item commits on its own; one failure never undoes another.
    pub fn bulk_issue(
        &self,
        db: &mut Database,
        actor_id: Uuid,
        items: &[IssueRequest],
    ) -> BulkIssueSummary {
        let results: Vec<BulkIssueResult> = items
            .iter()
            .map(|item| match self.issue(db, actor_id, item) {
                Ok(outcome) => BulkIssueResult {
                    employee_id: item.employee_id,
                    status: BulkItemStatus::Success,
                    new_balance: Some(outcome.new_balance),
                    error: None,
                },
                Err(err) => {
                    warn!(
                        employee = %item.employee_id,
                        code = err.code(),
                        "Bulk issue item failed"
                    );
                    BulkIssueResult {
                        employee_id: item.employee_id,
                        status: BulkItemStatus::Failed,
                        new_balance: None,
                        error: Some(err.code().to_string()),
                    }
                }
            })
            .collect();

        let successful = results
            .iter()
            .filter(|r| r.status == BulkItemStatus::Success)
            .count();
        BulkIssueSummary {
            total_processed: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

fn check_range(range: Option<DateRange>) -> Result<(), ServerError> {
    match range {
        Some(range) if range.start > range.end => Err(ServerError::Validation(
            "startDate must not be after endDate".into(),
        )),
        _ => Ok(()),
    }
}
