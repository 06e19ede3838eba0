//! Peer-to-peer coupon transfers.
//!
//! The transfer nonce is an anti-replay token, not a signed credential: it is
//! stored on the transfer row and a sender can use each value once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use voucher_shared::constants::TRANSFER_ENGAGEMENT_POINTS;
use voucher_shared::money::line_total;
use voucher_shared::types::{LedgerEntryType, RedemptionStatus, Role};
use voucher_store::{Database, LedgerEntry, Page, Transfer, TransferHistoryItem, User, WallTransfer};

use crate::clock::Clock;
use crate::error::ServerError;
use crate::notify::{Notification, NotificationDispatcher};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub recipient_id: Uuid,
    pub coupon_type_id: Uuid,
    pub quantity: i64,
    pub nonce: String,
    #[serde(default)]
    pub device_signature: String,
    #[serde(default)]
    pub appreciation_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub id: Uuid,
    pub status: RedemptionStatus,
    pub sender_remaining_balance: i64,
    pub recipient_name: String,
    /// Present only when both parties opted into public recognition.
    pub appreciation_wall_entry: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct TransferEngine {
    clock: Arc<dyn Clock>,
    notifications: NotificationDispatcher,
}

impl TransferEngine {
    pub fn new(clock: Arc<dyn Clock>, notifications: NotificationDispatcher) -> Self {
        Self {
            clock,
            notifications,
        }
    }

    pub fn transfer(
        &self,
        db: &mut Database,
        sender_id: Uuid,
        req: &TransferRequest,
    ) -> Result<TransferOutcome, ServerError> {
        if req.quantity < 1 {
            return Err(ServerError::Validation("quantity must be at least 1".into()));
        }
        if req.nonce.trim().is_empty() {
            return Err(ServerError::Validation("nonce is required".into()));
        }
        if sender_id == req.recipient_id {
            return Err(ServerError::SelfTransferForbidden);
        }

        let recipient = match db.find_user(req.recipient_id)? {
            Some(user) if user.is_active && user.role == Role::Employee => user,
            _ => return Err(ServerError::RecipientNotFound),
        };
        let sender = db.find_user(sender_id)?.ok_or(ServerError::UserNotFound)?;

        let now = self.clock.now();
        let (transfer, sender_remaining) = match self.commit(db, &sender, &recipient, req, now) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(sender = %sender_id, code = err.code(), "Transfer rejected");
                return Err(err);
            }
        };

        info!(
            transfer = %transfer.id,
            sender = %sender_id,
            recipient = %recipient.id,
            quantity = transfer.quantity,
            "Transfer completed"
        );

        let appreciation_wall_entry = (sender.public_recognition && recipient.public_recognition)
            .then(|| {
                format!(
                    "{} gifted {} {} coupon(s)!",
                    sender.name, recipient.name, transfer.quantity
                )
            });

        self.notifications.dispatch(vec![
            Notification::new(
                sender.id,
                "Coupon Gifted",
                format!("You gifted {} coupon(s) to {}", transfer.quantity, recipient.name),
            ),
            Notification::new(
                recipient.id,
                "Coupon Received",
                format!("{} gifted you {} coupon(s)!", sender.name, transfer.quantity),
            ),
        ]);

        Ok(TransferOutcome {
            id: transfer.id,
            status: RedemptionStatus::Completed,
            sender_remaining_balance: sender_remaining,
            recipient_name: recipient.name,
            appreciation_wall_entry,
            created_at: transfer.created_at,
        })
    }

    fn commit(
        &self,
        db: &mut Database,
        sender: &User,
        recipient: &User,
        req: &TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<(Transfer, i64), ServerError> {
        let tx = db.begin_write()?;

        if tx.transfer_nonce_used(sender.id, &req.nonce)? {
            return Err(ServerError::TransferReplayed);
        }

        let coupon_type = tx
            .find_coupon_type(req.coupon_type_id)?
            .ok_or(ServerError::CouponTypeNotFound)?;

        let (sender_row, _) = tx.lock_balance_pair(sender.id, recipient.id, coupon_type.id)?;
        let sender_row = sender_row
            .filter(|row| row.balance >= req.quantity)
            .ok_or(ServerError::InsufficientBalance)?;

        let sender_remaining = sender_row.balance - req.quantity;
        tx.set_balance(sender.id, coupon_type.id, sender_remaining, &now)?;

        let recipient_row = tx.lock_or_create_balance(recipient.id, coupon_type.id, &now)?;
        let recipient_balance = recipient_row
            .balance
            .checked_add(req.quantity)
            .ok_or_else(|| ServerError::Internal("recipient balance overflow".into()))?;
        tx.set_balance(recipient.id, coupon_type.id, recipient_balance, &now)?;

        let amount_minor = line_total(coupon_type.amount_minor, req.quantity)?;
        for (employee_id, entry_type) in [
            (sender.id, LedgerEntryType::TransferDebit),
            (recipient.id, LedgerEntryType::TransferCredit),
        ] {
            tx.append_ledger(&LedgerEntry {
                id: Uuid::new_v4(),
                employee_id,
                seller_id: None,
                entry_type,
                amount_minor,
                quantity: req.quantity,
                ref_nonce: Some(req.nonce.clone()),
                coupon_type: Some(coupon_type.name.clone()),
                created_at: now,
            })?;
        }

        let transfer = Transfer {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            recipient_id: recipient.id,
            coupon_type_id: coupon_type.id,
            quantity: req.quantity,
            nonce: req.nonce.clone(),
            device_signature: req.device_signature.clone(),
            appreciation_message: req
                .appreciation_message
                .as_ref()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            created_at: now,
        };
        tx.insert_transfer(&transfer).map_err(|e| {
            if e.is_unique_violation("transfers.sender_id") {
                ServerError::TransferReplayed
            } else {
                ServerError::from(e)
            }
        })?;

        tx.add_engagement_points(sender.id, TRANSFER_ENGAGEMENT_POINTS)?;

        tx.commit()?;
        Ok((transfer, sender_remaining))
    }

    pub fn history(
        &self,
        db: &Database,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<TransferHistoryItem>, ServerError> {
        Ok(db.transfer_history(user_id, page, limit)?)
    }

    pub fn appreciation_wall(
        &self,
        db: &Database,
        page: u32,
        limit: u32,
    ) -> Result<Page<WallTransfer>, ServerError> {
        Ok(db.appreciation_wall(page, limit)?)
    }
}
