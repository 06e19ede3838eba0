//! Seller nonce issuance and in-transaction verification.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use voucher_shared::error::NonceError;
use voucher_shared::nonce::{self, NonceMaterial};
use voucher_shared::types::Role;
use voucher_store::{Database, SellerNonce, User, WriteTx};

use crate::clock::Clock;
use crate::error::ServerError;

/// What a seller kiosk renders as its QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoncePayload {
    pub seller_id: Uuid,
    pub nonce: String,
    pub otp: Option<String>,
    pub hmac_signature: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub seller_name: String,
}

impl NoncePayload {
    fn new(row: SellerNonce, seller: &User) -> Self {
        Self {
            seller_id: row.seller_id,
            nonce: row.nonce,
            otp: row.otp,
            hmac_signature: row.hmac_signature,
            issued_at: row.created_at,
            expires_at: row.expires_at,
            seller_name: seller.name.clone(),
        }
    }
}

/// Public profile an employee sees after scanning a seller's code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerInfo {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

pub struct NonceAuthority {
    secret: Vec<u8>,
    ttl: Duration,
    drift: Duration,
    clock: Arc<dyn Clock>,
}

impl NonceAuthority {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        ttl: Duration,
        drift: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            drift,
            clock,
        }
    }

    /// Return the seller's live nonce, or mint one if none is live.
    pub fn issue(&self, db: &mut Database, seller_id: Uuid) -> Result<NoncePayload, ServerError> {
        let seller = load_seller(db, seller_id)?;
        let now = self.clock.now();

        let tx = db.begin_write()?;
        if let Some(live) = tx.latest_unconsumed_nonce(seller_id)? {
            if live.expires_at > now {
                return Ok(NoncePayload::new(live, &seller));
            }
        }
        let row = self.mint(&tx, seller_id, now)?;
        tx.commit()?;

        info!(seller = %seller_id, expires_at = %row.expires_at, "Issued seller nonce");
        Ok(NoncePayload::new(row, &seller))
    }

    /// Always mint a new nonce.  Earlier ones stay redeemable until they
    /// expire on their own.
    pub fn force_refresh(
        &self,
        db: &mut Database,
        seller_id: Uuid,
    ) -> Result<NoncePayload, ServerError> {
        let seller = load_seller(db, seller_id)?;
        let now = self.clock.now();

        let tx = db.begin_write()?;
        let row = self.mint(&tx, seller_id, now)?;
        tx.commit()?;

        info!(seller = %seller_id, "Refreshed seller nonce");
        Ok(NoncePayload::new(row, &seller))
    }

    pub fn seller_info(&self, db: &Database, seller_id: Uuid) -> Result<SellerInfo, ServerError> {
        let seller = load_seller(db, seller_id)?;
        Ok(SellerInfo {
            id: seller.id,
            name: seller.name,
            is_active: seller.is_active,
        })
    }

    /// Lock the unconsumed row for `token` and check expiry, signature and
    /// (if given) the claimed seller.  Consuming the row is left to the
    /// caller, inside the same transaction.
    pub fn verify_and_lock(
        &self,
        tx: &WriteTx<'_>,
        token: &str,
        claimed_seller: Option<Uuid>,
        now: &DateTime<Utc>,
    ) -> Result<SellerNonce, ServerError> {
        let row = tx
            .lock_unconsumed_nonce(token)?
            .ok_or(NonceError::NotFoundOrConsumed)?;
        self.verify_row(&row, claimed_seller, now)?;
        Ok(row)
    }

    pub fn verify_row(
        &self,
        row: &SellerNonce,
        claimed_seller: Option<Uuid>,
        now: &DateTime<Utc>,
    ) -> Result<(), NonceError> {
        let material = NonceMaterial {
            seller_id: row.seller_id,
            nonce: &row.nonce,
            expires_at: row.expires_at,
            hmac_signature: &row.hmac_signature,
        };
        nonce::verify(&self.secret, &material, now, self.drift, claimed_seller)
    }

    fn mint(
        &self,
        tx: &WriteTx<'_>,
        seller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SellerNonce, ServerError> {
        let token = nonce::generate_token();
        let expires_at = now + self.ttl;
        let hmac_signature = nonce::sign_nonce(&self.secret, &seller_id, &token, &expires_at)?;

        let row = SellerNonce {
            id: Uuid::new_v4(),
            seller_id,
            nonce: token,
            hmac_signature,
            expires_at,
            consumed: false,
            otp: Some(nonce::generate_otp()),
            created_at: now,
        };
        tx.insert_nonce(&row)?;
        Ok(row)
    }
}

fn load_seller(db: &Database, seller_id: Uuid) -> Result<User, ServerError> {
    match db.find_user(seller_id)? {
        Some(user) if user.role == Role::Seller => Ok(user),
        _ => Err(ServerError::SellerNotFound),
    }
}
