//! Seller nonce signing and verification.
//!
//! A nonce is bound to its seller and expiry by
//! `hex(HMAC-SHA256(secret, seller_id ":" nonce ":" expires_at_iso))`.
//! Verification always recomputes over the *stored* fields so that a row
//! edited behind the server's back no longer matches its signature.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::constants::{OTP_MAX, OTP_MIN};
use crate::error::NonceError;
use crate::time::to_iso_millis;

type HmacSha256 = Hmac<Sha256>;

/// The persisted fields a verifier needs.
#[derive(Debug, Clone, Copy)]
pub struct NonceMaterial<'a> {
    pub seller_id: Uuid,
    pub nonce: &'a str,
    pub expires_at: DateTime<Utc>,
    pub hmac_signature: &'a str,
}

/// `seller_id:nonce:expires_at_iso`
pub fn signing_payload(seller_id: &Uuid, nonce: &str, expires_at: &DateTime<Utc>) -> String {
    format!("{}:{}:{}", seller_id, nonce, to_iso_millis(expires_at))
}

pub fn sign_nonce(
    secret: &[u8],
    seller_id: &Uuid,
    nonce: &str,
    expires_at: &DateTime<Utc>,
) -> Result<String, NonceError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| NonceError::InvalidSecret)?;
    mac.update(signing_payload(seller_id, nonce, expires_at).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of the stored signature against a fresh one.
pub fn signature_matches(secret: &[u8], material: &NonceMaterial<'_>) -> Result<bool, NonceError> {
    let computed = sign_nonce(
        secret,
        &material.seller_id,
        material.nonce,
        &material.expires_at,
    )?;
    let Ok(stored) = hex::decode(material.hmac_signature) else {
        return Ok(false);
    };
    let Ok(computed) = hex::decode(computed) else {
        return Ok(false);
    };
    if stored.len() != computed.len() {
        return Ok(false);
    }
    Ok(stored.ct_eq(computed.as_slice()).into())
}

/// Fresh while `now <= expires_at + drift`.
pub fn check_fresh(
    expires_at: &DateTime<Utc>,
    now: &DateTime<Utc>,
    drift: Duration,
) -> Result<(), NonceError> {
    if *now > *expires_at + drift {
        return Err(NonceError::Expired);
    }
    Ok(())
}

/// Full verification of a locked, unconsumed nonce row: expiry with drift,
/// then signature, then (if the caller claimed one) seller binding.
pub fn verify(
    secret: &[u8],
    material: &NonceMaterial<'_>,
    now: &DateTime<Utc>,
    drift: Duration,
    claimed_seller: Option<Uuid>,
) -> Result<(), NonceError> {
    check_fresh(&material.expires_at, now, drift)?;

    if !signature_matches(secret, material)? {
        return Err(NonceError::SignatureMismatch);
    }

    if let Some(claimed) = claimed_seller {
        if claimed != material.seller_id {
            return Err(NonceError::SellerMismatch);
        }
    }

    Ok(())
}

/// Random unique token embedded in the QR payload.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Six-digit numeric fallback code for when the QR cannot be scanned.
pub fn generate_otp() -> String {
    rand::rngs::OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"test-secret";

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap()
    }

    #[test]
    fn test_payload_format() {
        let seller = Uuid::nil();
        assert_eq!(
            signing_payload(&seller, "abc", &expiry()),
            "00000000-0000-0000-0000-000000000000:abc:2024-03-01T12:10:00.000Z"
        );
    }

    #[test]
    fn test_signature_is_deterministic_and_keyed() {
        let sig = sign_nonce(SECRET, &Uuid::nil(), "abc", &expiry()).unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, sign_nonce(SECRET, &Uuid::nil(), "abc", &expiry()).unwrap());
        assert_ne!(sig, sign_nonce(b"other", &Uuid::nil(), "abc", &expiry()).unwrap());
    }

    #[test]
    fn test_verify_accepts_untampered() {
        let seller = Uuid::new_v4();
        let sig = sign_nonce(SECRET, &seller, "n-1", &expiry()).unwrap();
        let material = NonceMaterial {
            seller_id: seller,
            nonce: "n-1",
            expires_at: expiry(),
            hmac_signature: &sig,
        };
        let now = expiry() - Duration::minutes(5);
        assert!(verify(SECRET, &material, &now, Duration::seconds(30), Some(seller)).is_ok());
        assert!(verify(SECRET, &material, &now, Duration::seconds(30), None).is_ok());
    }

    #[test]
    fn test_drift_window_edges() {
        let drift = Duration::seconds(30);
        let at_29 = expiry() + Duration::seconds(29);
        let at_30 = expiry() + Duration::seconds(30);
        let at_31 = expiry() + Duration::seconds(31);
        assert!(check_fresh(&expiry(), &at_29, drift).is_ok());
        assert!(check_fresh(&expiry(), &at_30, drift).is_ok());
        assert_eq!(check_fresh(&expiry(), &at_31, drift), Err(NonceError::Expired));
    }

    #[test]
    fn test_tampered_expiry_detected() {
        let seller = Uuid::new_v4();
        let sig = sign_nonce(SECRET, &seller, "n-2", &expiry()).unwrap();
        let material = NonceMaterial {
            seller_id: seller,
            nonce: "n-2",
            expires_at: expiry() + Duration::hours(1),
            hmac_signature: &sig,
        };
        let now = expiry();
        assert_eq!(
            verify(SECRET, &material, &now, Duration::seconds(30), None),
            Err(NonceError::SignatureMismatch)
        );
    }

    #[test]
    fn test_tampered_seller_detected() {
        let seller = Uuid::new_v4();
        let sig = sign_nonce(SECRET, &seller, "n-3", &expiry()).unwrap();
        let material = NonceMaterial {
            seller_id: Uuid::new_v4(),
            nonce: "n-3",
            expires_at: expiry(),
            hmac_signature: &sig,
        };
        assert!(!signature_matches(SECRET, &material).unwrap());
        assert!(!signature_matches(
            SECRET,
            &NonceMaterial {
                hmac_signature: "not-hex",
                ..material
            }
        )
        .unwrap());
    }

    #[test]
    fn test_seller_mismatch() {
        let seller = Uuid::new_v4();
        let sig = sign_nonce(SECRET, &seller, "n-4", &expiry()).unwrap();
        let material = NonceMaterial {
            seller_id: seller,
            nonce: "n-4",
            expires_at: expiry(),
            hmac_signature: &sig,
        };
        assert_eq!(
            verify(SECRET, &material, &expiry(), Duration::seconds(30), Some(Uuid::new_v4())),
            Err(NonceError::SellerMismatch)
        );
    }

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
