use thiserror::Error;

/// Reasons a seller nonce fails verification.
///
/// Every variant is terminal for the request: the caller rolls back and
/// reports a conflict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceError {
    #[error("Seller nonce is invalid or already consumed")]
    NotFoundOrConsumed,

    #[error("Seller nonce has expired")]
    Expired,

    #[error("Seller QR signature verification failed")]
    SignatureMismatch,

    #[error("Seller UUID mismatch: request payload does not match QR signature")]
    SellerMismatch,

    #[error("Invalid HMAC secret")]
    InvalidSecret,
}

/// A string column or request field did not name a known enum variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid monetary amount: {0}")]
    Invalid(String),

    #[error("Monetary amount overflow")]
    Overflow,
}
