use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use voucher_shared::error::{MoneyError, NonceError};
use voucher_store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    // -- Conflicts (terminal) --
    #[error("Nonce is invalid or already used")]
    NonceInvalid,

    #[error("Nonce has expired")]
    NonceExpired,

    #[error("Nonce signature mismatch")]
    SignatureMismatch,

    #[error("Nonce was issued to a different seller")]
    SellerMismatch,

    #[error("Cannot transfer coupons to yourself")]
    SelfTransferForbidden,

    #[error("Transfer nonce already used")]
    TransferReplayed,

    #[error("Idempotency key already used by another redemption")]
    DuplicateSubmission,

    // -- Business rules --
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Seller rate limit exceeded, try again shortly")]
    RateLimitExceeded,

    #[error("Recipient not found or not an active employee")]
    RecipientNotFound,

    #[error("Coupon type not found")]
    CouponTypeNotFound,

    #[error("Employee not found")]
    EmployeeNotFound,

    #[error("Seller not found")]
    SellerNotFound,

    #[error("User not found")]
    UserNotFound,

    // -- Identity --
    #[error("Missing or invalid identity")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // -- Store --
    #[error("Database is busy, retry the request")]
    Contention,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "VALIDATION",
            ServerError::NonceInvalid => "NONCE_INVALID",
            ServerError::NonceExpired => "NONCE_EXPIRED",
            ServerError::SignatureMismatch => "SIGNATURE_MISMATCH",
            ServerError::SellerMismatch => "SELLER_MISMATCH",
            ServerError::SelfTransferForbidden => "SELF_TRANSFER_FORBIDDEN",
            ServerError::TransferReplayed => "TRANSFER_REPLAYED",
            ServerError::DuplicateSubmission => "DUPLICATE_SUBMISSION",
            ServerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ServerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ServerError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            ServerError::CouponTypeNotFound => "COUPON_TYPE_NOT_FOUND",
            ServerError::EmployeeNotFound => "EMPLOYEE_NOT_FOUND",
            ServerError::SellerNotFound => "SELLER_NOT_FOUND",
            ServerError::UserNotFound => "USER_NOT_FOUND",
            ServerError::Unauthenticated => "UNAUTHENTICATED",
            ServerError::Forbidden(_) => "FORBIDDEN",
            ServerError::Contention => "CONTENTION",
            ServerError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::InsufficientBalance
            | ServerError::RateLimitExceeded
            | ServerError::RecipientNotFound
            | ServerError::CouponTypeNotFound
            | ServerError::EmployeeNotFound => StatusCode::BAD_REQUEST,
            ServerError::NonceInvalid
            | ServerError::NonceExpired
            | ServerError::SignatureMismatch
            | ServerError::SellerMismatch
            | ServerError::SelfTransferForbidden
            | ServerError::TransferReplayed
            | ServerError::DuplicateSubmission => StatusCode::CONFLICT,
            ServerError::SellerNotFound | ServerError::UserNotFound => StatusCode::NOT_FOUND,
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::Contention => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only lock contention is worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Contention)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Contention => ServerError::Contention,
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<NonceError> for ServerError {
    fn from(err: NonceError) -> Self {
        match err {
            NonceError::NotFoundOrConsumed => ServerError::NonceInvalid,
            NonceError::Expired => ServerError::NonceExpired,
            NonceError::SignatureMismatch => ServerError::SignatureMismatch,
            NonceError::SellerMismatch => ServerError::SellerMismatch,
            NonceError::InvalidSecret => ServerError::Internal(err.to_string()),
        }
    }
}

impl From<MoneyError> for ServerError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::Invalid(_) => ServerError::Validation(err.to_string()),
            MoneyError::Overflow => ServerError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
            "retryable": self.is_retryable(),
        });

        (status, axum::Json(body)).into_response()
    }
}
