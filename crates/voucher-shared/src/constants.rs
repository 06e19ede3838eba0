/// API version prefix used by the HTTP layer
pub const API_V1_PREFIX: &str = "/api/v1";

/// Seller nonce lifetime in seconds (10 minutes)
pub const SELLER_NONCE_TTL_SECS: i64 = 10 * 60;

/// Grace period added to a nonce's expiry to tolerate client clock skew
pub const CLOCK_DRIFT_ALLOWANCE_SECS: i64 = 30;

/// Max completed redemptions per seller inside the sliding window
pub const MAX_REDEMPTIONS_PER_SELLER: u32 = 120;

/// Sliding window length for the per-seller redemption limit
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Lowest and highest six-digit OTP values
pub const OTP_MIN: u32 = 100_000;
pub const OTP_MAX: u32 = 999_999;

/// Engagement points per completed redemption
pub const REDEMPTION_ENGAGEMENT_POINTS: i64 = 10;

/// Engagement points awarded to the sender of a P2P gift ("Appreciation Star")
pub const TRANSFER_ENGAGEMENT_POINTS: i64 = 15;

/// Default HMAC secret.  Only suitable for local development.
pub const DEV_HMAC_SECRET: &str = "change-this-seller-qr-secret";

/// Paging bounds for ledger/history queries
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Rough CO2e saved per eco-point, in grams
pub const CARBON_GRAMS_PER_ECO_POINT: i64 = 10;
