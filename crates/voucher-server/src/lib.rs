//! # voucher-server
//!
//! HTTP service for the workplace voucher ledger.
//!
//! - **Nonce authority**: signed, single-use seller nonces for QR codes
//! - **Redemption engine**: idempotent, rate-limited redemption in one
//!   SQLite write transaction
//! - **Transfer engine**: peer-to-peer gifting with ordered balance locks
//! - **Gamification**: streaks, eco-points, badges, leaderboard
//! - **Wallet**: balances, the ledger, and back-office issuance
//! - **REST API** (axum) under `/api/v1`

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gamification;
pub mod nonce_authority;
pub mod notify;
pub mod paging;
pub mod rate_limit;
pub mod redemption;
pub mod transfer;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;
