//! # voucher-shared
//!
//! Domain vocabulary shared by the store and the server: role and ledger
//! enums, timing constants, seller-nonce signing, streak arithmetic and the
//! eco-points / badge rule tables.  Nothing in this crate performs I/O.

pub mod constants;
pub mod error;
pub mod gamification;
pub mod money;
pub mod nonce;
pub mod streak;
pub mod time;
pub mod types;
