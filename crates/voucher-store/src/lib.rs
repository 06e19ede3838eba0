//! # voucher-store
//!
//! SQLite persistence for the voucher ledger.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, typed read helpers for every domain model, and a
//! [`WriteTx`] guard for mutations.  A `WriteTx` is opened with
//! `BEGIN IMMEDIATE`, so everything it reads is locked against other writers
//! (in this process or any other) until it commits or is dropped.

pub mod audit;
pub mod badges;
pub mod balances;
pub mod coupon_types;
pub mod database;
pub mod ledger;
pub mod migrations;
pub mod models;
pub mod nonces;
pub mod redemptions;
pub mod transfers;
pub mod transaction;
pub mod users;

mod error;
mod rows;

pub use database::{Database, StoreOptions};
pub use error::{Result, StoreError};
pub use models::*;
pub use transaction::WriteTx;
