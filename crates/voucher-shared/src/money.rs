//! Fixed-point money in integer minor units (cents).
//!
//! Balances never touch floating point.  Decimal strings coming from the
//! catalog are converted with round-half-up to two decimal places.

use crate::error::MoneyError;

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// `unit_amount * quantity`, rejecting overflow instead of wrapping.
pub fn line_total(unit_amount_minor: i64, quantity: i64) -> Result<i64, MoneyError> {
    unit_amount_minor
        .checked_mul(quantity)
        .ok_or(MoneyError::Overflow)
}

/// Parse `"12"`, `"12.5"`, `"12.345"` into minor units, rounding half-up on
/// the third decimal.  Negative amounts are rejected.
pub fn parse_minor(input: &str) -> Result<i64, MoneyError> {
    let s = input.trim();
    let invalid = || MoneyError::Invalid(input.to_string());

    if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
        return Err(invalid());
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole_val: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| MoneyError::Overflow)?
    };

    let digits: Vec<i64> = frac.bytes().map(|b| i64::from(b - b'0')).collect();
    let d = |i: usize| digits.get(i).copied().unwrap_or(0);
    let mut cents = d(0) * 10 + d(1);
    if d(2) >= 5 {
        cents += 1;
    }

    whole_val
        .checked_mul(MINOR_PER_MAJOR)
        .and_then(|v| v.checked_add(cents))
        .ok_or(MoneyError::Overflow)
}

/// Render minor units as `"12.34"`.
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
