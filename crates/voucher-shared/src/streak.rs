//! Daily redemption streaks.
//!
//! Days are UTC calendar days.  Only the first redemption of a day moves the
//! streak; later ones the same day leave every field untouched.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::time::utc_day;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_redemption_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    /// Already redeemed today.
    Unchanged,
    /// Last redemption was yesterday.
    Extended,
    /// First redemption ever, or a gap of two days or more.
    Reset,
}

/// Compute the streak after a redemption at `now`.
pub fn advance(state: &StreakState, now: DateTime<Utc>) -> (StreakState, StreakChange) {
    let today = utc_day(&now);
    let last_day = state.last_redemption_date.as_ref().map(utc_day);

    let (current, change) = match last_day {
        Some(day) if day >= today => return (*state, StreakChange::Unchanged),
        Some(day) if day == today - Duration::days(1) => {
            (state.current_streak + 1, StreakChange::Extended)
        }
        _ => (1, StreakChange::Reset),
    };

    let next = StreakState {
        current_streak: current,
        longest_streak: state.longest_streak.max(current),
        last_redemption_date: Some(now),
    };
    (next, change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    fn fresh() -> StreakState {
        StreakState {
            current_streak: 0,
            longest_streak: 0,
            last_redemption_date: None,
        }
    }

    #[test]
    fn test_first_redemption_starts_streak() {
        let (next, change) = advance(&fresh(), at(10, 9));
        assert_eq!(change, StreakChange::Reset);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.last_redemption_date, Some(at(10, 9)));
    }

    #[test]
    fn test_same_day_is_noop() {
        let (first, _) = advance(&fresh(), at(10, 9));
        let (second, change) = advance(&first, at(10, 23));
        assert_eq!(change, StreakChange::Unchanged);
        assert_eq!(second, first);
    }

    #[test]
    fn test_consecutive_days_extend_across_midnight() {
        let (d1, _) = advance(&fresh(), at(10, 23));
        let (d2, change) = advance(&d1, at(11, 0));
        assert_eq!(change, StreakChange::Extended);
        assert_eq!(d2.current_streak, 2);
        let (d3, _) = advance(&d2, at(12, 8));
        assert_eq!(d3.current_streak, 3);
        assert_eq!(d3.longest_streak, 3);
    }

    #[test]
    fn test_gap_resets_but_keeps_longest() {
        let state = StreakState {
            current_streak: 5,
            longest_streak: 7,
            last_redemption_date: Some(at(10, 12)),
        };
        let (next, change) = advance(&state, at(12, 12));
        assert_eq!(change, StreakChange::Reset);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 7);
    }

    #[test]
    fn test_clock_behind_last_date_is_noop() {
        let state = StreakState {
            current_streak: 2,
            longest_streak: 2,
            last_redemption_date: Some(at(11, 12)),
        };
        let (next, change) = advance(&state, at(10, 12));
        assert_eq!(change, StreakChange::Unchanged);
        assert_eq!(next, state);
    }
}
