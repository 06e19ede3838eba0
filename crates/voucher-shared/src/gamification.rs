//! Eco-points and badge rules.
//!
//! Badges are an enum-keyed table of pure predicates evaluated in
//! declaration order; no dynamic lookup by name.

use std::collections::HashSet;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::BadgeKind;

// ---------------------------------------------------------------------------
// Eco-points
// ---------------------------------------------------------------------------

/// Eco-points modifiers
pub const ECO_BLACK_COFFEE: i64 = 0;
pub const ECO_DAIRY_PENALTY: i64 = -5;
pub const ECO_OAT_SOY_BONUS: i64 = 10;
pub const ECO_GREEN_TEA_BONUS: i64 = 12;
pub const ECO_REUSABLE_CUP_BONUS: i64 = 15;

/// Carbon footprint per serving, grams CO2e
pub const CO2E_BLACK_COFFEE: i64 = 21;
pub const CO2E_COFFEE_DAIRY: i64 = 200;
pub const CO2E_COFFEE_OAT_SOY: i64 = 60;
pub const CO2E_GREEN_TEA: i64 = 15;
pub const CO2E_REUSABLE_CUP_OFFSET: i64 = -30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Beverage {
    BlackCoffee,
    OatSoy,
    Dairy,
    GreenTea,
    Other,
}

impl Beverage {
    /// Case-insensitive classification of a free-form beverage label.
    pub fn classify(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        if upper.contains("BLACK") || upper == "COFFEE" {
            Self::BlackCoffee
        } else if upper.contains("OAT") || upper.contains("SOY") {
            Self::OatSoy
        } else if upper.contains("DAIRY") {
            Self::Dairy
        } else if upper.contains("GREEN") || upper == "TEA" {
            Self::GreenTea
        } else {
            Self::Other
        }
    }

    pub fn eco_modifier(&self) -> i64 {
        match self {
            Self::BlackCoffee => ECO_BLACK_COFFEE,
            Self::OatSoy => ECO_OAT_SOY_BONUS,
            Self::Dairy => ECO_DAIRY_PENALTY,
            Self::GreenTea => ECO_GREEN_TEA_BONUS,
            Self::Other => 0,
        }
    }

    pub fn co2e_grams(&self) -> i64 {
        match self {
            Self::BlackCoffee => CO2E_BLACK_COFFEE,
            Self::OatSoy => CO2E_COFFEE_OAT_SOY,
            Self::Dairy => CO2E_COFFEE_DAIRY,
            Self::GreenTea => CO2E_GREEN_TEA,
            Self::Other => 0,
        }
    }
}

/// Points for one beverage purchase.  Never negative.
pub fn eco_points_delta(beverage: Beverage, reusable_cup: bool) -> i64 {
    let mut delta = beverage.eco_modifier();
    if reusable_cup {
        delta += ECO_REUSABLE_CUP_BONUS;
    }
    delta.max(0)
}

pub fn carbon_footprint_grams(beverage: Beverage, reusable_cup: bool) -> i64 {
    let mut grams = beverage.co2e_grams();
    if reusable_cup && grams > 0 {
        grams += CO2E_REUSABLE_CUP_OFFSET;
    }
    grams.max(0)
}

// ---------------------------------------------------------------------------
// Badges
// ---------------------------------------------------------------------------

/// The slice of user state badge predicates look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub engagement_points: i64,
    pub eco_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
}

type BadgePredicate = fn(&Progress, &DateTime<Utc>) -> bool;

const EARLY_BIRD_HOUR: u32 = 8;
const EARLY_BIRD_MINUTE: u32 = 30;

pub const BADGE_RULES: [(BadgeKind, BadgePredicate); 6] = [
    (BadgeKind::FirstRedemption, |p, _| p.engagement_points >= 10),
    (BadgeKind::EarlyBird, |_, now| {
        (now.hour(), now.minute()) < (EARLY_BIRD_HOUR, EARLY_BIRD_MINUTE)
    }),
    (BadgeKind::CoffeeAddict, |p, _| p.current_streak >= 30),
    (BadgeKind::SustainabilityChampion, |p, _| p.eco_points >= 500),
    (BadgeKind::AppreciationStar, |p, _| p.engagement_points >= 300),
    (BadgeKind::StreakMaster, |p, _| p.longest_streak >= 60),
];

pub fn badge_description(kind: BadgeKind) -> &'static str {
    match kind {
        BadgeKind::FirstRedemption => "Redeemed your first coupon",
        BadgeKind::EarlyBird => "Active before 08:30",
        BadgeKind::CoffeeAddict => "30-day redemption streak",
        BadgeKind::SustainabilityChampion => "Earned 500 eco-points",
        BadgeKind::AppreciationStar => "Reached 300 engagement points",
        BadgeKind::StreakMaster => "Longest streak of 60 days",
    }
}

/// Badges satisfied by `progress` that the user does not hold yet, in sweep
/// order.
pub fn newly_earned(
    progress: &Progress,
    now: &DateTime<Utc>,
    owned: &HashSet<BadgeKind>,
) -> Vec<BadgeKind> {
    BADGE_RULES
        .iter()
        .filter(|(kind, _)| !owned.contains(kind))
        .filter(|(_, predicate)| predicate(progress, now))
        .map(|(kind, _)| *kind)
        .collect()
}

// ---------------------------------------------------------------------------
// Streak milestones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub target: i64,
    pub reward: &'static str,
}

pub fn next_milestone(current_streak: i64) -> Milestone {
    match current_streak {
        s if s < 7 => Milestone {
            target: 7,
            reward: "Free Coffee Coupon",
        },
        s if s < 30 => Milestone {
            target: 30,
            reward: "Coffee Addict Badge",
        },
        s if s < 60 => Milestone {
            target: 60,
            reward: "Streak Master Badge",
        },
        _ => Milestone {
            target: 100,
            reward: "Streak Master Badge",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn progress(engagement: i64, eco: i64, current: i64, longest: i64) -> Progress {
        Progress {
            engagement_points: engagement,
            eco_points: eco,
            current_streak: current,
            longest_streak: longest,
        }
    }

    #[test]
    fn test_classify_beverages() {
        assert_eq!(Beverage::classify("coffee"), Beverage::BlackCoffee);
        assert_eq!(Beverage::classify("Black Americano"), Beverage::BlackCoffee);
        assert_eq!(Beverage::classify("oat latte"), Beverage::OatSoy);
        assert_eq!(Beverage::classify("SOY flat white"), Beverage::OatSoy);
        assert_eq!(Beverage::classify("dairy cappuccino"), Beverage::Dairy);
        assert_eq!(Beverage::classify("tea"), Beverage::GreenTea);
        assert_eq!(Beverage::classify("green jasmine"), Beverage::GreenTea);
        assert_eq!(Beverage::classify("croissant"), Beverage::Other);
    }

    #[test]
    fn test_eco_delta_clamped() {
        assert_eq!(eco_points_delta(Beverage::Dairy, false), 0);
        assert_eq!(eco_points_delta(Beverage::Dairy, true), 10);
        assert_eq!(eco_points_delta(Beverage::GreenTea, true), 27);
        assert_eq!(eco_points_delta(Beverage::OatSoy, false), 10);
    }

    #[test]
    fn test_badge_sweep_skips_owned() {
        let p = progress(320, 600, 31, 61);
        let all = newly_earned(&p, &noon(), &HashSet::new());
        assert_eq!(
            all,
            vec![
                BadgeKind::FirstRedemption,
                BadgeKind::CoffeeAddict,
                BadgeKind::SustainabilityChampion,
                BadgeKind::AppreciationStar,
                BadgeKind::StreakMaster,
            ]
        );

        let owned: HashSet<_> = all.into_iter().collect();
        assert!(newly_earned(&p, &noon(), &owned).is_empty());
    }

    #[test]
    fn test_early_bird_cutoff() {
        let p = progress(0, 0, 0, 0);
        let early = Utc.with_ymd_and_hms(2024, 6, 1, 8, 29, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        assert_eq!(newly_earned(&p, &early, &HashSet::new()), vec![BadgeKind::EarlyBird]);
        assert!(newly_earned(&p, &late, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_milestones() {
        assert_eq!(next_milestone(0).target, 7);
        assert_eq!(next_milestone(7).target, 30);
        assert_eq!(next_milestone(45).target, 60);
        assert_eq!(next_milestone(75).target, 100);
    }

    #[test]
    fn test_badge_rules_cover_every_kind() {
        let kinds: Vec<_> = BADGE_RULES.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, BadgeKind::ALL.to_vec());
    }
}
