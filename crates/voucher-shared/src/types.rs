use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownVariant;

/// Generates `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// storage form is its SCREAMING_SNAKE_CASE name.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    Seller,
    Admin,
    Finance,
}

text_enum!(Role, "role", {
    Employee => "EMPLOYEE",
    Seller => "SELLER",
    Admin => "ADMIN",
    Finance => "FINANCE",
});

impl Role {
    /// Roles allowed to issue coupons and read other employees' ledgers.
    pub fn is_back_office(&self) -> bool {
        matches!(self, Self::Admin | Self::Finance)
    }
}

/// Kind of balance-affecting event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    Issuance,
    Redemption,
    TransferDebit,
    TransferCredit,
    Refund,
    Expiry,
}

text_enum!(LedgerEntryType, "ledger entry type", {
    Issuance => "ISSUANCE",
    Redemption => "REDEMPTION",
    TransferDebit => "TRANSFER_DEBIT",
    TransferCredit => "TRANSFER_CREDIT",
    Refund => "REFUND",
    Expiry => "EXPIRY",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Conflict,
}

text_enum!(RedemptionStatus, "redemption status", {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
    Conflict => "CONFLICT",
});

/// Badge identifiers.  Declaration order is the order of the award sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeKind {
    FirstRedemption,
    EarlyBird,
    CoffeeAddict,
    SustainabilityChampion,
    AppreciationStar,
    StreakMaster,
}

text_enum!(BadgeKind, "badge", {
    FirstRedemption => "FIRST_REDEMPTION",
    EarlyBird => "EARLY_BIRD",
    CoffeeAddict => "COFFEE_ADDICT",
    SustainabilityChampion => "SUSTAINABILITY_CHAMPION",
    AppreciationStar => "APPRECIATION_STAR",
    StreakMaster => "STREAK_MASTER",
});

impl BadgeKind {
    pub const ALL: [BadgeKind; 6] = [
        Self::FirstRedemption,
        Self::EarlyBird,
        Self::CoffeeAddict,
        Self::SustainabilityChampion,
        Self::AppreciationStar,
        Self::StreakMaster,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_round_trip() {
        for ty in [
            LedgerEntryType::Issuance,
            LedgerEntryType::TransferCredit,
            LedgerEntryType::Expiry,
        ] {
            assert_eq!(ty.as_str().parse::<LedgerEntryType>().unwrap(), ty);
        }
        assert_eq!("SELLER".parse::<Role>().unwrap(), Role::Seller);
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let err = "JANITOR".parse::<Role>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert_eq!(err.value, "JANITOR");
    }

    #[test]
    fn test_serde_matches_storage_text() {
        let json = serde_json::to_string(&RedemptionStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
        let json = serde_json::to_string(&BadgeKind::SustainabilityChampion).unwrap();
        assert_eq!(json, format!("\"{}\"", BadgeKind::SustainabilityChampion.as_str()));
    }
}
