use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a stored or submitted tag does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.field, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Generates `as_str`, `Display` and `FromStr` for a closed, snake_case tag
/// enum so the database column and the JSON wire value always agree.
macro_rules! closed_tag {
    ($ty:ident, $field:literal, { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($ty::$variant),)+
                    other => Err(UnknownVariant {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Account role. `Both` can rent and list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    Student,
    Landlord,
    Both,
}

closed_tag!(UserKind, "user kind", {
    Student => "student",
    Landlord => "landlord",
    Both => "both",
});

impl UserKind {
    pub fn can_list_properties(&self) -> bool {
        matches!(self, UserKind::Landlord | UserKind::Both)
    }

    pub fn can_rent(&self) -> bool {
        matches!(self, UserKind::Student | UserKind::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Room,
    Apartment,
    House,
    Studio,
    Shared,
}

closed_tag!(PropertyKind, "property kind", {
    Room => "room",
    Apartment => "apartment",
    House => "house",
    Studio => "studio",
    Shared => "shared",
});

/// What a notification is about. Each variant has exactly one producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A landlord recorded a rental for the student
    RentalApproved,
    /// A property or tenant rating was left about the user
    NewRating,
    /// A listing the user saved was edited
    FavoriteUpdated,
    /// A landlord filed a report naming the student
    NewReport,
}

closed_tag!(NotificationKind, "notification kind", {
    RentalApproved => "rental_approved",
    NewRating => "new_rating",
    FavoriteUpdated => "favorite_updated",
    NewReport => "new_report",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Active,
    Finished,
    Cancelled,
}

closed_tag!(RentalStatus, "rental status", {
    Active => "active",
    Finished => "finished",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    NonPayment,
    PropertyDamage,
    Coexistence,
    IllegalActivity,
    Other,
}

closed_tag!(ProblemKind, "problem kind", {
    NonPayment => "non_payment",
    PropertyDamage => "property_damage",
    Coexistence => "coexistence",
    IllegalActivity => "illegal_activity",
    Other => "other",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    #[default]
    Moderate,
    Severe,
}

closed_tag!(Severity, "severity", {
    Minor => "minor",
    Moderate => "moderate",
    Severe => "severe",
});

/// Moderation state of a tenant report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Verified,
    Rejected,
}

closed_tag!(ReportStatus, "report status", {
    Pending => "pending",
    Reviewed => "reviewed",
    Verified => "verified",
    Rejected => "rejected",
});
