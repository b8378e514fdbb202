use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a string-backed enum whose wire form matches its DB column value.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

string_enum!(PropertyType, "property type" {
    House => "house",
    Apartment => "apartment",
    Condo => "condo",
    Townhouse => "townhouse",
    Land => "land",
    Commercial => "commercial",
});

string_enum!(ListingType, "listing type" {
    Sale => "sale",
    Rent => "rent",
});

string_enum!(
    /// Listing lifecycle. Drafts are only visible to their owner and admins.
    PropertyStatus, "property status" {
    Draft => "draft",
    Active => "active",
    Pending => "pending",
    Sold => "sold",
    Rented => "rented",
    OffMarket => "off_market",
});

string_enum!(
    /// Inquiry lifecycle: new -> read -> replied, and closed from any state.
    MessageStatus, "message status" {
    New => "new",
    Read => "read",
    Replied => "replied",
    Closed => "closed",
});

impl MessageStatus {
    /// Whether moving from `self` to `next` is allowed. Repeating the current
    /// status is accepted as a no-op. `Closed` is terminal.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Closed, _) => false,
            (_, Closed) => true,
            (New, Read) | (New, Replied) | (Read, Replied) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
    pub verified: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub status: PropertyStatus,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: i64,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub square_feet: u32,
    pub images: Vec<String>,
    /// Public URLs for `images`, in the same order.
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub owner_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyMessage {
    pub id: Uuid,
    pub property_id: Uuid,
    pub sender_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    pub reply: Option<String>,
    pub replied_by: Option<Uuid>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
