use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The two kinds of listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Something for sale.
    Offer,
    /// A request to buy.
    Wish,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Wish => "wish",
        }
    }
}

/// Listing status as stored in `st`, `ste` and `prev_st`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Open,
    Closed,
    /// Hellbanned author; the visible status lives in `ste`.
    Hb,
    Deleted,
    DeletedHard,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Hb => "HB",
            Self::Deleted => "DELETED",
            Self::DeletedHard => "DELETED_HARD",
        }
    }

    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted | Self::DeletedHard)
    }
}

/// Which physical table an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Active,
    Archived,
}

impl Collection {
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Active => "items_active",
            Self::Archived => "items_archived",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// `{st, ste}` pair, stored as the `prev_st` snapshot while an item is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPair {
    pub st: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ste: Option<Status>,
}

impl StatusPair {
    #[must_use]
    pub const fn new(st: Status, ste: Option<Status>) -> Self {
        Self { st, ste }
    }

    /// Status the author sees: `ste` for hellbanned items, `st` otherwise.
    #[must_use]
    pub fn effective(self) -> Status {
        if self.st == Status::Hb {
            self.ste.unwrap_or(Status::Hb)
        } else {
            self.st
        }
    }

    /// Placement rule: only effectively-open items are active.
    #[must_use]
    pub fn collection(self) -> Collection {
        if self.effective() == Status::Open {
            Collection::Active
        } else {
            Collection::Archived
        }
    }
}

/// Asking price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub value: f64,
    pub currency: String,
}

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Great-circle distance in kilometres (haversine).
    #[must_use]
    pub fn distance_km(self, other: Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A listing row, in either table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub md: String,
    pub html: String,
    pub price: Option<Price>,
    /// Price converted to the reference currency.
    pub price_base: Option<f64>,
    pub location: Option<Location>,
    pub st: Status,
    pub ste: Option<Status>,
    pub prev_st: Option<StatusPair>,
    pub del_reason: Option<String>,
    pub del_by: Option<String>,
    pub edit_count: i64,
    pub last_edit_ts: Option<i64>,
    pub files: Vec<String>,
    pub user: String,
    pub section: String,
    pub ts: i64,
    pub autoclose_at: i64,
    pub ip: Option<String>,
    pub barter_info: Option<String>,
    pub delivery: bool,
    pub is_new: bool,
}

impl Item {
    #[must_use]
    pub const fn status_pair(&self) -> StatusPair {
        StatusPair::new(self.st, self.ste)
    }

    #[must_use]
    pub fn effective_status(&self) -> Status {
        self.status_pair().effective()
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        self.status_pair().collection()
    }

    #[must_use]
    pub fn is_hellbanned(&self) -> bool {
        self.st == Status::Hb
    }
}

/// Derive a listing id from its creation inputs.
///
/// `nonce` is bumped by the caller on the rare collision.
#[must_use]
pub fn item_id(user: &str, title: &str, ts_us: i64, nonce: u32) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(user.as_bytes());
    hasher.update(b"\0");
    hasher.update(title.as_bytes());
    hasher.update(b"\0");
    hasher.update(&ts_us.to_le_bytes());
    hasher.update(&nonce.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("mk-{}", &hex[..10])
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offer" | "buy" => Ok(Self::Offer),
            "wish" => Ok(Self::Wish),
            _ => Err(ParseEnumError {
                expected: "kind",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "HB" => Ok(Self::Hb),
            "DELETED" => Ok(Self::Deleted),
            "DELETED_HARD" => Ok(Self::DeletedHard),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}
