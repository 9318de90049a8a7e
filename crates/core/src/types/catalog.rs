//! Catalog enumerations and their Cyberbiz wire codes.
//!
//! Store type and genre are exchanged as lowercase names with callers and
//! as integer codes with the analytical store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string did not name a known enum member.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}', expected one of: {expected}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Sales channel a product belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Online store.
    Shop,
    /// Point-of-sale store.
    PosShop,
    /// Physical branch store.
    BranchStore,
}

impl StoreType {
    /// Integer code used by the analytical store.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Shop => 1,
            Self::PosShop => 2,
            Self::BranchStore => 3,
        }
    }

    /// Wire name used by the catalog API and tool inputs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shop => "shop",
            Self::PosShop => "pos_shop",
            Self::BranchStore => "branch_store",
        }
    }
}

impl FromStr for StoreType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shop" => Ok(Self::Shop),
            "pos_shop" => Ok(Self::PosShop),
            "branch_store" => Ok(Self::BranchStore),
            other => Err(UnknownVariant {
                kind: "store_type",
                value: other.to_string(),
                expected: "shop, pos_shop, branch_store",
            }),
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    /// Regular physical product.
    Normal,
    /// Electronic ticket.
    Eticket,
    /// Bundle of other products.
    Combo,
}

impl Genre {
    /// Integer code used by the analytical store.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Normal => 1,
            Self::Eticket => 2,
            Self::Combo => 3,
        }
    }

    /// Wire name used by the catalog API and tool inputs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Eticket => "eticket",
            Self::Combo => "combo",
        }
    }
}

impl FromStr for Genre {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "eticket" => Ok(Self::Eticket),
            "combo" => Ok(Self::Combo),
            other => Err(UnknownVariant {
                kind: "genre",
                value: other.to_string(),
                expected: "normal, eticket, combo",
            }),
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing sort order accepted by the catalog API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Most recently sold first.
    #[default]
    SoldAtDesc,
    /// Newest products first.
    CreatedAtDesc,
    /// Cheapest first.
    PriceAsc,
    /// Most expensive first.
    PriceDesc,
    /// Best sellers first.
    SalesDesc,
}

impl SortKey {
    /// Value sent as `sort_by`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SoldAtDesc => "sold_at_desc",
            Self::CreatedAtDesc => "created_at_desc",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::SalesDesc => "sales_desc",
        }
    }
}

impl FromStr for SortKey {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sold_at_desc" => Ok(Self::SoldAtDesc),
            "created_at_desc" => Ok(Self::CreatedAtDesc),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "sales_desc" => Ok(Self::SalesDesc),
            other => Err(UnknownVariant {
                kind: "sort_by",
                value: other.to_string(),
                expected: "sold_at_desc, created_at_desc, price_asc, price_desc, sales_desc",
            }),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
