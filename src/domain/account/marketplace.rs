//! Supported marketplaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A third-party marketplace the platform can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Ebay,
    Amazon,
    Facebook,
}

impl Marketplace {
    /// All supported marketplaces.
    pub const ALL: [Marketplace; 3] = [
        Marketplace::Ebay,
        Marketplace::Amazon,
        Marketplace::Facebook,
    ];

    /// Stable lowercase name used in URLs, database columns, and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Ebay => "ebay",
            Marketplace::Amazon => "amazon",
            Marketplace::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown marketplace name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown marketplace: {0}")]
pub struct UnknownMarketplace(pub String);

impl FromStr for Marketplace {
    type Err = UnknownMarketplace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ebay" => Ok(Marketplace::Ebay),
            "amazon" => Ok(Marketplace::Amazon),
            "facebook" => Ok(Marketplace::Facebook),
            other => Err(UnknownMarketplace(other.to_string())),
        }
    }
}
