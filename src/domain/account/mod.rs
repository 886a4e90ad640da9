//! Marketplace account aggregate and status lifecycle.

mod account;
mod marketplace;

pub use account::{AccountStatus, MarketplaceAccount, MAX_AUTO_REFRESH_ATTEMPTS};
pub use marketplace::{Marketplace, UnknownMarketplace};
