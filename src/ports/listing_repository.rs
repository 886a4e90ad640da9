//! ListingRepository port - storage for marketplace listings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::Marketplace;
use crate::domain::foundation::{AccountId, DomainError, ItemId, ListingId, OrgId};
use crate::domain::listing::Listing;

/// Port for listing persistence.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert(&self, listing: &Listing) -> Result<(), DomainError>;

    async fn update(&self, listing: &Listing) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DomainError>;

    /// The unique listing for an (item, account) pair, any status.
    async fn find_by_item_and_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Listing>, DomainError>;

    /// Resolves a listing from the marketplace's own listing identifier.
    /// Used by webhook routing, which knows the marketplace but not the
    /// account.
    async fn find_by_remote_id(
        &self,
        marketplace: Marketplace,
        remote_listing_id: &str,
    ) -> Result<Option<Listing>, DomainError>;

    /// Listings in listed/listing_pending with a remote id, an active
    /// account, and a last-synced timestamp older than `stale_before`
    /// (or never synced). Optionally scoped to one organization.
    async fn find_stale(
        &self,
        stale_before: DateTime<Utc>,
        org_id: Option<OrgId>,
    ) -> Result<Vec<Listing>, DomainError>;
}
