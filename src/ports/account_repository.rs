//! AccountRepository port - storage for marketplace accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::{Marketplace, MarketplaceAccount};
use crate::domain::foundation::{AccountId, DomainError, OrgId};

/// Port for the marketplace-account credential store.
///
/// Rows are never hard-deleted; revocation is a status flip. The refresh
/// attempt counter is consumed through [`reserve_refresh_attempt`], an
/// atomic conditional increment, so racing sweeps cannot
/// double-increment past the cap.
///
/// [`reserve_refresh_attempt`]: AccountRepository::reserve_refresh_attempt
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts a new account row.
    async fn insert(&self, account: &MarketplaceAccount) -> Result<(), DomainError>;

    /// Updates an existing account row.
    async fn update(&self, account: &MarketplaceAccount) -> Result<(), DomainError>;

    /// Loads an account by id.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<MarketplaceAccount>, DomainError>;

    /// Loads an account by id, scoped to an organization.
    async fn find_by_id_for_org(
        &self,
        id: AccountId,
        org_id: OrgId,
    ) -> Result<Option<MarketplaceAccount>, DomainError>;

    /// Loads the account for a remote identity, regardless of status.
    ///
    /// An account is per remote identity, not per OAuth attempt; exchange
    /// upserts through this lookup.
    async fn find_by_remote_identity(
        &self,
        org_id: OrgId,
        marketplace: Marketplace,
        remote_account_id: &str,
    ) -> Result<Option<MarketplaceAccount>, DomainError>;

    /// Atomically consumes one unit of auto-refresh budget.
    ///
    /// Increments the attempt counter and stamps `last_checked_at` in a
    /// single conditional write, returning the updated row. Returns `None`
    /// when the counter is already at the cap (a concurrent sweep may have
    /// consumed the remaining budget) or the row is gone.
    async fn reserve_refresh_attempt(
        &self,
        id: AccountId,
    ) -> Result<Option<MarketplaceAccount>, DomainError>;

    /// Active accounts whose token expires at or before `cutoff`, ordered
    /// soonest-first. Non-expiring accounts are excluded.
    async fn find_active_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceAccount>, DomainError>;
}
