//! Sync job processor.
//!
//! Pulls live listing status from the marketplace and reconciles local
//! state. Runs as a single-listing job or as a bulk pass over stale
//! listings; in bulk, one listing's failure never stops the rest.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::domain::audit::{AuditEventType, AuditRecord};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::listing::{Listing, ListingStatus};
use crate::ports::{ItemStore, ListingRepository, SyncJob};

use super::accounts::AccountService;
use super::audit::Auditor;

/// Counters from a bulk sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub examined: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SyncProcessor {
    listings: Arc<dyn ListingRepository>,
    items: Arc<dyn ItemStore>,
    service: Arc<AccountService>,
    auditor: Auditor,
}

impl SyncProcessor {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        items: Arc<dyn ItemStore>,
        service: Arc<AccountService>,
        auditor: Auditor,
    ) -> Self {
        Self {
            listings,
            items,
            service,
            auditor,
        }
    }

    /// Processes one sync job.
    pub async fn process(&self, job: SyncJob) -> Result<SyncOutcome, DomainError> {
        match job {
            SyncJob::Listing { listing_id, .. } => {
                let listing = self
                    .listings
                    .find_by_id(listing_id)
                    .await?
                    .ok_or_else(|| {
                        DomainError::new(ErrorCode::ListingNotFound, "Listing not found")
                    })?;
                let mut outcome = SyncOutcome {
                    examined: 1,
                    ..SyncOutcome::default()
                };
                match self.sync_one(listing).await? {
                    Some(_) => outcome.synced += 1,
                    None => outcome.skipped += 1,
                }
                Ok(outcome)
            }
            SyncJob::AllStale {
                org_id,
                stale_after,
            } => {
                let stale_before = Utc::now()
                    - chrono::Duration::seconds(stale_after.as_secs() as i64);
                let stale = self.listings.find_stale(stale_before, org_id).await?;

                let mut outcome = SyncOutcome::default();
                for listing in stale {
                    outcome.examined += 1;
                    let listing_id = listing.id;
                    match self.sync_one(listing).await {
                        Ok(Some(_)) => outcome.synced += 1,
                        Ok(None) => outcome.skipped += 1,
                        Err(e) => {
                            outcome.failed += 1;
                            tracing::warn!(
                                listing_id = %listing_id,
                                error = %e,
                                "Sync failed, continuing with remaining listings"
                            );
                        }
                    }
                }

                tracing::info!(
                    examined = outcome.examined,
                    synced = outcome.synced,
                    skipped = outcome.skipped,
                    failed = outcome.failed,
                    "Bulk sync complete"
                );
                Ok(outcome)
            }
        }
    }

    /// Reconciles one listing against its marketplace.
    ///
    /// A listing that has never been published, or whose account is no
    /// longer active, is not yet syncable; both return `Ok(None)` so a
    /// durable queue never retries them as failures.
    ///
    /// # Errors
    ///
    /// Fails when the listing's account cannot be loaded or the
    /// marketplace call fails.
    pub async fn sync_one(&self, mut listing: Listing) -> Result<Option<Listing>, DomainError> {
        let Some(remote_id) = listing.remote_listing_id.clone() else {
            tracing::debug!(listing_id = %listing.id, "Listing has never been published; skipping sync");
            return Ok(None);
        };

        let client = match self.service.get_adapter(listing.account_id).await {
            Ok(client) => client,
            Err(e) if e.code == ErrorCode::AccountInactive => {
                tracing::debug!(
                    listing_id = %listing.id,
                    account_id = %listing.account_id,
                    "Account is not active; skipping sync"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let remote_status = client
            .listing_status(&remote_id)
            .await
            .map_err(|e| DomainError::new(ErrorCode::MarketplaceApiError, e.to_string()))?;

        let became_sold =
            remote_status == ListingStatus::Sold && listing.status != ListingStatus::Sold;
        let changed = remote_status != listing.status;
        listing.apply_remote_status(remote_status);
        self.listings.update(&listing).await?;

        // The item moves to Sold only once every channel is out of stock.
        if became_sold && self.items.remaining_quantity(listing.item_id).await? == 0 {
            self.items.advance_to_sold(listing.item_id).await?;
        }

        if changed {
            self.auditor
                .record(
                    AuditRecord::new(
                        listing.org_id,
                        AuditEventType::ListingSynced,
                        format!("Listing status changed to {}", listing.status),
                    )
                    .with_metadata(json!({
                        "listing_id": listing.id,
                        "remote_listing_id": remote_id,
                        "status": listing.status,
                    })),
                )
                .await;
        }

        Ok(Some(listing))
    }
}
