//! Publish job processor.
//!
//! Consumes [`PublishJob`] payloads from the queue and pushes an item to a
//! marketplace. One listing row exists per (item, account) pair; a retried
//! or re-enqueued job reuses it, so publishing is idempotent. Marketplace
//! rejections are stored on the listing, not thrown, so the queue does not
//! retry a rejection the marketplace will repeat.

use std::sync::Arc;

use serde_json::json;

use crate::domain::audit::{AuditEventType, AuditRecord};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::listing::{CanonicalListing, Listing, ListingStatus};
use crate::ports::{
    AccountRepository, ItemStore, ListingRepository, MarketplaceApiError, PublishJob,
};

use super::accounts::AccountService;
use super::audit::Auditor;

pub struct PublishProcessor {
    listings: Arc<dyn ListingRepository>,
    items: Arc<dyn ItemStore>,
    accounts: Arc<dyn AccountRepository>,
    service: Arc<AccountService>,
    auditor: Auditor,
}

impl PublishProcessor {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        items: Arc<dyn ItemStore>,
        accounts: Arc<dyn AccountRepository>,
        service: Arc<AccountService>,
        auditor: Auditor,
    ) -> Self {
        Self {
            listings,
            items,
            accounts,
            service,
            auditor,
        }
    }

    /// Processes one publish job.
    ///
    /// # Errors
    ///
    /// Fails on missing item, missing account, or storage errors. A
    /// marketplace rejection is not an error: the listing comes back in
    /// `Error` status with the message stored on it.
    pub async fn process(&self, job: PublishJob) -> Result<Listing, DomainError> {
        let account = self
            .accounts
            .find_by_id_for_org(job.account_id, job.org_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))?;

        let snapshot = self
            .items
            .snapshot(job.item_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::ItemNotFound, "Item not found"))?;

        let mut listing = match self
            .listings
            .find_by_item_and_account(job.item_id, job.account_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let listing = Listing::new(job.item_id, job.account_id, job.org_id);
                self.listings.insert(&listing).await?;
                listing
            }
        };

        // Already live on this marketplace. A redelivered job is a no-op.
        if listing.status == ListingStatus::Listed && listing.remote_listing_id.is_some() {
            return Ok(listing);
        }

        if self.items.remaining_quantity(job.item_id).await? <= 0 {
            return self
                .store_failure(listing, &job, "No remaining quantity to publish")
                .await;
        }

        listing.begin_publish();
        self.listings.update(&listing).await?;

        let client = match self.service.get_adapter(job.account_id).await {
            Ok(client) => client,
            Err(e) if e.code == ErrorCode::AccountInactive => {
                return self.store_failure(listing, &job, &e.message).await;
            }
            Err(e) => return Err(e),
        };

        let canonical = CanonicalListing::from_item(snapshot, &account.settings);
        match client.publish_listing(&canonical).await {
            Ok(remote) => {
                listing.mark_listed(remote.remote_listing_id.clone(), remote.remote_url);
                self.listings.update(&listing).await?;
                self.items.advance_to_listed(job.item_id).await?;

                self.auditor
                    .record(
                        AuditRecord::new(
                            job.org_id,
                            AuditEventType::ListingPublished,
                            format!("Published item to {}", account.marketplace),
                        )
                        .with_account(account.id, account.marketplace)
                        .with_metadata(json!({
                            "item_id": job.item_id,
                            "listing_id": listing.id,
                            "remote_listing_id": remote.remote_listing_id,
                            "auto_published": job.auto_published,
                        })),
                    )
                    .await;

                Ok(listing)
            }
            Err(e) => {
                let message = match &e {
                    MarketplaceApiError::Unauthorized => {
                        "Marketplace credentials were refused".to_string()
                    }
                    other => other.to_string(),
                };
                self.store_failure(listing, &job, &message).await
            }
        }
    }

    async fn store_failure(
        &self,
        mut listing: Listing,
        job: &PublishJob,
        message: &str,
    ) -> Result<Listing, DomainError> {
        tracing::warn!(
            listing_id = %listing.id,
            item_id = %job.item_id,
            account_id = %job.account_id,
            message,
            "Publish failed"
        );
        listing.mark_error(message);
        self.listings.update(&listing).await?;

        self.auditor
            .record(
                AuditRecord::new(
                    job.org_id,
                    AuditEventType::ListingPublishFailed,
                    format!("Publish failed: {message}"),
                )
                .with_metadata(json!({
                    "item_id": job.item_id,
                    "listing_id": listing.id,
                    "account_id": job.account_id,
                })),
            )
            .await;

        Ok(listing)
    }
}
