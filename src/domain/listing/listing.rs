//! Listing aggregate: one item offered through one marketplace account.
//!
//! A listing is unique per (item, account). Publish failures are recorded on
//! the listing itself so the job layer never has to re-throw past its
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{AccountId, ItemId, ListingId, OrgId};

/// Status of a marketplace listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Created but never submitted.
    Draft,
    /// Submission in flight.
    ListingPending,
    /// Live on the marketplace.
    Listed,
    /// Sold out on the marketplace.
    Sold,
    /// Ended without sale (expired, withdrawn, removed).
    Ended,
    /// Submission or marketplace-side failure; see `error_message`.
    Error,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::ListingPending => "listing_pending",
            ListingStatus::Listed => "listed",
            ListingStatus::Sold => "sold",
            ListingStatus::Ended => "ended",
            ListingStatus::Error => "error",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One item offered through one marketplace account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub item_id: ItemId,
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub status: ListingStatus,
    pub remote_listing_id: Option<String>,
    pub remote_url: Option<String>,
    pub error_message: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Creates a new draft listing for an (item, account) pair.
    pub fn new(item_id: ItemId, account_id: AccountId, org_id: OrgId) -> Self {
        let now = Utc::now();
        Self {
            id: ListingId::new(),
            item_id,
            account_id,
            org_id,
            status: ListingStatus::Draft,
            remote_listing_id: None,
            remote_url: None,
            error_message: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the listing into the pending state before submission, clearing
    /// any error left by a prior attempt.
    pub fn begin_publish(&mut self) {
        self.status = ListingStatus::ListingPending;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Records a successful submission.
    pub fn mark_listed(&mut self, remote_listing_id: String, remote_url: Option<String>) {
        self.status = ListingStatus::Listed;
        self.remote_listing_id = Some(remote_listing_id);
        self.remote_url = remote_url;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Records a failed submission or marketplace-side suspension.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ListingStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Applies a live status read back from the marketplace.
    pub fn apply_remote_status(&mut self, status: ListingStatus) {
        self.status = status;
        self.last_synced_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// True when the listing can be synced against the marketplace.
    pub fn is_syncable(&self) -> bool {
        self.remote_listing_id.is_some()
            && matches!(
                self.status,
                ListingStatus::Listed | ListingStatus::ListingPending
            )
    }
}
