//! MarketplaceClient port - authenticated listing operations against one
//! marketplace account.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::foundation::AccountId;
use crate::domain::listing::{CanonicalListing, ListingStatus};

use super::oauth_driver::CredentialSink;

/// Live decrypted credentials for constructing a client. Use-once: never
/// stored, never logged.
pub struct LiveCredentials {
    pub account_id: AccountId,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Identity of a listing created on the marketplace.
#[derive(Debug, Clone)]
pub struct RemoteListing {
    pub remote_listing_id: String,
    pub remote_url: Option<String>,
}

/// Errors from authenticated marketplace calls.
#[derive(Debug, Error)]
pub enum MarketplaceApiError {
    #[error("Marketplace rejected the request: {0}")]
    Rejected(String),

    #[error("Marketplace credentials were refused")]
    Unauthorized,

    #[error("Marketplace request failed: {0}")]
    Network(String),
}

/// Authenticated operations against one marketplace account.
///
/// Implementations hold the decrypted access token for the duration of the
/// client's life and report any mid-call token rotation through the
/// [`CredentialSink`] they were constructed with.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Submits a canonical listing and returns its remote identity.
    async fn publish_listing(
        &self,
        listing: &CanonicalListing,
    ) -> Result<RemoteListing, MarketplaceApiError>;

    /// Reads the live status of a listing.
    async fn listing_status(
        &self,
        remote_listing_id: &str,
    ) -> Result<ListingStatus, MarketplaceApiError>;
}

impl std::fmt::Debug for dyn MarketplaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MarketplaceClient")
    }
}

/// Factory for authenticated clients; implemented alongside each OAuth
/// driver.
pub trait MarketplaceClientFactory: Send + Sync {
    fn client(
        &self,
        credentials: LiveCredentials,
        sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient>;
}
