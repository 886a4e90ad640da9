//! Webhook ingestion: verify, dedup, route.
//!
//! The HTTP layer hands the raw body to [`WebhookRouter::handle`], which
//! runs the verification pipeline, suppresses duplicates, and dispatches
//! the event to its listing. Handlers are idempotent, so a duplicate that
//! slips past dedup (process restart, multi-instance) is harmless.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MarketplacesConfig;
use crate::domain::account::Marketplace;
use crate::domain::audit::{AuditEventType, AuditRecord};
use crate::domain::listing::{Listing, ListingStatus};
use crate::domain::webhook::{
    WebhookEnvelope, WebhookError, WebhookEventKind, WebhookVerifier,
};
use crate::ports::{ListingRepository, WebhookDedupStore};

use super::audit::Auditor;

/// Acknowledgement returned to the marketplace.
///
/// `received` is true for every verified delivery; `processed` is true only
/// when the event changed local state. Duplicates, unroutable events, and
/// handler failures are acknowledged without processing so the marketplace
/// stops retrying a delivery this endpoint has accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub received: bool,
    pub processed: bool,
}

impl WebhookOutcome {
    fn processed() -> Self {
        Self {
            received: true,
            processed: true,
        }
    }

    fn acknowledged() -> Self {
        Self {
            received: true,
            processed: false,
        }
    }
}

/// Errors surfaced to the HTTP layer, all pre-verification.
#[derive(Debug, Error)]
pub enum WebhookRouteError {
    #[error("No webhook endpoint configured for {0}")]
    NotConfigured(Marketplace),

    #[error(transparent)]
    Verification(#[from] WebhookError),
}

struct Endpoint {
    verifier: WebhookVerifier,
    verification_token: Option<String>,
}

pub struct WebhookRouter {
    endpoints: HashMap<Marketplace, Endpoint>,
    dedup: Arc<dyn WebhookDedupStore>,
    listings: Arc<dyn ListingRepository>,
    auditor: Auditor,
}

impl WebhookRouter {
    pub fn new(
        dedup: Arc<dyn WebhookDedupStore>,
        listings: Arc<dyn ListingRepository>,
        auditor: Auditor,
    ) -> Self {
        Self {
            endpoints: HashMap::new(),
            dedup,
            listings,
            auditor,
        }
    }

    /// Registers an endpoint for one marketplace.
    pub fn with_endpoint(
        mut self,
        marketplace: Marketplace,
        secret: secrecy::SecretString,
        verification_token: Option<String>,
    ) -> Self {
        self.endpoints.insert(
            marketplace,
            Endpoint {
                verifier: WebhookVerifier::new(secret),
                verification_token,
            },
        );
        self
    }

    /// Registers endpoints for every marketplace configured with a webhook
    /// secret.
    pub fn with_configured_endpoints(mut self, config: &MarketplacesConfig) -> Self {
        for marketplace in Marketplace::ALL {
            let app = config.get(marketplace);
            if app.webhook_secret.expose_secret().is_empty() {
                continue;
            }
            self = self.with_endpoint(
                marketplace,
                app.webhook_secret.clone(),
                app.verification_token
                    .as_ref()
                    .map(|t| t.expose_secret().to_string()),
            );
        }
        self
    }

    /// Verifies and routes one delivery.
    ///
    /// # Errors
    ///
    /// Verification failures return [`WebhookRouteError`]; the HTTP layer
    /// maps them to 4xx. A verified event always returns `Ok`, even when it
    /// cannot be routed or its handler fails.
    pub async fn handle(
        &self,
        marketplace: Marketplace,
        body: &[u8],
        signature_hex: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookRouteError> {
        let endpoint = self
            .endpoints
            .get(&marketplace)
            .ok_or(WebhookRouteError::NotConfigured(marketplace))?;

        // Size and signature first, over the raw body. The timestamp lives
        // inside the payload, so it is validated after parsing.
        if let Err(e) = endpoint.verifier.verify(body, signature_hex, None) {
            tracing::warn!(marketplace = %marketplace, error = %e, "Webhook rejected");
            return Err(e.into());
        }

        let envelope = WebhookEnvelope::parse(marketplace, body)?;

        if let Some(ts) = envelope.timestamp {
            if let Err(e) = endpoint.verifier.validate_timestamp(ts) {
                tracing::warn!(marketplace = %marketplace, error = %e, "Webhook rejected");
                return Err(e.into());
            }
        }

        if let Some(event_id) = &envelope.event_id {
            let dedup_key = format!("{marketplace}:{event_id}");
            if !self.dedup.check_and_record(&dedup_key).await {
                tracing::debug!(marketplace = %marketplace, event_id, "Duplicate webhook suppressed");
                return Ok(WebhookOutcome::acknowledged());
            }
        }

        // The delivery is verified at this point; a failing handler is our
        // problem, not the marketplace's. Acknowledge so it stops retrying.
        match self.dispatch(envelope).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    marketplace = %marketplace,
                    error = %e,
                    "Webhook handler failed after verification; acknowledging without processing"
                );
                Ok(WebhookOutcome::acknowledged())
            }
        }
    }

    /// Answers a marketplace endpoint-verification challenge.
    ///
    /// Marketplaces with a verification token expect the hex SHA-256 of
    /// challenge + token + endpoint URL; the rest get the challenge echoed
    /// back.
    pub fn challenge_response(
        &self,
        marketplace: Marketplace,
        challenge: &str,
        endpoint_url: &str,
    ) -> Result<String, WebhookRouteError> {
        let endpoint = self
            .endpoints
            .get(&marketplace)
            .ok_or(WebhookRouteError::NotConfigured(marketplace))?;

        Ok(match &endpoint.verification_token {
            Some(token) => {
                let mut hasher = Sha256::new();
                hasher.update(challenge.as_bytes());
                hasher.update(token.as_bytes());
                hasher.update(endpoint_url.as_bytes());
                hex::encode(hasher.finalize())
            }
            None => challenge.to_string(),
        })
    }

    async fn dispatch(
        &self,
        envelope: WebhookEnvelope,
    ) -> Result<WebhookOutcome, crate::domain::foundation::DomainError> {
        if envelope.kind == WebhookEventKind::Unknown {
            tracing::debug!(marketplace = %envelope.marketplace, "Unhandled webhook event kind");
            return Ok(WebhookOutcome::acknowledged());
        }

        let Some(remote_listing_id) = envelope.remote_listing_id.as_deref() else {
            tracing::debug!(marketplace = %envelope.marketplace, "Webhook carries no listing id");
            return Ok(WebhookOutcome::acknowledged());
        };

        let listing = self
            .listings
            .find_by_remote_id(envelope.marketplace, remote_listing_id)
            .await?;

        let Some(mut listing) = listing else {
            tracing::debug!(
                marketplace = %envelope.marketplace,
                remote_listing_id,
                "Webhook for unknown listing"
            );
            return Ok(WebhookOutcome::acknowledged());
        };

        // Handlers touch listing-level state only; the item's own lifecycle
        // is reconciled by the sync processor, which sees stock levels.
        match envelope.kind {
            WebhookEventKind::ItemSold => {
                self.apply_status(&mut listing, ListingStatus::Sold, &envelope)
                    .await
            }
            WebhookEventKind::ItemEnded => {
                self.apply_status(&mut listing, ListingStatus::Ended, &envelope)
                    .await
            }
            WebhookEventKind::ItemSuspended => self.on_suspended(&mut listing, &envelope).await,
            WebhookEventKind::Unknown => unreachable!("filtered above"),
        }
    }

    async fn on_suspended(
        &self,
        listing: &mut Listing,
        envelope: &WebhookEnvelope,
    ) -> Result<WebhookOutcome, crate::domain::foundation::DomainError> {
        listing.mark_error(format!(
            "Listing suspended by {}",
            envelope.marketplace
        ));
        self.listings.update(listing).await?;
        self.audit_received(listing, envelope).await;
        Ok(WebhookOutcome::processed())
    }

    async fn apply_status(
        &self,
        listing: &mut Listing,
        status: ListingStatus,
        envelope: &WebhookEnvelope,
    ) -> Result<WebhookOutcome, crate::domain::foundation::DomainError> {
        listing.apply_remote_status(status);
        self.listings.update(listing).await?;
        self.audit_received(listing, envelope).await;
        Ok(WebhookOutcome::processed())
    }

    async fn audit_received(&self, listing: &Listing, envelope: &WebhookEnvelope) {
        self.auditor
            .record(
                AuditRecord::new(
                    listing.org_id,
                    AuditEventType::WebhookReceived,
                    format!(
                        "{} webhook {:?} for listing {}",
                        envelope.marketplace, envelope.kind, listing.id
                    ),
                )
                .with_account(listing.account_id, envelope.marketplace)
                .with_metadata(serde_json::json!({
                    "event_id": envelope.event_id,
                    "remote_listing_id": envelope.remote_listing_id,
                })),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AccountId, DomainError, ItemId, ListingId, OrgId};
    use crate::ports::ListingRepository;
    use crate::testutil::{FakeDedup, FakeListings, RecordingSink};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use hmac::{Hmac, Mac};
    use secrecy::SecretString;
    use serde_json::json;

    const SECRET: &str = "wh-secret";

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    struct Fixture {
        router: WebhookRouter,
        listings: Arc<FakeListings>,
        audit: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let listings = Arc::new(FakeListings::default());
        let audit = Arc::new(RecordingSink::default());
        let router = WebhookRouter::new(
            Arc::new(FakeDedup::default()),
            listings.clone(),
            Auditor::new(audit.clone()),
        )
        .with_endpoint(
            Marketplace::Ebay,
            SecretString::new(SECRET.to_string()),
            None,
        );
        Fixture {
            router,
            listings,
            audit,
        }
    }

    async fn seed_listed(fixture: &Fixture, remote_id: &str) -> Listing {
        let account_id = AccountId::new();
        let item_id = ItemId::new();
        let mut listing = Listing::new(item_id, account_id, OrgId::new());
        listing.mark_listed(remote_id.to_string(), None);
        fixture.listings.seed(listing.clone()).await;
        fixture
            .listings
            .seed_account_marketplace(account_id, Marketplace::Ebay)
            .await;
        listing
    }

    fn sold_body(notification_id: &str, listing_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "notificationId": notification_id,
            "eventType": "ITEM_SOLD",
            "eventDate": Utc::now().to_rfc3339(),
            "listingId": listing_id,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn sold_event_updates_listing_status_only() {
        let f = fixture();
        let listing = seed_listed(&f, "ebay-1").await;
        let body = sold_body("n-1", "ebay-1");

        let outcome = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::processed());
        let stored = f.listings.get(listing.id).await.unwrap();
        assert_eq!(stored.status, ListingStatus::Sold);
        assert!(stored.last_synced_at.is_some());
        assert_eq!(f.audit.events().await, vec![AuditEventType::WebhookReceived]);
    }

    #[tokio::test]
    async fn duplicate_event_is_acknowledged_once() {
        let f = fixture();
        let listing = seed_listed(&f, "ebay-1").await;
        let body = sold_body("n-dup", "ebay-1");
        let sig = sign(&body);

        let first = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sig))
            .await
            .unwrap();
        let second = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sig))
            .await
            .unwrap();

        assert_eq!(first, WebhookOutcome::processed());
        assert_eq!(second, WebhookOutcome::acknowledged());
        // State changed exactly once.
        assert_eq!(f.audit.events().await.len(), 1);
        let stored = f.listings.get(listing.id).await.unwrap();
        assert_eq!(stored.status, ListingStatus::Sold);
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_before_parsing() {
        let f = fixture();
        seed_listed(&f, "ebay-1").await;
        let body = sold_body("n-1", "ebay-1");

        let err = f
            .router
            .handle(Marketplace::Ebay, &body, Some("00ff"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WebhookRouteError::Verification(WebhookError::InvalidSignature)
        ));
        assert!(f.audit.events().await.is_empty());
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let f = fixture();
        let body = sold_body("n-1", "ebay-1");
        let err = f
            .router
            .handle(Marketplace::Ebay, &body, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookRouteError::Verification(WebhookError::MissingSignature)
        ));
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected_after_parse() {
        let f = fixture();
        seed_listed(&f, "ebay-1").await;
        let body = serde_json::to_vec(&json!({
            "notificationId": "n-old",
            "eventType": "ITEM_SOLD",
            "eventDate": (Utc::now() - chrono::Duration::minutes(10)).to_rfc3339(),
            "listingId": "ebay-1",
        }))
        .unwrap();

        let err = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WebhookRouteError::Verification(WebhookError::StaleTimestamp)
        ));
    }

    #[tokio::test]
    async fn unknown_event_kind_is_acknowledged() {
        let f = fixture();
        let body = serde_json::to_vec(&json!({
            "notificationId": "n-x",
            "eventType": "SOMETHING_ELSE",
        }))
        .unwrap();

        let outcome = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::acknowledged());
    }

    #[tokio::test]
    async fn unknown_listing_is_acknowledged_without_processing() {
        let f = fixture();
        let body = sold_body("n-1", "no-such-listing");

        let outcome = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::acknowledged());
        assert!(f.audit.events().await.is_empty());
    }

    /// Repository whose reads blow up, for exercising handler failures
    /// behind a verified delivery.
    struct BrokenListings;

    #[async_trait]
    impl ListingRepository for BrokenListings {
        async fn insert(&self, _listing: &Listing) -> Result<(), DomainError> {
            Err(DomainError::database("storage down"))
        }

        async fn update(&self, _listing: &Listing) -> Result<(), DomainError> {
            Err(DomainError::database("storage down"))
        }

        async fn find_by_id(&self, _id: ListingId) -> Result<Option<Listing>, DomainError> {
            Err(DomainError::database("storage down"))
        }

        async fn find_by_item_and_account(
            &self,
            _item_id: ItemId,
            _account_id: AccountId,
        ) -> Result<Option<Listing>, DomainError> {
            Err(DomainError::database("storage down"))
        }

        async fn find_by_remote_id(
            &self,
            _marketplace: Marketplace,
            _remote_listing_id: &str,
        ) -> Result<Option<Listing>, DomainError> {
            Err(DomainError::database("storage down"))
        }

        async fn find_stale(
            &self,
            _stale_before: DateTime<Utc>,
            _org_id: Option<OrgId>,
        ) -> Result<Vec<Listing>, DomainError> {
            Err(DomainError::database("storage down"))
        }
    }

    #[tokio::test]
    async fn handler_failure_is_acknowledged_without_processing() {
        let router = WebhookRouter::new(
            Arc::new(FakeDedup::default()),
            Arc::new(BrokenListings),
            Auditor::new(Arc::new(RecordingSink::default())),
        )
        .with_endpoint(
            Marketplace::Ebay,
            SecretString::new(SECRET.to_string()),
            None,
        );
        let body = sold_body("n-broken", "ebay-1");

        // Verified delivery, broken storage: the marketplace must not be
        // told to redeliver.
        let outcome = router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::acknowledged());
    }

    #[tokio::test]
    async fn unconfigured_marketplace_is_not_found() {
        let f = fixture();
        let err = f
            .router
            .handle(Marketplace::Amazon, b"{}", Some("00"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookRouteError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn suspended_event_marks_listing_error() {
        let f = fixture();
        let listing = seed_listed(&f, "ebay-1").await;
        let body = serde_json::to_vec(&json!({
            "notificationId": "n-s",
            "eventType": "ITEM_SUSPENDED",
            "listingId": "ebay-1",
        }))
        .unwrap();

        let outcome = f
            .router
            .handle(Marketplace::Ebay, &body, Some(&sign(&body)))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::processed());
        let stored = f.listings.get(listing.id).await.unwrap();
        assert_eq!(stored.status, ListingStatus::Error);
        assert!(stored.error_message.as_deref().unwrap().contains("suspended"));
    }

    #[test]
    fn challenge_echoes_without_verification_token() {
        let f = fixture();
        let response = f
            .router
            .challenge_response(Marketplace::Ebay, "abc123", "https://x.example/wh")
            .unwrap();
        assert_eq!(response, "abc123");
    }

    #[test]
    fn challenge_hashes_with_verification_token() {
        let listings = Arc::new(FakeListings::default());
        let router = WebhookRouter::new(
            Arc::new(FakeDedup::default()),
            listings,
            Auditor::new(Arc::new(RecordingSink::default())),
        )
        .with_endpoint(
            Marketplace::Ebay,
            SecretString::new(SECRET.to_string()),
            Some("vtoken".to_string()),
        );

        let endpoint = "https://x.example/webhooks/ebay";
        let response = router
            .challenge_response(Marketplace::Ebay, "abc123", endpoint)
            .unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"abc123");
        hasher.update(b"vtoken");
        hasher.update(endpoint.as_bytes());
        assert_eq!(response, hex::encode(hasher.finalize()));
    }
}
