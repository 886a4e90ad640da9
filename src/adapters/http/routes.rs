//! Axum router configuration for the marketplace API.
//!
//! This module defines the route structure and wires routes to their
//! corresponding handlers.

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers::{
    get_audit_log, get_auth_url, handle_webhook, oauth_callback, publish_listing, refresh_account,
    revoke_account, sync_listing, sync_stale_listings, webhook_challenge, AppState,
};

/// Create the account API router.
///
/// # Routes
///
/// - `GET /:marketplace/auth-url` - Start the OAuth connect flow
/// - `GET /:marketplace/callback` - Complete the OAuth connect flow
/// - `POST /:id/refresh` - Refresh an account's tokens on demand
/// - `DELETE /:id` - Disconnect an account
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/:marketplace/auth-url", get(get_auth_url))
        .route("/:marketplace/callback", get(oauth_callback))
        .route("/:id/refresh", post(refresh_account))
        .route("/:id", delete(revoke_account))
}

/// Create the listing jobs router.
///
/// These endpoints only enqueue; the job processors do the marketplace
/// calls in the background.
///
/// # Routes
///
/// - `POST /publish` - Enqueue a publish job
/// - `POST /sync` - Enqueue a sync job for one listing
/// - `POST /sync-stale` - Enqueue a sync of the org's stale listings
pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/publish", post(publish_listing))
        .route("/sync", post(sync_listing))
        .route("/sync-stale", post(sync_stale_listings))
}

/// Create the webhook router.
///
/// This is separate from the main API routes because webhook deliveries
/// don't carry user authentication (they're verified via signature).
///
/// # Routes
///
/// - `POST /:marketplace` - Receive a webhook delivery
/// - `GET /:marketplace` - Answer an endpoint-verification challenge
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/:marketplace", post(handle_webhook).get(webhook_challenge))
}

/// Create the complete application router.
///
/// Authenticated API routes are nested under `/api`; webhook routes live at
/// `/webhooks` so the path registered with each marketplace stays stable.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .nest("/api/accounts", account_routes())
        .nest("/api/listings", listing_routes())
        .route("/api/audit", get(get_audit_log))
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    use crate::adapters::http::handlers::SIGNATURE_HEADER;
    use crate::application::audit::Auditor;
    use crate::application::{AccountService, MarketplaceRegistry, WebhookRouter};
    use crate::domain::account::Marketplace;
    use crate::domain::foundation::{OrgId, UserId};
    use crate::testutil::{
        test_cipher, test_codec, FakeAccounts, FakeDedup, FakeDriver, FakeFactory, FakeListings,
        FakeQueue, RecordingSink,
    };

    const WEBHOOK_SECRET: &str = "routes-webhook-secret";

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn test_state() -> AppState {
        let cipher = Arc::new(test_cipher());
        let codec = Arc::new(test_codec());
        let sink = Arc::new(RecordingSink::default());
        let auditor = Auditor::new(sink);

        let mut registry = MarketplaceRegistry::new();
        registry.register(
            Marketplace::Ebay,
            Arc::new(FakeDriver::granting("access", Some("refresh"), "remote-1")),
            Arc::new(FakeFactory::default()),
        );

        let accounts = Arc::new(AccountService::new(
            Arc::new(FakeAccounts::default()),
            Arc::new(registry),
            cipher,
            codec,
            auditor.clone(),
        ));

        let webhooks = Arc::new(
            WebhookRouter::new(
                Arc::new(FakeDedup::default()),
                Arc::new(FakeListings::default()),
                auditor.clone(),
            )
            .with_endpoint(
                Marketplace::Ebay,
                secrecy::SecretString::new(WEBHOOK_SECRET.to_string()),
                None,
            ),
        );

        AppState {
            accounts,
            webhooks,
            queue: Arc::new(FakeQueue::default()),
            auditor,
            public_base_url: "https://app.example.com".to_string(),
        }
    }

    fn app() -> Router {
        app_router().with_state(test_state())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn auth_url_requires_authentication() {
        let response = app()
            .oneshot(
                Request::get("/api/accounts/ebay/auth-url")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn auth_url_embeds_signed_state() {
        let response = app()
            .oneshot(
                Request::get("/api/accounts/ebay/auth-url")
                    .header("x-org-id", OrgId::new().to_string())
                    .header("x-user-id", UserId::new().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let url = json["auth_url"].as_str().unwrap();
        assert!(url.contains("state="));
    }

    #[tokio::test]
    async fn auth_url_for_unconfigured_marketplace_is_not_found() {
        let response = app()
            .oneshot(
                Request::get("/api/accounts/amazon/auth-url")
                    .header("x-org-id", OrgId::new().to_string())
                    .header("x-user-id", UserId::new().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "MARKETPLACE_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn auth_url_for_unknown_marketplace_is_bad_request() {
        let response = app()
            .oneshot(
                Request::get("/api/accounts/etsy/auth-url")
                    .header("x-org-id", OrgId::new().to_string())
                    .header("x-user-id", UserId::new().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn publish_enqueues_and_returns_accepted() {
        let body = serde_json::json!({
            "item_id": uuid::Uuid::new_v4().to_string(),
            "account_id": uuid::Uuid::new_v4().to_string(),
        });
        let response = app()
            .oneshot(
                Request::post("/api/listings/publish")
                    .header("x-org-id", OrgId::new().to_string())
                    .header("x-user-id", UserId::new().to_string())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["enqueued"], true);
    }

    #[tokio::test]
    async fn publish_rejects_malformed_ids() {
        let body = serde_json::json!({
            "item_id": "not-a-uuid",
            "account_id": uuid::Uuid::new_v4().to_string(),
        });
        let response = app()
            .oneshot(
                Request::post("/api/listings/publish")
                    .header("x-org-id", OrgId::new().to_string())
                    .header("x-user-id", UserId::new().to_string())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn webhook_with_valid_signature_is_acknowledged() {
        let payload = serde_json::json!({
            "notificationId": "evt-routes-1",
            "eventType": "SOMETHING_UNROUTABLE",
            "listingId": "remote-listing-1"
        })
        .to_string();

        let response = app()
            .oneshot(
                Request::post("/webhooks/ebay")
                    .header(SIGNATURE_HEADER, sign(payload.as_bytes()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["received"], true);
    }

    #[tokio::test]
    async fn webhook_with_bad_signature_is_unauthorized() {
        let payload = r#"{"notificationId":"evt-routes-2"}"#;

        let response = app()
            .oneshot(
                Request::post("/webhooks/ebay")
                    .header(SIGNATURE_HEADER, hex::encode([0u8; 32]))
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "INVALID_SIGNATURE");
        // A fixed message; which verification check failed stays internal.
        assert_eq!(json["message"], "Webhook could not be verified");
    }

    #[tokio::test]
    async fn webhook_rejection_body_never_names_the_failed_check() {
        // Verified signature, stale timestamp: a different failure mode
        // must produce the same opaque body shape.
        let payload = serde_json::json!({
            "notificationId": "evt-routes-3",
            "eventType": "ITEM_SOLD",
            "eventDate": (chrono::Utc::now() - chrono::Duration::minutes(30)).to_rfc3339(),
            "listingId": "remote-listing-1"
        })
        .to_string();

        let response = app()
            .oneshot(
                Request::post("/webhooks/ebay")
                    .header(SIGNATURE_HEADER, sign(payload.as_bytes()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "INVALID_PAYLOAD");
        let message = json["message"].as_str().unwrap();
        assert!(!message.to_lowercase().contains("timestamp"));
        assert!(!message.to_lowercase().contains("stale"));
    }

    #[tokio::test]
    async fn webhook_for_unconfigured_marketplace_is_not_found() {
        let response = app()
            .oneshot(
                Request::post("/webhooks/facebook")
                    .header(SIGNATURE_HEADER, hex::encode([0u8; 32]))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn challenge_is_echoed_without_verification_token() {
        let response = app()
            .oneshot(
                Request::get("/webhooks/ebay?challenge_code=abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["challengeResponse"], "abc123");
    }
}
