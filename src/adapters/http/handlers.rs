//! HTTP handlers for the marketplace API.
//!
//! These handlers connect Axum routes to the application services. Webhook
//! handlers take the raw request body because signature verification must
//! run over the exact bytes the marketplace signed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::audit::Auditor;
use crate::application::{AccountService, WebhookRouteError, WebhookRouter};
use crate::domain::account::{Marketplace, UnknownMarketplace};
use crate::domain::audit::{AuditEventType, AuditQuery};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, ItemId, ListingId, OrgId, UserId};
use crate::domain::webhook::WebhookError;
use crate::ports::{JobQueue, PublishJob, SyncJob};

use super::dto::{
    AccountResponse, AuditLogQuery, AuditLogResponse, AuditRecordResponse, AuthUrlResponse,
    ChallengeQuery, ChallengeResponse, EnqueuedResponse, ErrorResponse, OAuthCallbackQuery,
    PublishListingRequest, SyncListingRequest, SyncStaleRequest,
};

/// Signature header checked on every webhook delivery.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped
/// dependencies for efficient sharing across handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub webhooks: Arc<WebhookRouter>,
    pub queue: Arc<dyn JobQueue>,
    pub auditor: Auditor,
    /// Externally reachable base URL, used to reconstruct the endpoint URL
    /// that marketplaces hash during endpoint verification.
    pub public_base_url: String,
}

impl AppState {
    fn webhook_endpoint_url(&self, marketplace: Marketplace) -> String {
        format!(
            "{}/webhooks/{}",
            self.public_base_url.trim_end_matches('/'),
            marketplace
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (would come from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated caller context extracted from the request.
///
/// In production, this would be extracted from JWT/session by auth
/// middleware. For now, uses header-based extraction for development and
/// testing.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub org_id: OrgId,
    pub user_id: UserId,
}

/// Rejection type for [`AuthenticatedUser`] extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let header_id = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            };

            let org_id = header_id("x-org-id").ok_or(AuthenticationRequired)?;
            let user_id = header_id("x-user-id").ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser {
                org_id: OrgId::from_uuid(org_id),
                user_id: UserId::from_uuid(user_id),
            })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Account Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/accounts/:marketplace/auth-url - Start the OAuth connect flow
pub async fn get_auth_url(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let marketplace: Marketplace = marketplace.parse()?;
    let auth_url = state
        .accounts
        .get_auth_url(marketplace, user.org_id, user.user_id)?;
    Ok(Json(AuthUrlResponse { auth_url }))
}

/// GET /api/accounts/:marketplace/callback - Complete the OAuth connect flow
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let marketplace: Marketplace = marketplace.parse()?;
    let account = state
        .accounts
        .exchange_code(marketplace, &query.code, &query.state, user.org_id, user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// POST /api/accounts/:id/refresh - Refresh an account's tokens on demand
pub async fn refresh_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .accounts
        .refresh_tokens(AccountId::from_uuid(account_id), user.org_id, user.user_id)
        .await?;
    Ok(Json(AccountResponse::from(&account)))
}

/// DELETE /api/accounts/:id - Disconnect an account
pub async fn revoke_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .accounts
        .revoke_account(AccountId::from_uuid(account_id), user.org_id, user.user_id)
        .await?;
    Ok(Json(AccountResponse::from(&account)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Listing Job Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/listings/publish - Enqueue a publish job
pub async fn publish_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<PublishListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = PublishJob {
        item_id: parse_id::<ItemId>("item_id", &request.item_id)?,
        account_id: parse_id::<AccountId>("account_id", &request.account_id)?,
        org_id: user.org_id,
        user_id: Some(user.user_id),
        auto_published: false,
    };
    state.queue.enqueue_publish(job).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse::ok())))
}

/// POST /api/listings/sync - Enqueue a sync job for one listing
pub async fn sync_listing(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<SyncListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = SyncJob::Listing {
        listing_id: parse_id::<ListingId>("listing_id", &request.listing_id)?,
        account_id: parse_id::<AccountId>("account_id", &request.account_id)?,
    };
    state.queue.enqueue_sync(job).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse::ok())))
}

/// POST /api/listings/sync-stale - Enqueue a sync of the org's stale listings
pub async fn sync_stale_listings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<SyncStaleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = SyncJob::AllStale {
        org_id: Some(user.org_id),
        stale_after: Duration::from_secs(request.stale_after_secs),
    };
    state.queue.enqueue_sync(job).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse::ok())))
}

// ════════════════════════════════════════════════════════════════════════════════
// Audit Log Handler
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/audit - Query the caller org's audit log
pub async fn get_audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = AuditQuery::for_org(user.org_id);

    if let Some(account_id) = &query.account_id {
        filter = filter.with_account(parse_id::<AccountId>("account_id", account_id)?);
    }
    if let Some(event_type) = &query.event_type {
        filter = filter.with_event_type(parse_event_type(event_type)?);
    }
    if let Some(limit) = query.limit {
        filter.limit = limit.clamp(1, 200);
    }
    if let Some(offset) = query.offset {
        filter.offset = offset.max(0);
    }

    let records = state.auditor.query(filter).await?;
    Ok(Json(AuditLogResponse {
        records: records.into_iter().map(AuditRecordResponse::from).collect(),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handlers (no auth, verified via signature)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/:marketplace - Receive a webhook delivery
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let marketplace: Marketplace = marketplace
        .parse()
        .map_err(|_: UnknownMarketplace| WebhookApiError::unknown_marketplace(&marketplace))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.handle(marketplace, &body, signature).await?;
    Ok(Json(outcome))
}

/// GET /webhooks/:marketplace - Answer an endpoint-verification challenge
pub async fn webhook_challenge(
    State(state): State<AppState>,
    Path(marketplace): Path<String>,
    Query(query): Query<ChallengeQuery>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let marketplace: Marketplace = marketplace
        .parse()
        .map_err(|_: UnknownMarketplace| WebhookApiError::unknown_marketplace(&marketplace))?;

    let endpoint_url = state.webhook_endpoint_url(marketplace);
    let challenge_response =
        state
            .webhooks
            .challenge_response(marketplace, &query.challenge_code, &endpoint_url)?;
    Ok(Json(ChallengeResponse { challenge_response }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

fn parse_id<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ApiError> {
    value.parse().map_err(|_| {
        ApiError(DomainError::new(
            ErrorCode::InvalidFormat,
            format!("{field} is not a valid id"),
        ))
    })
}

fn parse_event_type(value: &str) -> Result<AuditEventType, ApiError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        ApiError(DomainError::new(
            ErrorCode::InvalidFormat,
            format!("Unknown event type: {value}"),
        ))
    })
}

/// API error type that converts domain errors to HTTP responses.
pub struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<UnknownMarketplace> for ApiError {
    fn from(err: UnknownMarketplace) -> Self {
        Self(DomainError::new(ErrorCode::ValidationFailed, err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0.code {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidFormat
            | ErrorCode::StateVerificationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::CrossTenantMismatch => StatusCode::FORBIDDEN,
            ErrorCode::AccountNotFound
            | ErrorCode::ListingNotFound
            | ErrorCode::ItemNotFound
            | ErrorCode::MarketplaceNotConfigured => StatusCode::NOT_FOUND,
            ErrorCode::InvalidStateTransition
            | ErrorCode::ReconnectRequired
            | ErrorCode::AccountInactive => StatusCode::CONFLICT,
            ErrorCode::MarketplaceApiError | ErrorCode::TokenExchangeFailed => {
                StatusCode::BAD_GATEWAY
            }
            ErrorCode::EncryptionKeyMissing
            | ErrorCode::DatabaseError
            | ErrorCode::QueueError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ErrorResponse::new(self.0.code.to_string(), self.0.message);
        if !self.0.details.is_empty() {
            if let Ok(details) = serde_json::to_value(&self.0.details) {
                body = body.with_details(details);
            }
        }
        (status, Json(body)).into_response()
    }
}

/// Webhook error type with its own status mapping.
///
/// Verification failures are 4xx so the marketplace stops retrying a
/// delivery it signed wrong. Response bodies carry a fixed message per
/// status; which check failed stays in the logs, not in the reply to the
/// possibly hostile sender.
pub enum WebhookApiError {
    Route(WebhookRouteError),
    UnknownMarketplace(String),
}

impl WebhookApiError {
    fn unknown_marketplace(name: &str) -> Self {
        Self::UnknownMarketplace(name.to_string())
    }
}

impl From<WebhookRouteError> for WebhookApiError {
    fn from(err: WebhookRouteError) -> Self {
        Self::Route(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match &self {
            WebhookApiError::UnknownMarketplace(name) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_MARKETPLACE",
                format!("Unknown marketplace: {name}"),
            ),
            WebhookApiError::Route(err) => {
                tracing::warn!(error = %err, "Webhook request rejected");
                let (status, code, message) = match err {
                    WebhookRouteError::NotConfigured(_) => (
                        StatusCode::NOT_FOUND,
                        "WEBHOOK_NOT_CONFIGURED",
                        "No webhook endpoint is configured for this marketplace",
                    ),
                    WebhookRouteError::Verification(WebhookError::PayloadTooLarge) => (
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "PAYLOAD_TOO_LARGE",
                        "Webhook payload exceeds the size limit",
                    ),
                    WebhookRouteError::Verification(
                        WebhookError::MissingSignature | WebhookError::InvalidSignature,
                    ) => (
                        StatusCode::UNAUTHORIZED,
                        "INVALID_SIGNATURE",
                        "Webhook could not be verified",
                    ),
                    WebhookRouteError::Verification(
                        WebhookError::StaleTimestamp
                        | WebhookError::FutureTimestamp
                        | WebhookError::Duplicate
                        | WebhookError::ParseError(_),
                    ) => (
                        StatusCode::BAD_REQUEST,
                        "INVALID_PAYLOAD",
                        "Webhook was rejected",
                    ),
                };
                (status, code, message.to_string())
            }
        };

        let body = ErrorResponse::new(error_code, message);
        (status, Json(body)).into_response()
    }
}
