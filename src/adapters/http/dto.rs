//! HTTP DTOs (Data Transfer Objects) for the marketplace API.
//!
//! These types define the JSON request/response structure and serve as the
//! boundary between HTTP and the application layer. Account responses never
//! carry token material, encrypted or otherwise.

use serde::{Deserialize, Serialize};

use crate::domain::account::MarketplaceAccount;
use crate::domain::audit::AuditRecord;
use crate::domain::listing::Listing;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query parameters for the OAuth callback.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    /// Authorization code issued by the marketplace.
    pub code: String,
    /// Signed state round-tripped through the marketplace.
    pub state: String,
}

/// Request to enqueue a publish job for an item on a connected account.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishListingRequest {
    pub item_id: String,
    pub account_id: String,
}

/// Request to enqueue a sync job for one listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncListingRequest {
    pub listing_id: String,
    pub account_id: String,
}

/// Request to enqueue a sync of every stale listing in the caller's org.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncStaleRequest {
    /// Listings last synced longer ago than this are considered stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    3600
}

/// Query parameters for the audit log endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Query parameters for a marketplace endpoint-verification challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeQuery {
    pub challenge_code: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response carrying the marketplace authorize URL to redirect the user to.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

/// Public view of a connected account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub marketplace: String,
    pub status: String,
    pub remote_account_id: String,
    /// Null when the token does not expire (ISO 8601 otherwise).
    pub token_expires_at: Option<String>,
    pub created_at: String,
}

impl From<&MarketplaceAccount> for AccountResponse {
    fn from(account: &MarketplaceAccount) -> Self {
        Self {
            id: account.id.to_string(),
            marketplace: account.marketplace.as_str().to_string(),
            status: account.status.as_str().to_string(),
            remote_account_id: account.remote_account_id.clone(),
            token_expires_at: account.token_expires_at.map(|t| t.to_rfc3339()),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Public view of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub id: String,
    pub item_id: String,
    pub account_id: String,
    pub status: String,
    pub remote_listing_id: Option<String>,
    pub remote_url: Option<String>,
    pub error_message: Option<String>,
    pub last_synced_at: Option<String>,
}

impl From<&Listing> for ListingResponse {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.to_string(),
            item_id: listing.item_id.to_string(),
            account_id: listing.account_id.to_string(),
            status: listing.status.as_str().to_string(),
            remote_listing_id: listing.remote_listing_id.clone(),
            remote_url: listing.remote_url.clone(),
            error_message: listing.error_message.clone(),
            last_synced_at: listing.last_synced_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Acknowledgement that a job was accepted for background processing.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueuedResponse {
    pub enqueued: bool,
}

impl EnqueuedResponse {
    pub fn ok() -> Self {
        Self { enqueued: true }
    }
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecordResponse {
    pub id: String,
    pub event_type: String,
    pub message: String,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub marketplace: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

impl From<AuditRecord> for AuditRecordResponse {
    fn from(record: AuditRecord) -> Self {
        Self {
            id: record.id.to_string(),
            event_type: record.event_type.as_str().to_string(),
            message: record.message,
            user_id: record.user_id.map(|u| u.to_string()),
            account_id: record.account_id.map(|a| a.to_string()),
            marketplace: record.marketplace.map(|m| m.as_str().to_string()),
            metadata: record.metadata,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Audit log page.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogResponse {
    pub records: Vec<AuditRecordResponse>,
}

/// Response to a marketplace endpoint-verification challenge.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResponse {
    #[serde(rename = "challengeResponse")]
    pub challenge_response: String,
}

/// Standard error envelope for every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
