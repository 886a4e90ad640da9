//! Append-only audit records for lifecycle, token, and webhook events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::foundation::{AccountId, AuditRecordId, OrgId, UserId};

use super::account::Marketplace;

/// Default retention horizon for audit records (90 days).
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Closed set of auditable event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AccountConnected,
    AccountRefreshed,
    AccountRefreshFailed,
    AccountExpired,
    AccountRevoked,
    TokenExpiryWarning,
    WebhookReceived,
    WebhookRejected,
    ListingPublished,
    ListingPublishFailed,
    ListingSynced,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AccountConnected => "account_connected",
            AuditEventType::AccountRefreshed => "account_refreshed",
            AuditEventType::AccountRefreshFailed => "account_refresh_failed",
            AuditEventType::AccountExpired => "account_expired",
            AuditEventType::AccountRevoked => "account_revoked",
            AuditEventType::TokenExpiryWarning => "token_expiry_warning",
            AuditEventType::WebhookReceived => "webhook_received",
            AuditEventType::WebhookRejected => "webhook_rejected",
            AuditEventType::ListingPublished => "listing_published",
            AuditEventType::ListingPublishFailed => "listing_publish_failed",
            AuditEventType::ListingSynced => "listing_synced",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable audit record. Never updated; pruned only by retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    pub account_id: Option<AccountId>,
    pub marketplace: Option<Marketplace>,
    pub event_type: AuditEventType,
    pub message: String,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Creates a record with the required fields; optionals attach via the
    /// builder methods.
    pub fn new(org_id: OrgId, event_type: AuditEventType, message: impl Into<String>) -> Self {
        Self {
            id: AuditRecordId::new(),
            org_id,
            user_id: None,
            account_id: None,
            marketplace: None,
            event_type,
            message: message.into(),
            metadata: Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_account(mut self, account_id: AccountId, marketplace: Marketplace) -> Self {
        self.account_id = Some(account_id);
        self.marketplace = Some(marketplace);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_request_context(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Filter for querying audit records. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub org_id: Option<OrgId>,
    pub account_id: Option<AccountId>,
    pub user_id: Option<UserId>,
    pub marketplace: Option<Marketplace>,
    pub event_type: Option<AuditEventType>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQuery {
    /// Query scoped to one organization with default pagination (50 rows).
    pub fn for_org(org_id: OrgId) -> Self {
        Self {
            org_id: Some(org_id),
            limit: 50,
            ..Default::default()
        }
    }

    pub fn with_event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}
