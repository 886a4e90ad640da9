//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,
    InvalidFormat,

    // Not found errors
    AccountNotFound,
    ListingNotFound,
    ItemNotFound,

    // State / security errors
    InvalidStateTransition,
    StateVerificationFailed,
    CrossTenantMismatch,
    ReconnectRequired,
    AccountInactive,

    // Configuration errors
    MarketplaceNotConfigured,
    EncryptionKeyMissing,

    // Upstream errors
    MarketplaceApiError,
    TokenExchangeFailed,

    // Infrastructure errors
    DatabaseError,
    QueueError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::ListingNotFound => "LISTING_NOT_FOUND",
            ErrorCode::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::StateVerificationFailed => "STATE_VERIFICATION_FAILED",
            ErrorCode::CrossTenantMismatch => "CROSS_TENANT_MISMATCH",
            ErrorCode::ReconnectRequired => "RECONNECT_REQUIRED",
            ErrorCode::AccountInactive => "ACCOUNT_INACTIVE",
            ErrorCode::MarketplaceNotConfigured => "MARKETPLACE_NOT_CONFIGURED",
            ErrorCode::EncryptionKeyMissing => "ENCRYPTION_KEY_MISSING",
            ErrorCode::MarketplaceApiError => "MARKETPLACE_API_ERROR",
            ErrorCode::TokenExchangeFailed => "TOKEN_EXCHANGE_FAILED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::QueueError => "QUEUE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a database error from an underlying failure.
    pub fn database(message: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, message.to_string())
    }

    /// Creates a reconnect-required error for an account.
    ///
    /// Carries the account id and marketplace so callers can drive a
    /// "reconnect your account" affordance.
    pub fn reconnect_required(
        account_id: impl fmt::Display,
        marketplace: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCode::ReconnectRequired, message)
            .with_detail("account_id", account_id.to_string())
            .with_detail("marketplace", marketplace.to_string())
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// True when the error signals the user must re-run the OAuth flow.
    pub fn is_reconnect_required(&self) -> bool {
        self.code == ErrorCode::ReconnectRequired
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::AccountNotFound, "Account not found");
        assert_eq!(format!("{}", err), "[ACCOUNT_NOT_FOUND] Account not found");
    }

    #[test]
    fn domain_error_with_detail_adds_detail() {
        let err = DomainError::new(ErrorCode::ValidationFailed, "Validation failed")
            .with_detail("field", "remote_account_id");

        assert_eq!(
            err.details.get("field"),
            Some(&"remote_account_id".to_string())
        );
    }

    #[test]
    fn reconnect_required_carries_account_context() {
        let err = DomainError::reconnect_required("acct-1", "ebay", "Refresh failed");
        assert!(err.is_reconnect_required());
        assert_eq!(err.details.get("account_id"), Some(&"acct-1".to_string()));
        assert_eq!(err.details.get("marketplace"), Some(&"ebay".to_string()));
    }
}
