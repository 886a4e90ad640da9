//! MarketplaceOAuthDriver port - the per-marketplace OAuth capability.
//!
//! One implementation per marketplace replaces scattered if/else branching:
//! the lifecycle service selects a driver by the account's marketplace field
//! and calls through this interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::account::Marketplace;
use crate::domain::foundation::AccountId;

/// Tokens returned by an exchange or refresh. Transient: plaintext tokens
/// live only long enough to be encrypted or handed to a client.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// None means the token does not expire.
    pub expires_at: Option<DateTime<Utc>>,
    /// The marketplace's identifier for the authorized identity.
    pub remote_account_id: String,
}

/// Errors from marketplace OAuth operations.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Marketplace {0} credentials are not configured")]
    NotConfigured(Marketplace),

    #[error("Token exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Remote revocation failed: {0}")]
    RevocationFailed(String),

    #[error("Marketplace request failed: {0}")]
    Network(String),
}

/// Per-marketplace OAuth driver: authorize URL, code exchange, refresh,
/// revoke.
#[async_trait]
pub trait MarketplaceOAuthDriver: Send + Sync {
    /// Which marketplace this driver serves.
    fn marketplace(&self) -> Marketplace;

    /// Builds the marketplace-hosted authorize URL embedding the signed
    /// state.
    ///
    /// # Errors
    ///
    /// Fails with `NotConfigured` when app credentials are absent.
    fn auth_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError>;

    /// Refreshes tokens using a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError>;

    /// Revokes the access token remotely. Callers treat failure as
    /// non-fatal; local revocation never depends on this call.
    async fn revoke(&self, access_token: &str) -> Result<(), OAuthError>;
}

/// Sink through which marketplace clients persist rotated tokens.
///
/// Clients that refresh credentials mid-call report the new grant here;
/// this is the only path by which client-initiated rotations reach storage.
#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn persist_rotated(
        &self,
        account_id: AccountId,
        grant: TokenGrant,
    ) -> Result<(), crate::domain::foundation::DomainError>;
}
