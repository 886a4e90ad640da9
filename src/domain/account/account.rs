//! MarketplaceAccount aggregate: one stored OAuth credential binding an
//! organization to a marketplace identity.
//!
//! Tokens are stored encrypted only; the aggregate never sees plaintext.
//! Rows are never hard-deleted (audit requirement); revocation flips status.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, OrgId, UserId};

use super::Marketplace;

/// Hard cap on automatic refresh attempts before the monitor force-expires
/// an account.
pub const MAX_AUTO_REFRESH_ATTEMPTS: i32 = 3;

/// Lifecycle status of a stored marketplace account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Credentials are usable.
    Active,
    /// Tokens expired or refresh failed; a fresh OAuth exchange is required.
    Expired,
    /// Explicitly disconnected. Terminal.
    Revoked,
    /// Marked broken by an explicit operator/handler action. Reserved;
    /// transient upstream failures never set this automatically.
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Expired => "expired",
            AccountStatus::Revoked => "revoked",
            AccountStatus::Error => "error",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored OAuth credential binding one organization to one marketplace
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceAccount {
    pub id: AccountId,
    pub org_id: OrgId,
    /// User who connected the account.
    pub user_id: UserId,
    pub marketplace: Marketplace,
    /// AES-256-GCM ciphertext, base64-encoded.
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: Option<String>,
    /// None means the token does not expire.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// The marketplace's own identifier for the connected identity.
    pub remote_account_id: String,
    pub status: AccountStatus,
    /// Opaque marketplace-specific settings.
    pub settings: serde_json::Value,
    pub auto_refresh_attempts: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarketplaceAccount {
    /// Creates a new active account from a successful OAuth exchange.
    pub fn connect(
        org_id: OrgId,
        user_id: UserId,
        marketplace: Marketplace,
        encrypted_access_token: String,
        encrypted_refresh_token: Option<String>,
        token_expires_at: Option<DateTime<Utc>>,
        remote_account_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            org_id,
            user_id,
            marketplace,
            encrypted_access_token,
            encrypted_refresh_token,
            token_expires_at,
            remote_account_id,
            status: AccountStatus::Active,
            settings: serde_json::Value::Object(Default::default()),
            auto_refresh_attempts: 0,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the account can be used to obtain a live adapter.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Hours until the access token expires; None for non-expiring tokens.
    pub fn hours_until_expiry(&self, now: DateTime<Utc>) -> Option<f64> {
        self.token_expires_at
            .map(|at| (at - now).num_seconds() as f64 / 3600.0)
    }

    /// Replaces tokens after a successful exchange or refresh and returns the
    /// account to `Active`. Resets the auto-refresh attempt counter.
    pub fn rotate_tokens(
        &mut self,
        encrypted_access_token: String,
        encrypted_refresh_token: Option<String>,
        token_expires_at: Option<DateTime<Utc>>,
    ) {
        self.encrypted_access_token = encrypted_access_token;
        if encrypted_refresh_token.is_some() {
            // Some marketplaces omit the refresh token on rotation; keep the old one.
            self.encrypted_refresh_token = encrypted_refresh_token;
        }
        self.token_expires_at = token_expires_at;
        self.status = AccountStatus::Active;
        self.auto_refresh_attempts = 0;
        self.updated_at = Utc::now();
    }

    /// Marks the account expired (refresh failure or monitor sweep).
    ///
    /// # Errors
    ///
    /// Rejects the transition from `Revoked`; revocation is terminal.
    pub fn mark_expired(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Revoked {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot expire a revoked account",
            ));
        }
        self.status = AccountStatus::Expired;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the account revoked. Idempotent: revoking twice is a no-op.
    pub fn mark_revoked(&mut self) {
        if self.status != AccountStatus::Revoked {
            self.status = AccountStatus::Revoked;
            self.updated_at = Utc::now();
        }
    }

    /// Marks the account broken. Explicit callers only.
    pub fn mark_error(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Revoked {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot mark a revoked account as errored",
            ));
        }
        self.status = AccountStatus::Error;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Increments the auto-refresh attempt counter. Called before a refresh
    /// attempt so a crash mid-refresh still counts toward the cap.
    pub fn record_refresh_attempt(&mut self) {
        self.auto_refresh_attempts += 1;
        self.updated_at = Utc::now();
    }

    /// True when the monitor has exhausted the refresh budget.
    pub fn refresh_attempts_exhausted(&self) -> bool {
        self.auto_refresh_attempts >= MAX_AUTO_REFRESH_ATTEMPTS
    }

    /// Stamps the monitor's last-checked marker.
    pub fn touch_checked(&mut self, now: DateTime<Utc>) {
        self.last_checked_at = Some(now);
        self.updated_at = now;
    }

    /// True when the token expires within the given window.
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(at) => at <= now + window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account() -> MarketplaceAccount {
        MarketplaceAccount::connect(
            OrgId::new(),
            UserId::new(),
            Marketplace::Ebay,
            "ciphertext-access".to_string(),
            Some("ciphertext-refresh".to_string()),
            Some(Utc::now() + Duration::hours(2)),
            "ebay-user-1".to_string(),
        )
    }

    #[test]
    fn connect_creates_active_account() {
        let account = test_account();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.auto_refresh_attempts, 0);
        assert!(account.is_active());
    }

    #[test]
    fn rotate_tokens_resets_attempts_and_reactivates() {
        let mut account = test_account();
        account.record_refresh_attempt();
        account.mark_expired().unwrap();

        account.rotate_tokens(
            "new-ciphertext".to_string(),
            None,
            Some(Utc::now() + Duration::hours(2)),
        );

        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.auto_refresh_attempts, 0);
        assert_eq!(account.encrypted_access_token, "new-ciphertext");
        // Refresh token preserved when the rotation omits one.
        assert_eq!(
            account.encrypted_refresh_token.as_deref(),
            Some("ciphertext-refresh")
        );
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut account = test_account();
        account.mark_revoked();
        let updated = account.updated_at;
        account.mark_revoked();
        assert_eq!(account.status, AccountStatus::Revoked);
        assert_eq!(account.updated_at, updated);
    }

    #[test]
    fn cannot_expire_revoked_account() {
        let mut account = test_account();
        account.mark_revoked();
        assert!(account.mark_expired().is_err());
    }

    #[test]
    fn refresh_attempts_exhausted_at_cap() {
        let mut account = test_account();
        for _ in 0..MAX_AUTO_REFRESH_ATTEMPTS {
            assert!(!account.refresh_attempts_exhausted() || account.auto_refresh_attempts >= 3);
            account.record_refresh_attempt();
        }
        assert!(account.refresh_attempts_exhausted());
    }

    #[test]
    fn expires_within_window() {
        let account = test_account();
        let now = Utc::now();
        assert!(account.expires_within(Duration::hours(24), now));
        assert!(!account.expires_within(Duration::minutes(30), now));
    }

    #[test]
    fn non_expiring_token_never_expires() {
        let mut account = test_account();
        account.token_expires_at = None;
        assert!(!account.expires_within(Duration::hours(24), Utc::now()));
        assert_eq!(account.hours_until_expiry(Utc::now()), None);
    }
}
