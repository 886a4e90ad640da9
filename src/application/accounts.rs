//! AccountService - the marketplace account lifecycle.
//!
//! Drives authorize -> exchange -> refresh -> revoke per marketplace and
//! owns account status transitions. Marketplace differences live behind
//! [`MarketplaceOAuthDriver`]; this service selects a driver by the
//! account's marketplace field and never branches on it otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::domain::account::{Marketplace, MarketplaceAccount};
use crate::domain::audit::{AuditEventType, AuditRecord};
use crate::domain::crypto::{CredentialCipher, SignedStateCodec};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, OrgId, UserId};
use crate::ports::{
    AccountRepository, CredentialSink, LiveCredentials, MarketplaceClient,
    MarketplaceClientFactory, MarketplaceOAuthDriver, OAuthError, TokenGrant,
};

use super::audit::Auditor;

/// Lookup table of marketplace implementations, selected by the account's
/// marketplace field.
#[derive(Default)]
pub struct MarketplaceRegistry {
    drivers: HashMap<Marketplace, Arc<dyn MarketplaceOAuthDriver>>,
    factories: HashMap<Marketplace, Arc<dyn MarketplaceClientFactory>>,
}

impl MarketplaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a marketplace's driver and client factory.
    pub fn register(
        &mut self,
        marketplace: Marketplace,
        driver: Arc<dyn MarketplaceOAuthDriver>,
        factory: Arc<dyn MarketplaceClientFactory>,
    ) {
        self.drivers.insert(marketplace, driver);
        self.factories.insert(marketplace, factory);
    }

    /// True when a driver is registered for the marketplace.
    pub fn has(&self, marketplace: Marketplace) -> bool {
        self.drivers.contains_key(&marketplace)
    }

    fn driver(
        &self,
        marketplace: Marketplace,
    ) -> Result<&Arc<dyn MarketplaceOAuthDriver>, DomainError> {
        self.drivers.get(&marketplace).ok_or_else(|| {
            DomainError::new(
                ErrorCode::MarketplaceNotConfigured,
                format!("Marketplace {marketplace} is not configured"),
            )
        })
    }

    fn factory(
        &self,
        marketplace: Marketplace,
    ) -> Result<&Arc<dyn MarketplaceClientFactory>, DomainError> {
        self.factories.get(&marketplace).ok_or_else(|| {
            DomainError::new(
                ErrorCode::MarketplaceNotConfigured,
                format!("Marketplace {marketplace} is not configured"),
            )
        })
    }
}

/// Orchestrates the OAuth lifecycle of marketplace accounts.
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    registry: Arc<MarketplaceRegistry>,
    cipher: Arc<CredentialCipher>,
    state_codec: Arc<SignedStateCodec>,
    auditor: Auditor,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        registry: Arc<MarketplaceRegistry>,
        cipher: Arc<CredentialCipher>,
        state_codec: Arc<SignedStateCodec>,
        auditor: Auditor,
    ) -> Self {
        Self {
            accounts,
            registry,
            cipher,
            state_codec,
            auditor,
        }
    }

    /// Builds a marketplace authorize URL embedding a freshly signed state.
    ///
    /// # Errors
    ///
    /// Fails when the marketplace's app credentials are not configured.
    pub fn get_auth_url(
        &self,
        marketplace: Marketplace,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<String, DomainError> {
        let driver = self.registry.driver(marketplace)?;
        let state = self.state_codec.create_signed_state(org_id, user_id);
        driver.auth_url(&state).map_err(map_oauth_error)
    }

    /// Completes the OAuth flow: verifies the state, asserts it was issued
    /// for the calling org/user, exchanges the code, and upserts an
    /// encrypted credential row keyed by (org, marketplace, remote identity).
    pub async fn exchange_code(
        &self,
        marketplace: Marketplace,
        code: &str,
        state: &str,
        caller_org: OrgId,
        caller_user: UserId,
    ) -> Result<MarketplaceAccount, DomainError> {
        let payload = self.state_codec.verify_signed_state(state).map_err(|e| {
            DomainError::new(ErrorCode::StateVerificationFailed, e.to_string())
        })?;

        // Cross-tenant code injection defense: the state must have been
        // issued for exactly this caller.
        if payload.org_id != caller_org || payload.user_id != caller_user {
            return Err(DomainError::new(
                ErrorCode::CrossTenantMismatch,
                "OAuth state was issued for a different caller",
            ));
        }

        let driver = self.registry.driver(marketplace)?;
        let grant = driver.exchange_code(code).await.map_err(map_oauth_error)?;

        let account = self
            .upsert_from_grant(marketplace, caller_org, caller_user, grant)
            .await?;

        self.auditor
            .record(
                AuditRecord::new(
                    caller_org,
                    AuditEventType::AccountConnected,
                    format!("Connected {marketplace} account"),
                )
                .with_user(caller_user)
                .with_account(account.id, marketplace)
                .with_metadata(json!({ "remote_account_id": account.remote_account_id })),
            )
            .await;

        Ok(account)
    }

    /// Loads an account, decrypts its credentials, and constructs an
    /// authenticated marketplace client. The client reports any token
    /// rotation it performs through a [`CredentialSink`] backed by this
    /// service's repository.
    pub async fn get_adapter(
        &self,
        account_id: AccountId,
    ) -> Result<Arc<dyn MarketplaceClient>, DomainError> {
        let account = self.load(account_id).await?;
        self.adapter_for(account)
    }

    /// Organization-scoped variant of [`get_adapter`](Self::get_adapter).
    pub async fn get_adapter_for_org(
        &self,
        account_id: AccountId,
        org_id: OrgId,
    ) -> Result<Arc<dyn MarketplaceClient>, DomainError> {
        let account = self.load_for_org(account_id, org_id).await?;
        self.adapter_for(account)
    }

    /// Refreshes tokens on user request.
    ///
    /// # Errors
    ///
    /// `ReconnectRequired` when no refresh token exists, or when the
    /// marketplace rejects the refresh, in which case the account is
    /// flipped to `Expired` first.
    pub async fn refresh_tokens(
        &self,
        account_id: AccountId,
        org_id: OrgId,
        initiated_by: UserId,
    ) -> Result<MarketplaceAccount, DomainError> {
        let mut account = self.load_for_org(account_id, org_id).await?;

        match self.perform_refresh(&mut account).await {
            Ok(()) => {
                self.auditor
                    .record(
                        AuditRecord::new(
                            org_id,
                            AuditEventType::AccountRefreshed,
                            format!("Refreshed {} tokens", account.marketplace),
                        )
                        .with_user(initiated_by)
                        .with_account(account.id, account.marketplace),
                    )
                    .await;
                Ok(account)
            }
            Err(e) if e.code == ErrorCode::ReconnectRequired => Err(e),
            Err(e) => {
                // Upstream rejected the refresh: the credential is dead.
                account.mark_expired()?;
                self.accounts.update(&account).await?;
                self.auditor
                    .record(
                        AuditRecord::new(
                            org_id,
                            AuditEventType::AccountRefreshFailed,
                            format!("Token refresh failed: {}", e.message),
                        )
                        .with_user(initiated_by)
                        .with_account(account.id, account.marketplace),
                    )
                    .await;
                Err(DomainError::reconnect_required(
                    account.id,
                    account.marketplace,
                    "Token refresh was rejected; reconnect the account",
                ))
            }
        }
    }

    /// Refreshes an account's tokens in place and persists the rotation.
    ///
    /// Does not change status on failure; callers (manual refresh, monitor)
    /// apply their own policies. Fails with `ReconnectRequired` when the
    /// account has no refresh token.
    pub async fn perform_refresh(
        &self,
        account: &mut MarketplaceAccount,
    ) -> Result<(), DomainError> {
        let encrypted_refresh = account.encrypted_refresh_token.as_ref().ok_or_else(|| {
            DomainError::reconnect_required(
                account.id,
                account.marketplace,
                "Account has no refresh token; reconnect required",
            )
        })?;

        let refresh_token = self
            .cipher
            .decrypt(encrypted_refresh)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let driver = self.registry.driver(account.marketplace)?;
        let grant = driver
            .refresh(&refresh_token)
            .await
            .map_err(map_oauth_error)?;

        self.apply_grant(account, grant)?;
        self.accounts.update(account).await
    }

    /// Disconnects an account. Remote revocation is attempted best-effort;
    /// the local status flip to `Revoked` happens regardless of the remote
    /// outcome.
    pub async fn revoke_account(
        &self,
        account_id: AccountId,
        org_id: OrgId,
        initiated_by: UserId,
    ) -> Result<MarketplaceAccount, DomainError> {
        let mut account = self.load_for_org(account_id, org_id).await?;

        match self.try_remote_revoke(&account).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    marketplace = %account.marketplace,
                    error = %e,
                    "Remote revocation failed; revoking locally anyway"
                );
            }
        }

        account.mark_revoked();
        self.accounts.update(&account).await?;

        self.auditor
            .record(
                AuditRecord::new(
                    org_id,
                    AuditEventType::AccountRevoked,
                    format!("Disconnected {} account", account.marketplace),
                )
                .with_user(initiated_by)
                .with_account(account.id, account.marketplace),
            )
            .await;

        Ok(account)
    }

    async fn try_remote_revoke(&self, account: &MarketplaceAccount) -> Result<(), DomainError> {
        let access_token = self
            .cipher
            .decrypt(&account.encrypted_access_token)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let driver = self.registry.driver(account.marketplace)?;
        driver.revoke(&access_token).await.map_err(map_oauth_error)
    }

    async fn upsert_from_grant(
        &self,
        marketplace: Marketplace,
        org_id: OrgId,
        user_id: UserId,
        grant: TokenGrant,
    ) -> Result<MarketplaceAccount, DomainError> {
        let existing = self
            .accounts
            .find_by_remote_identity(org_id, marketplace, &grant.remote_account_id)
            .await?;

        match existing {
            // An account is per remote identity, not per OAuth attempt:
            // overwrite tokens instead of creating a duplicate row.
            Some(mut account) => {
                self.apply_grant(&mut account, grant)?;
                self.accounts.update(&account).await?;
                Ok(account)
            }
            None => {
                let encrypted_access = self.encrypt(&grant.access_token)?;
                let encrypted_refresh = grant
                    .refresh_token
                    .as_deref()
                    .map(|t| self.encrypt(t))
                    .transpose()?;
                let account = MarketplaceAccount::connect(
                    org_id,
                    user_id,
                    marketplace,
                    encrypted_access,
                    encrypted_refresh,
                    grant.expires_at,
                    grant.remote_account_id,
                );
                self.accounts.insert(&account).await?;
                Ok(account)
            }
        }
    }

    fn apply_grant(
        &self,
        account: &mut MarketplaceAccount,
        grant: TokenGrant,
    ) -> Result<(), DomainError> {
        let encrypted_access = self.encrypt(&grant.access_token)?;
        let encrypted_refresh = grant
            .refresh_token
            .as_deref()
            .map(|t| self.encrypt(t))
            .transpose()?;
        account.rotate_tokens(encrypted_access, encrypted_refresh, grant.expires_at);
        Ok(())
    }

    fn encrypt(&self, token: &str) -> Result<String, DomainError> {
        self.cipher
            .encrypt(token)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))
    }

    fn adapter_for(
        &self,
        account: MarketplaceAccount,
    ) -> Result<Arc<dyn MarketplaceClient>, DomainError> {
        if !account.is_active() {
            return Err(DomainError::new(
                ErrorCode::AccountInactive,
                format!("Account is {}", account.status),
            )
            .with_detail("account_id", account.id.to_string()));
        }

        let access_token = self
            .cipher
            .decrypt(&account.encrypted_access_token)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let refresh_token = account
            .encrypted_refresh_token
            .as_deref()
            .map(|t| self.cipher.decrypt(t))
            .transpose()
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let factory = self.registry.factory(account.marketplace)?;
        let sink = Arc::new(AccountCredentialSink {
            accounts: self.accounts.clone(),
            cipher: self.cipher.clone(),
        });

        Ok(factory.client(
            LiveCredentials {
                account_id: account.id,
                access_token,
                refresh_token,
            },
            sink,
        ))
    }

    async fn load(&self, account_id: AccountId) -> Result<MarketplaceAccount, DomainError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))
    }

    async fn load_for_org(
        &self,
        account_id: AccountId,
        org_id: OrgId,
    ) -> Result<MarketplaceAccount, DomainError> {
        self.accounts
            .find_by_id_for_org(account_id, org_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))
    }
}

/// Persistence path for client-initiated token rotations: re-encrypts the
/// grant and writes it back to the account row.
struct AccountCredentialSink {
    accounts: Arc<dyn AccountRepository>,
    cipher: Arc<CredentialCipher>,
}

#[async_trait::async_trait]
impl CredentialSink for AccountCredentialSink {
    async fn persist_rotated(
        &self,
        account_id: AccountId,
        grant: TokenGrant,
    ) -> Result<(), DomainError> {
        let mut account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))?;

        let encrypted_access = self
            .cipher
            .encrypt(&grant.access_token)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let encrypted_refresh = grant
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        account.rotate_tokens(encrypted_access, encrypted_refresh, grant.expires_at);
        self.accounts.update(&account).await
    }
}

fn map_oauth_error(e: OAuthError) -> DomainError {
    match e {
        OAuthError::NotConfigured(m) => DomainError::new(
            ErrorCode::MarketplaceNotConfigured,
            format!("Marketplace {m} credentials are not configured"),
        ),
        OAuthError::ExchangeRejected(msg) => {
            DomainError::new(ErrorCode::TokenExchangeFailed, msg)
        }
        OAuthError::RefreshRejected(msg) => {
            DomainError::new(ErrorCode::TokenExchangeFailed, msg)
        }
        OAuthError::RevocationFailed(msg) | OAuthError::Network(msg) => {
            DomainError::new(ErrorCode::MarketplaceApiError, msg)
        }
    }
}
