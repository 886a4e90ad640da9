//! Integration tests for the marketplace account lifecycle.
//!
//! These tests exercise the public API end to end:
//! 1. Auth URL carries a signed state
//! 2. Callback verifies the state, exchanges the code, and stores encrypted
//!    credentials
//! 3. Refresh rotates tokens in place
//! 4. Revocation disconnects locally even when the marketplace refuses
//!
//! Uses in-memory implementations to test the flow without external
//! dependencies.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use marketsync::application::{AccountService, Auditor, MarketplaceRegistry};
use marketsync::domain::account::{AccountStatus, Marketplace, MarketplaceAccount};
use marketsync::domain::audit::{AuditEventType, AuditQuery, AuditRecord};
use marketsync::domain::crypto::{CredentialCipher, SignedStateCodec};
use marketsync::domain::foundation::{AccountId, DomainError, ErrorCode, OrgId, UserId};
use marketsync::ports::{
    AccountRepository, AuditSink, CredentialSink, LiveCredentials, MarketplaceClient,
    MarketplaceClientFactory, MarketplaceOAuthDriver, OAuthError, TokenGrant,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

/// In-memory account repository.
#[derive(Default)]
struct MemoryAccounts {
    rows: Mutex<HashMap<AccountId, MarketplaceAccount>>,
}

impl MemoryAccounts {
    fn get(&self, id: AccountId) -> Option<MarketplaceAccount> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn insert(&self, account: &MarketplaceAccount) -> Result<(), DomainError> {
        self.rows.lock().unwrap().insert(account.id, account.clone());
        Ok(())
    }

    async fn update(&self, account: &MarketplaceAccount) -> Result<(), DomainError> {
        self.rows.lock().unwrap().insert(account.id, account.clone());
        Ok(())
    }

    async fn reserve_refresh_attempt(
        &self,
        id: AccountId,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&id).and_then(|account| {
            if account.refresh_attempts_exhausted() {
                return None;
            }
            account.auto_refresh_attempts += 1;
            account.last_checked_at = Some(Utc::now());
            Some(account.clone())
        }))
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<MarketplaceAccount>, DomainError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_id_for_org(
        &self,
        id: AccountId,
        org_id: OrgId,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|a| a.org_id == org_id)
            .cloned())
    }

    async fn find_by_remote_identity(
        &self,
        org_id: OrgId,
        marketplace: Marketplace,
        remote_account_id: &str,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|a| {
                a.org_id == org_id
                    && a.marketplace == marketplace
                    && a.remote_account_id == remote_account_id
            })
            .cloned())
    }

    async fn find_active_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceAccount>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|a| {
                a.status == AccountStatus::Active
                    && a.token_expires_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect())
    }
}

/// In-memory audit sink.
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    fn events(&self) -> Vec<AuditEventType> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.event_type)
            .collect()
    }

    fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn log(&self, record: AuditRecord) -> Result<(), DomainError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, DomainError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.org_id.is_none_or(|org| r.org_id == org))
            .cloned()
            .collect())
    }

    async fn prune_before(&self, _horizon: DateTime<Utc>) -> Result<u64, DomainError> {
        Ok(0)
    }
}

/// Driver granting fixed tokens, with a switch to refuse remote revocation.
struct StubDriver {
    access_token: String,
    refuse_revoke: bool,
    revoke_called: AtomicBool,
}

impl StubDriver {
    fn granting(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            refuse_revoke: false,
            revoke_called: AtomicBool::new(false),
        }
    }

    fn refusing_revoke() -> Self {
        Self {
            refuse_revoke: true,
            ..Self::granting("access-1")
        }
    }
}

#[async_trait]
impl MarketplaceOAuthDriver for StubDriver {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    fn auth_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(format!("https://auth.example/authorize?state={state}"))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, OAuthError> {
        Ok(TokenGrant {
            access_token: self.access_token.clone(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(2)),
            remote_account_id: "seller-42".to_string(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        Ok(TokenGrant {
            access_token: "access-rotated".to_string(),
            refresh_token: Some("refresh-rotated".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(2)),
            remote_account_id: "seller-42".to_string(),
        })
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), OAuthError> {
        self.revoke_called.store(true, Ordering::SeqCst);
        if self.refuse_revoke {
            Err(OAuthError::RevocationFailed("remote says no".to_string()))
        } else {
            Ok(())
        }
    }
}

struct NullClient;

#[async_trait]
impl MarketplaceClient for NullClient {
    async fn publish_listing(
        &self,
        _listing: &marketsync::domain::listing::CanonicalListing,
    ) -> Result<marketsync::ports::RemoteListing, marketsync::ports::MarketplaceApiError> {
        unimplemented!("not exercised by these tests")
    }

    async fn listing_status(
        &self,
        _remote_listing_id: &str,
    ) -> Result<marketsync::domain::listing::ListingStatus, marketsync::ports::MarketplaceApiError>
    {
        unimplemented!("not exercised by these tests")
    }
}

struct NullFactory;

impl MarketplaceClientFactory for NullFactory {
    fn client(
        &self,
        _credentials: LiveCredentials,
        _sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient> {
        Arc::new(NullClient)
    }
}

// =============================================================================
// Fixture
// =============================================================================

struct Fixture {
    accounts: Arc<MemoryAccounts>,
    sink: Arc<MemorySink>,
    cipher: Arc<CredentialCipher>,
    service: AccountService,
}

fn fixture_with_driver(driver: StubDriver) -> Fixture {
    let accounts = Arc::new(MemoryAccounts::default());
    let sink = Arc::new(MemorySink::default());
    let cipher = Arc::new(
        CredentialCipher::new(&SecretString::new(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
        .unwrap(),
    );
    let codec = Arc::new(SignedStateCodec::new(SecretString::new(
        "integration-state-secret".to_string(),
    )));

    let mut registry = MarketplaceRegistry::new();
    registry.register(Marketplace::Ebay, Arc::new(driver), Arc::new(NullFactory));

    let service = AccountService::new(
        accounts.clone(),
        Arc::new(registry),
        cipher.clone(),
        codec,
        Auditor::new(sink.clone()),
    );

    Fixture {
        accounts,
        sink,
        cipher,
        service,
    }
}

fn fixture() -> Fixture {
    fixture_with_driver(StubDriver::granting("access-1"))
}

fn state_from_auth_url(url: &str) -> String {
    url.split("state=").nth(1).unwrap().to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn full_connect_flow_stores_encrypted_credentials() {
    let f = fixture();
    let org = OrgId::new();
    let user = UserId::new();

    let url = f
        .service
        .get_auth_url(Marketplace::Ebay, org, user)
        .unwrap();
    let state = state_from_auth_url(&url);

    let account = f
        .service
        .exchange_code(Marketplace::Ebay, "the-code", &state, org, user)
        .await
        .unwrap();

    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.remote_account_id, "seller-42");

    // Stored ciphertext decrypts back to the granted tokens and is not the
    // plaintext itself.
    let stored = f.accounts.get(account.id).unwrap();
    assert_ne!(stored.encrypted_access_token, "access-1");
    assert_eq!(f.cipher.decrypt(&stored.encrypted_access_token).unwrap(), "access-1");

    assert!(f.sink.events().contains(&AuditEventType::AccountConnected));
    let record = &f.sink.records()[0];
    assert_eq!(record.user_id, Some(user));
}

#[tokio::test]
async fn reconnecting_the_same_remote_identity_updates_in_place() {
    let f = fixture();
    let org = OrgId::new();
    let user = UserId::new();

    for _ in 0..2 {
        let url = f
            .service
            .get_auth_url(Marketplace::Ebay, org, user)
            .unwrap();
        let state = state_from_auth_url(&url);
        f.service
            .exchange_code(Marketplace::Ebay, "the-code", &state, org, user)
            .await
            .unwrap();
    }

    assert_eq!(f.accounts.count(), 1);
}

#[tokio::test]
async fn state_issued_for_another_caller_is_rejected() {
    let f = fixture();
    let org = OrgId::new();
    let user = UserId::new();

    let url = f
        .service
        .get_auth_url(Marketplace::Ebay, org, user)
        .unwrap();
    let state = state_from_auth_url(&url);

    let err = f
        .service
        .exchange_code(Marketplace::Ebay, "the-code", &state, OrgId::new(), user)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CrossTenantMismatch);
    assert_eq!(f.accounts.count(), 0);
}

#[tokio::test]
async fn tampered_state_is_rejected() {
    let f = fixture();
    let org = OrgId::new();
    let user = UserId::new();

    let url = f
        .service
        .get_auth_url(Marketplace::Ebay, org, user)
        .unwrap();
    let mut state = state_from_auth_url(&url);
    state.push('0');

    let err = f
        .service
        .exchange_code(Marketplace::Ebay, "the-code", &state, org, user)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StateVerificationFailed);
}

#[tokio::test]
async fn refresh_rotates_stored_tokens() {
    let f = fixture();
    let org = OrgId::new();
    let user = UserId::new();

    let url = f
        .service
        .get_auth_url(Marketplace::Ebay, org, user)
        .unwrap();
    let state = state_from_auth_url(&url);
    let account = f
        .service
        .exchange_code(Marketplace::Ebay, "the-code", &state, org, user)
        .await
        .unwrap();

    f.service.refresh_tokens(account.id, org, user).await.unwrap();

    let stored = f.accounts.get(account.id).unwrap();
    assert_eq!(
        f.cipher.decrypt(&stored.encrypted_access_token).unwrap(),
        "access-rotated"
    );
    assert_eq!(stored.status, AccountStatus::Active);
    assert!(f.sink.events().contains(&AuditEventType::AccountRefreshed));
}

#[tokio::test]
async fn revocation_disconnects_locally_when_remote_refuses() {
    let f = fixture_with_driver(StubDriver::refusing_revoke());
    let org = OrgId::new();
    let user = UserId::new();

    let url = f
        .service
        .get_auth_url(Marketplace::Ebay, org, user)
        .unwrap();
    let state = state_from_auth_url(&url);
    let account = f
        .service
        .exchange_code(Marketplace::Ebay, "the-code", &state, org, user)
        .await
        .unwrap();

    let revoked = f.service.revoke_account(account.id, org, user).await.unwrap();
    assert_eq!(revoked.status, AccountStatus::Revoked);

    let record = f
        .sink
        .records()
        .into_iter()
        .find(|r| r.event_type == AuditEventType::AccountRevoked)
        .unwrap();
    assert_eq!(record.user_id, Some(user));
}

#[tokio::test]
async fn unconfigured_marketplace_is_rejected_up_front() {
    let f = fixture();
    let err = f
        .service
        .get_auth_url(Marketplace::Amazon, OrgId::new(), UserId::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MarketplaceNotConfigured);
}
