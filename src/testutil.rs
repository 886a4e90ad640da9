//! In-memory fakes and fixtures shared by unit tests across the
//! application layer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde_json::json;

use crate::domain::account::{AccountStatus, Marketplace, MarketplaceAccount};
use crate::domain::audit::{AuditEventType, AuditQuery, AuditRecord};
use crate::domain::crypto::{CredentialCipher, SignedStateCodec};
use crate::domain::foundation::{AccountId, DomainError, ItemId, ListingId, OrgId, UserId};
use crate::domain::listing::{
    CanonicalListing, ItemSnapshot, ItemStage, Listing, ListingStatus,
};
use crate::ports::{
    AccountRepository, AuditSink, CredentialSink, ExpiryNotifier, ItemStore, JobQueue,
    ListingRepository, LiveCredentials, MarketplaceApiError, MarketplaceClient,
    MarketplaceClientFactory, MarketplaceOAuthDriver, OAuthError, PublishJob, RemoteListing,
    SyncJob, TokenGrant, WebhookDedupStore,
};

pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new(&SecretString::new(
        "0123456789abcdef0123456789abcdef".to_string(),
    ))
    .unwrap()
}

pub fn test_codec() -> SignedStateCodec {
    SignedStateCodec::new(SecretString::new("state-signing-secret".to_string()))
}

// ---------------------------------------------------------------------------
// Accounts

#[derive(Default)]
pub struct FakeAccounts {
    rows: Mutex<HashMap<AccountId, MarketplaceAccount>>,
}

impl FakeAccounts {
    /// An active account with freshly encrypted tokens expiring in two hours.
    pub fn account(marketplace: Marketplace, cipher: &CredentialCipher) -> MarketplaceAccount {
        MarketplaceAccount::connect(
            OrgId::new(),
            UserId::new(),
            marketplace,
            cipher.encrypt("access-token").unwrap(),
            Some(cipher.encrypt("refresh-token").unwrap()),
            Some(Utc::now() + Duration::hours(2)),
            "remote-1".to_string(),
        )
    }

    pub async fn seed(&self, account: MarketplaceAccount) {
        self.rows.lock().unwrap().insert(account.id, account);
    }

    pub async fn get(&self, id: AccountId) -> Option<MarketplaceAccount> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountRepository for FakeAccounts {
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
        let mut accounts: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|a| {
                a.status == AccountStatus::Active
                    && a.token_expires_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.token_expires_at);
        Ok(accounts)
    }
}

// ---------------------------------------------------------------------------
// OAuth driver

enum DriverMode {
    Granting {
        access: String,
        refresh: Option<String>,
        remote: String,
    },
    RefusingRefresh,
    RefusingRevoke,
}

pub struct FakeDriver {
    mode: DriverMode,
}

impl FakeDriver {
    pub fn granting(access: &str, refresh: Option<&str>, remote: &str) -> Self {
        Self {
            mode: DriverMode::Granting {
                access: access.to_string(),
                refresh: refresh.map(str::to_string),
                remote: remote.to_string(),
            },
        }
    }

    pub fn refusing_refresh() -> Self {
        Self {
            mode: DriverMode::RefusingRefresh,
        }
    }

    pub fn refusing_revoke() -> Self {
        Self {
            mode: DriverMode::RefusingRevoke,
        }
    }

    fn grant(&self) -> Result<TokenGrant, OAuthError> {
        match &self.mode {
            DriverMode::Granting {
                access,
                refresh,
                remote,
            } => Ok(TokenGrant {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
                expires_at: Some(Utc::now() + Duration::hours(2)),
                remote_account_id: remote.clone(),
            }),
            DriverMode::RefusingRefresh => {
                Err(OAuthError::RefreshRejected("invalid_grant".to_string()))
            }
            DriverMode::RefusingRevoke => Ok(TokenGrant {
                access_token: "access".to_string(),
                refresh_token: None,
                expires_at: None,
                remote_account_id: "remote-1".to_string(),
            }),
        }
    }
}

#[async_trait]
impl MarketplaceOAuthDriver for FakeDriver {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    fn auth_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(format!("https://auth.example/authorize?state={state}"))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, OAuthError> {
        self.grant()
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        self.grant()
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), OAuthError> {
        match self.mode {
            DriverMode::RefusingRevoke => {
                Err(OAuthError::RevocationFailed("remote says no".to_string()))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Marketplace client

type PublishResult = Result<RemoteListing, MarketplaceApiError>;
type StatusResult = Result<ListingStatus, MarketplaceApiError>;

/// Client whose responses are scripted per call, FIFO. An exhausted script
/// falls back to a generic success.
#[derive(Default)]
pub struct ScriptedClient {
    publishes: Mutex<VecDeque<PublishResult>>,
    statuses: Mutex<VecDeque<StatusResult>>,
    published: Mutex<Vec<CanonicalListing>>,
}

impl ScriptedClient {
    pub fn push_publish(&self, result: PublishResult) {
        self.publishes.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: StatusResult) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn published(&self) -> Vec<CanonicalListing> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketplaceClient for ScriptedClient {
    async fn publish_listing(
        &self,
        listing: &CanonicalListing,
    ) -> Result<RemoteListing, MarketplaceApiError> {
        self.published.lock().unwrap().push(listing.clone());
        self.publishes.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(RemoteListing {
                remote_listing_id: "remote-listing-1".to_string(),
                remote_url: Some("https://market.example/l/1".to_string()),
            })
        })
    }

    async fn listing_status(
        &self,
        _remote_listing_id: &str,
    ) -> Result<ListingStatus, MarketplaceApiError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ListingStatus::Listed))
    }
}

/// Factory handing out one shared [`ScriptedClient`].
pub struct FakeFactory {
    pub client: Arc<ScriptedClient>,
}

impl Default for FakeFactory {
    fn default() -> Self {
        Self {
            client: Arc::new(ScriptedClient::default()),
        }
    }
}

impl MarketplaceClientFactory for FakeFactory {
    fn client(
        &self,
        _credentials: LiveCredentials,
        _sink: Arc<dyn CredentialSink>,
    ) -> Arc<dyn MarketplaceClient> {
        self.client.clone()
    }
}

// ---------------------------------------------------------------------------
// Audit

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingSink {
    pub async fn events(&self) -> Vec<AuditEventType> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.event_type)
            .collect()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn log(&self, record: AuditRecord) -> Result<(), DomainError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, DomainError> {
        let mut matched: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.org_id.is_none_or(|org| r.org_id == org))
            .filter(|r| query.event_type.is_none_or(|t| r.event_type == t))
            .filter(|r| query.account_id.is_none_or(|id| r.account_id == Some(id)))
            .cloned()
            .collect();
        matched.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn prune_before(&self, horizon: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.created_at >= horizon);
        Ok((before - records.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Listings and items

#[derive(Default)]
pub struct FakeListings {
    rows: Mutex<HashMap<ListingId, Listing>>,
    /// Marketplace per account, for remote-id routing.
    marketplaces: Mutex<HashMap<AccountId, Marketplace>>,
}

impl FakeListings {
    pub async fn seed(&self, listing: Listing) {
        self.rows.lock().unwrap().insert(listing.id, listing);
    }

    pub async fn seed_account_marketplace(&self, account_id: AccountId, marketplace: Marketplace) {
        self.marketplaces.lock().unwrap().insert(account_id, marketplace);
    }

    pub async fn get(&self, id: ListingId) -> Option<Listing> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ListingRepository for FakeListings {
    async fn insert(&self, listing: &Listing) -> Result<(), DomainError> {
        self.rows.lock().unwrap().insert(listing.id, listing.clone());
        Ok(())
    }

    async fn update(&self, listing: &Listing) -> Result<(), DomainError> {
        self.rows.lock().unwrap().insert(listing.id, listing.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DomainError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_item_and_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Listing>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|l| l.item_id == item_id && l.account_id == account_id)
            .cloned())
    }

    async fn find_by_remote_id(
        &self,
        marketplace: Marketplace,
        remote_listing_id: &str,
    ) -> Result<Option<Listing>, DomainError> {
        let marketplaces = self.marketplaces.lock().unwrap();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|l| {
                l.remote_listing_id.as_deref() == Some(remote_listing_id)
                    && marketplaces.get(&l.account_id) == Some(&marketplace)
            })
            .cloned())
    }

    async fn find_stale(
        &self,
        stale_before: DateTime<Utc>,
        org_id: Option<OrgId>,
    ) -> Result<Vec<Listing>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.is_syncable() && l.remote_listing_id.is_some())
            .filter(|l| l.last_synced_at.is_none_or(|at| at < stale_before))
            .filter(|l| org_id.is_none_or(|org| l.org_id == org))
            .cloned()
            .collect())
    }
}

pub struct FakeItems {
    items: Mutex<HashMap<ItemId, (ItemSnapshot, ItemStage, i32)>>,
}

impl Default for FakeItems {
    fn default() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeItems {
    pub fn snapshot(item_id: ItemId) -> ItemSnapshot {
        ItemSnapshot {
            item_id,
            title: "Vintage lamp".to_string(),
            description: "Mid-century brass lamp".to_string(),
            price_cents: 4_500,
            currency: "USD".to_string(),
            quantity: 1,
            attributes: json!({ "condition": "used_good" }),
        }
    }

    pub async fn seed(&self, snapshot: ItemSnapshot, stage: ItemStage, quantity: i32) {
        self.items
            .lock()
            .unwrap()
            .insert(snapshot.item_id, (snapshot, stage, quantity));
    }

    pub async fn stage_of(&self, item_id: ItemId) -> Option<ItemStage> {
        self.items.lock().unwrap().get(&item_id).map(|(_, s, _)| *s)
    }
}

#[async_trait]
impl ItemStore for FakeItems {
    async fn snapshot(&self, item_id: ItemId) -> Result<Option<ItemSnapshot>, DomainError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&item_id)
            .map(|(s, _, _)| s.clone()))
    }

    async fn stage(&self, item_id: ItemId) -> Result<Option<ItemStage>, DomainError> {
        Ok(self.items.lock().unwrap().get(&item_id).map(|(_, s, _)| *s))
    }

    async fn remaining_quantity(&self, item_id: ItemId) -> Result<i32, DomainError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&item_id)
            .map(|(_, _, q)| *q)
            .unwrap_or(0))
    }

    async fn advance_to_listed(&self, item_id: ItemId) -> Result<(), DomainError> {
        let mut items = self.items.lock().unwrap();
        if let Some((_, stage, _)) = items.get_mut(&item_id) {
            if matches!(stage, ItemStage::Draft | ItemStage::Ready) {
                *stage = ItemStage::Listed;
            }
        }
        Ok(())
    }

    async fn advance_to_sold(&self, item_id: ItemId) -> Result<(), DomainError> {
        let mut items = self.items.lock().unwrap();
        if let Some((_, stage, _)) = items.get_mut(&item_id) {
            if *stage == ItemStage::Listed {
                *stage = ItemStage::Sold;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue, dedup, notifier

#[derive(Default)]
pub struct FakeQueue {
    pub publishes: Mutex<Vec<PublishJob>>,
    pub syncs: Mutex<Vec<SyncJob>>,
    recurring: Mutex<HashMap<String, (StdDuration, SyncJob)>>,
}

impl FakeQueue {
    pub async fn recurring(&self) -> HashMap<String, (StdDuration, SyncJob)> {
        self.recurring.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for FakeQueue {
    async fn enqueue_publish(&self, job: PublishJob) -> Result<(), DomainError> {
        self.publishes.lock().unwrap().push(job);
        Ok(())
    }

    async fn enqueue_sync(&self, job: SyncJob) -> Result<(), DomainError> {
        self.syncs.lock().unwrap().push(job);
        Ok(())
    }

    async fn register_recurring_sync(
        &self,
        name: &str,
        every: StdDuration,
        job: SyncJob,
    ) -> Result<(), DomainError> {
        let mut recurring = self.recurring.lock().unwrap();
        recurring.remove(name);
        recurring.insert(name.to_string(), (every, job));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDedup {
    seen: Mutex<HashSet<String>>,
}

#[async_trait]
impl WebhookDedupStore for FakeDedup {
    async fn check_and_record(&self, webhook_id: &str) -> bool {
        self.seen.lock().unwrap().insert(webhook_id.to_string())
    }

    async fn sweep_expired(&self) -> usize {
        0
    }

    async fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ExpiringSoon(AccountId),
    Expired(AccountId),
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl FakeNotifier {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExpiryNotifier for FakeNotifier {
    async fn notify_expiring_soon(&self, account: &MarketplaceAccount, _hours_left: f64) {
        self.sent
            .lock()
            .unwrap()
            .push(Notification::ExpiringSoon(account.id));
    }

    async fn notify_expired(&self, account: &MarketplaceAccount) {
        self.sent.lock().unwrap().push(Notification::Expired(account.id));
    }
}
