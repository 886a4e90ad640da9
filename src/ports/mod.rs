//! Ports - interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage
//!
//! - `AccountRepository` - marketplace credential store
//! - `ListingRepository` - listing persistence
//! - `ItemStore` - external item catalog (snapshot + lifecycle stage)
//! - `AuditSink` - append-only audit log
//!
//! ## Marketplace
//!
//! - `MarketplaceOAuthDriver` - per-marketplace OAuth capability
//! - `MarketplaceClient` / `MarketplaceClientFactory` - authenticated listing ops
//! - `CredentialSink` - persistence path for client-initiated token rotation
//!
//! ## Infrastructure
//!
//! - `JobQueue` - external durable queue contract
//! - `WebhookDedupStore` - bounded duplicate suppression
//! - `Scheduler` - recurring in-process sweeps
//! - `ExpiryNotifier` - token lifecycle notifications

mod account_repository;
mod audit_sink;
mod dedup_store;
mod item_store;
mod job_queue;
mod listing_repository;
mod marketplace_client;
mod notifier;
mod oauth_driver;
mod scheduler;

pub use account_repository::AccountRepository;
pub use audit_sink::AuditSink;
pub use dedup_store::WebhookDedupStore;
pub use item_store::ItemStore;
pub use job_queue::{JobQueue, PublishJob, SyncJob};
pub use listing_repository::ListingRepository;
pub use marketplace_client::{
    LiveCredentials, MarketplaceApiError, MarketplaceClient, MarketplaceClientFactory,
    RemoteListing,
};
pub use notifier::ExpiryNotifier;
pub use oauth_driver::{CredentialSink, MarketplaceOAuthDriver, OAuthError, TokenGrant};
pub use scheduler::{ScheduledTask, Scheduler};
