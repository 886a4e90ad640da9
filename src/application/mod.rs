//! Application layer - use cases orchestrating domain objects through ports.

pub mod accounts;
pub mod audit;
pub mod publish_job;
pub mod sync_job;
pub mod token_monitor;
pub mod webhooks;

pub use accounts::{AccountService, MarketplaceRegistry};
pub use audit::{AuditRetentionSweep, Auditor};
pub use publish_job::PublishProcessor;
pub use sync_job::{SyncOutcome, SyncProcessor};
pub use token_monitor::TokenMonitor;
pub use webhooks::{WebhookOutcome, WebhookRouteError, WebhookRouter};
