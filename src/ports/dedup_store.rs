//! WebhookDedupStore port - bounded record of recently processed webhook ids.
//!
//! Injected rather than global so a multi-instance deployment can swap the
//! in-process implementation for a shared store without code changes. Dedup
//! is best-effort: it does not survive process restart, so downstream
//! handlers stay idempotent regardless.

use async_trait::async_trait;

/// Port for webhook duplicate suppression.
#[async_trait]
pub trait WebhookDedupStore: Send + Sync {
    /// Records the id if unseen. Returns `true` when the id is new, `false`
    /// when a non-expired entry already exists (duplicate).
    async fn check_and_record(&self, webhook_id: &str) -> bool;

    /// Removes entries older than the store's TTL. Returns the count
    /// removed. Driven by a periodic sweep, independent of the size bound.
    async fn sweep_expired(&self) -> usize;

    /// Current entry count, for observability.
    async fn len(&self) -> usize;
}
