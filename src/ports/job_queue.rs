//! JobQueue port - contract with the external durable queue.
//!
//! The queue's broker owns durability, retry backoff, and dead-lettering;
//! the core only enqueues and consumes named jobs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{AccountId, DomainError, ItemId, ListingId, OrgId, UserId};

/// Payload for a publish job, keyed by (item, account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishJob {
    pub item_id: ItemId,
    pub account_id: AccountId,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    pub auto_published: bool,
}

/// Payload for a sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncJob {
    /// Sync one listing against its marketplace.
    Listing {
        listing_id: ListingId,
        account_id: AccountId,
    },
    /// Sync every stale listing, optionally scoped to one organization.
    AllStale {
        org_id: Option<OrgId>,
        /// Listings last synced longer ago than this are stale.
        #[serde(with = "stale_after_secs")]
        stale_after: Duration,
    },
}

mod stale_after_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Port for the durable job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_publish(&self, job: PublishJob) -> Result<(), DomainError>;

    async fn enqueue_sync(&self, job: SyncJob) -> Result<(), DomainError>;

    /// Registers a recurring sync job under a stable name.
    ///
    /// Idempotent across restarts: any prior job with the same name is
    /// removed before the new schedule is added.
    async fn register_recurring_sync(
        &self,
        name: &str,
        every: Duration,
        job: SyncJob,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_job_roundtrips_through_json() {
        let job = SyncJob::AllStale {
            org_id: Some(OrgId::new()),
            stale_after: Duration::from_secs(3600),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: SyncJob = serde_json::from_str(&json).unwrap();
        assert_eq!(job, back);
    }

    #[test]
    fn publish_job_serializes_payload_fields() {
        let job = PublishJob {
            item_id: ItemId::new(),
            account_id: AccountId::new(),
            org_id: OrgId::new(),
            user_id: None,
            auto_published: true,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["auto_published"], true);
        assert!(json["user_id"].is_null());
    }
}
