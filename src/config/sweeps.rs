//! Background sweep configuration: monitor cadence, sync staleness,
//! audit retention, dedup bounds.

use serde::Deserialize;
use std::time::Duration;

/// Sweep and cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Token expiration monitor interval in seconds
    #[serde(default = "default_hour_secs")]
    pub monitor_interval_secs: u64,

    /// Recurring bulk-sync interval in seconds
    #[serde(default = "default_hour_secs")]
    pub sync_interval_secs: u64,

    /// Listings last synced longer ago than this are stale (seconds)
    #[serde(default = "default_hour_secs")]
    pub sync_stale_after_secs: u64,

    /// Audit record retention in days
    #[serde(default = "default_retention_days")]
    pub audit_retention_days: u32,

    /// Maximum webhook dedup entries before FIFO eviction
    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,

    /// Webhook dedup entry TTL in seconds
    #[serde(default = "default_hour_secs")]
    pub dedup_ttl_secs: u64,
}

impl SweepConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sync_stale_after(&self) -> Duration {
        Duration::from_secs(self.sync_stale_after_secs)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_hour_secs(),
            sync_interval_secs: default_hour_secs(),
            sync_stale_after_secs: default_hour_secs(),
            audit_retention_days: default_retention_days(),
            dedup_max_entries: default_dedup_max_entries(),
            dedup_ttl_secs: default_hour_secs(),
        }
    }
}

fn default_hour_secs() -> u64 {
    3600
}

fn default_retention_days() -> u32 {
    90
}

fn default_dedup_max_entries() -> usize {
    10_000
}
