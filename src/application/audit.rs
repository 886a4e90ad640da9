//! Auditor - no-op-on-error wrapper over the audit sink, plus the retention
//! sweep.
//!
//! Audit logging must never block or fail the operation it describes;
//! every mutating path records through this wrapper.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::domain::audit::{AuditQuery, AuditRecord};
use crate::domain::foundation::DomainError;
use crate::ports::{AuditSink, ScheduledTask};

/// Swallowing wrapper over the audit sink.
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Appends a record. Failures are logged and swallowed.
    pub async fn record(&self, record: AuditRecord) {
        let event_type = record.event_type;
        if let Err(e) = self.sink.log(record).await {
            tracing::warn!(event_type = %event_type, error = %e, "Audit write failed");
        }
    }

    /// Queries records, newest first.
    pub async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, DomainError> {
        self.sink.query(query).await
    }
}

/// Recurring sweep that prunes audit records past the retention horizon.
pub struct AuditRetentionSweep {
    sink: Arc<dyn AuditSink>,
    retention_days: u32,
}

impl AuditRetentionSweep {
    pub fn new(sink: Arc<dyn AuditSink>, retention_days: u32) -> Self {
        Self {
            sink,
            retention_days,
        }
    }

    /// Deletes records older than the horizon; returns the deleted count.
    pub async fn prune(&self) -> Result<u64, DomainError> {
        let horizon = Utc::now() - Duration::days(i64::from(self.retention_days));
        let deleted = self.sink.prune_before(horizon).await?;
        if deleted > 0 {
            tracing::info!(deleted, retention_days = self.retention_days, "Pruned audit records");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl ScheduledTask for AuditRetentionSweep {
    async fn run(&self) {
        if let Err(e) = self.prune().await {
            tracing::warn!(error = %e, "Audit retention sweep failed");
        }
    }
}
