//! AuditSink port - append-only structured event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::audit::{AuditQuery, AuditRecord};
use crate::domain::foundation::DomainError;

/// Port for the audit log.
///
/// Callers on mutating paths wrap `log` with a no-op-on-error policy (see
/// `application::audit::Auditor`): audit failures must never fail the
/// operation they describe.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends a record.
    async fn log(&self, record: AuditRecord) -> Result<(), DomainError>;

    /// Queries records matching the filter, newest first.
    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, DomainError>;

    /// Deletes records older than `horizon` and returns the deleted count.
    async fn prune_before(&self, horizon: DateTime<Utc>) -> Result<u64, DomainError>;
}
