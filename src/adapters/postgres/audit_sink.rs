//! PostgreSQL implementation of AuditSink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::account::Marketplace;
use crate::domain::audit::{AuditEventType, AuditQuery, AuditRecord};
use crate::domain::foundation::{AccountId, AuditRecordId, DomainError, OrgId, UserId};
use crate::ports::AuditSink;

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an audit record.
#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    org_id: Uuid,
    user_id: Option<Uuid>,
    account_id: Option<Uuid>,
    marketplace: Option<String>,
    event_type: String,
    message: String,
    metadata: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = DomainError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditRecord {
            id: AuditRecordId::from_uuid(row.id),
            org_id: OrgId::from_uuid(row.org_id),
            user_id: row.user_id.map(UserId::from_uuid),
            account_id: row.account_id.map(AccountId::from_uuid),
            marketplace: row
                .marketplace
                .as_deref()
                .map(|m| m.parse::<Marketplace>())
                .transpose()
                .map_err(DomainError::database)?,
            event_type: parse_event_type(&row.event_type)?,
            message: row.message,
            metadata: row.metadata,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

fn parse_event_type(s: &str) -> Result<AuditEventType, DomainError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| DomainError::database(format!("Invalid audit event type: {s}")))
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn log(&self, record: AuditRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, org_id, user_id, account_id, marketplace, event_type,
                message, metadata, ip_address, user_agent, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.org_id.as_uuid())
        .bind(record.user_id.map(|u| *u.as_uuid()))
        .bind(record.account_id.map(|a| *a.as_uuid()))
        .bind(record.marketplace.map(|m| m.as_str()))
        .bind(record.event_type.as_str())
        .bind(&record.message)
        .bind(&record.metadata)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to write audit record: {e}")))?;

        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, DomainError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, org_id, user_id, account_id, marketplace, event_type,
                   message, metadata, ip_address, user_agent, created_at
            FROM audit_log
            WHERE ($1::uuid IS NULL OR org_id = $1)
              AND ($2::uuid IS NULL OR account_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::text IS NULL OR marketplace = $4)
              AND ($5::text IS NULL OR event_type = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(query.org_id.map(|o| *o.as_uuid()))
        .bind(query.account_id.map(|a| *a.as_uuid()))
        .bind(query.user_id.map(|u| *u.as_uuid()))
        .bind(query.marketplace.map(|m| m.as_str()))
        .bind(query.event_type.map(|t| t.as_str()))
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to query audit log: {e}")))?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn prune_before(&self, horizon: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
            .bind(horizon)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to prune audit log: {e}")))?;

        Ok(result.rows_affected())
    }
}
