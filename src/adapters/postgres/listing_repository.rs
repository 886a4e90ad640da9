//! PostgreSQL implementation of ListingRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::account::Marketplace;
use crate::domain::foundation::{AccountId, DomainError, ItemId, ListingId, OrgId};
use crate::domain::listing::{Listing, ListingStatus};
use crate::ports::ListingRepository;

pub struct PostgresListingRepository {
    pool: PgPool,
}

impl PostgresListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a listing.
#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    item_id: Uuid,
    account_id: Uuid,
    org_id: Uuid,
    status: String,
    remote_listing_id: Option<String>,
    remote_url: Option<String>,
    error_message: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = DomainError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Listing {
            id: ListingId::from_uuid(row.id),
            item_id: ItemId::from_uuid(row.item_id),
            account_id: AccountId::from_uuid(row.account_id),
            org_id: OrgId::from_uuid(row.org_id),
            status: parse_status(&row.status)?,
            remote_listing_id: row.remote_listing_id,
            remote_url: row.remote_url,
            error_message: row.error_message,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(s: &str) -> Result<ListingStatus, DomainError> {
    match s {
        "draft" => Ok(ListingStatus::Draft),
        "listing_pending" => Ok(ListingStatus::ListingPending),
        "listed" => Ok(ListingStatus::Listed),
        "sold" => Ok(ListingStatus::Sold),
        "ended" => Ok(ListingStatus::Ended),
        "error" => Ok(ListingStatus::Error),
        _ => Err(DomainError::database(format!(
            "Invalid listing status value: {s}"
        ))),
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT l.id, l.item_id, l.account_id, l.org_id, l.status,
           l.remote_listing_id, l.remote_url, l.error_message,
           l.last_synced_at, l.created_at, l.updated_at
    FROM listings l
"#;

#[async_trait]
impl ListingRepository for PostgresListingRepository {
    async fn insert(&self, listing: &Listing) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO listings (
                id, item_id, account_id, org_id, status, remote_listing_id,
                remote_url, error_message, last_synced_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(listing.id.as_uuid())
        .bind(listing.item_id.as_uuid())
        .bind(listing.account_id.as_uuid())
        .bind(listing.org_id.as_uuid())
        .bind(listing.status.as_str())
        .bind(&listing.remote_listing_id)
        .bind(&listing.remote_url)
        .bind(&listing.error_message)
        .bind(listing.last_synced_at)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert listing: {e}")))?;

        Ok(())
    }

    async fn update(&self, listing: &Listing) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                status = $2,
                remote_listing_id = $3,
                remote_url = $4,
                error_message = $5,
                last_synced_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(listing.id.as_uuid())
        .bind(listing.status.as_str())
        .bind(&listing.remote_listing_id)
        .bind(&listing.remote_url)
        .bind(&listing.error_message)
        .bind(listing.last_synced_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update listing: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database("Listing row vanished during update"));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DomainError> {
        let row: Option<ListingRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE l.id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find listing: {e}")))?;

        row.map(Listing::try_from).transpose()
    }

    async fn find_by_item_and_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Listing>, DomainError> {
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE l.item_id = $1 AND l.account_id = $2"
        ))
        .bind(item_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find listing: {e}")))?;

        row.map(Listing::try_from).transpose()
    }

    async fn find_by_remote_id(
        &self,
        marketplace: Marketplace,
        remote_listing_id: &str,
    ) -> Result<Option<Listing>, DomainError> {
        // Webhooks identify listings by marketplace, not account; join
        // through the account to scope the remote id.
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS}
            JOIN marketplace_accounts a ON a.id = l.account_id
            WHERE a.marketplace = $1 AND l.remote_listing_id = $2
            "#
        ))
        .bind(marketplace.as_str())
        .bind(remote_listing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find listing: {e}")))?;

        row.map(Listing::try_from).transpose()
    }

    async fn find_stale(
        &self,
        stale_before: DateTime<Utc>,
        org_id: Option<OrgId>,
    ) -> Result<Vec<Listing>, DomainError> {
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS}
            JOIN marketplace_accounts a ON a.id = l.account_id
            WHERE l.status IN ('listed', 'listing_pending')
              AND l.remote_listing_id IS NOT NULL
              AND a.status = 'active'
              AND (l.last_synced_at IS NULL OR l.last_synced_at < $1)
              AND ($2::uuid IS NULL OR l.org_id = $2)
            ORDER BY l.last_synced_at ASC NULLS FIRST
            "#
        ))
        .bind(stale_before)
        .bind(org_id.map(|o| *o.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find stale listings: {e}")))?;

        rows.into_iter().map(Listing::try_from).collect()
    }
}
