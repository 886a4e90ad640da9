//! PostgreSQL implementation of AccountRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::account::{
    AccountStatus, Marketplace, MarketplaceAccount, MAX_AUTO_REFRESH_ATTEMPTS,
};
use crate::domain::foundation::{AccountId, DomainError, OrgId, UserId};
use crate::ports::AccountRepository;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a marketplace account.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    org_id: Uuid,
    user_id: Uuid,
    marketplace: String,
    encrypted_access_token: String,
    encrypted_refresh_token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    remote_account_id: String,
    status: String,
    settings: serde_json::Value,
    auto_refresh_attempts: i32,
    last_checked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for MarketplaceAccount {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(MarketplaceAccount {
            id: AccountId::from_uuid(row.id),
            org_id: OrgId::from_uuid(row.org_id),
            user_id: UserId::from_uuid(row.user_id),
            marketplace: row
                .marketplace
                .parse::<Marketplace>()
                .map_err(DomainError::database)?,
            encrypted_access_token: row.encrypted_access_token,
            encrypted_refresh_token: row.encrypted_refresh_token,
            token_expires_at: row.token_expires_at,
            remote_account_id: row.remote_account_id,
            status: parse_status(&row.status)?,
            settings: row.settings,
            auto_refresh_attempts: row.auto_refresh_attempts,
            last_checked_at: row.last_checked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(s: &str) -> Result<AccountStatus, DomainError> {
    match s {
        "active" => Ok(AccountStatus::Active),
        "expired" => Ok(AccountStatus::Expired),
        "revoked" => Ok(AccountStatus::Revoked),
        "error" => Ok(AccountStatus::Error),
        _ => Err(DomainError::database(format!(
            "Invalid account status value: {s}"
        ))),
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, org_id, user_id, marketplace, encrypted_access_token,
           encrypted_refresh_token, token_expires_at, remote_account_id,
           status, settings, auto_refresh_attempts, last_checked_at,
           created_at, updated_at
    FROM marketplace_accounts
"#;

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn insert(&self, account: &MarketplaceAccount) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO marketplace_accounts (
                id, org_id, user_id, marketplace, encrypted_access_token,
                encrypted_refresh_token, token_expires_at, remote_account_id,
                status, settings, auto_refresh_attempts, last_checked_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.org_id.as_uuid())
        .bind(account.user_id.as_uuid())
        .bind(account.marketplace.as_str())
        .bind(&account.encrypted_access_token)
        .bind(&account.encrypted_refresh_token)
        .bind(account.token_expires_at)
        .bind(&account.remote_account_id)
        .bind(account.status.as_str())
        .bind(&account.settings)
        .bind(account.auto_refresh_attempts)
        .bind(account.last_checked_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert account: {e}")))?;

        Ok(())
    }

    async fn update(&self, account: &MarketplaceAccount) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE marketplace_accounts SET
                encrypted_access_token = $2,
                encrypted_refresh_token = $3,
                token_expires_at = $4,
                status = $5,
                settings = $6,
                auto_refresh_attempts = $7,
                last_checked_at = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.encrypted_access_token)
        .bind(&account.encrypted_refresh_token)
        .bind(account.token_expires_at)
        .bind(account.status.as_str())
        .bind(&account.settings)
        .bind(account.auto_refresh_attempts)
        .bind(account.last_checked_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update account: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database("Account row vanished during update"));
        }

        Ok(())
    }

    async fn reserve_refresh_attempt(
        &self,
        id: AccountId,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        // Conditional increment in one statement; two concurrent sweeps
        // cannot both take the last unit of budget.
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE marketplace_accounts SET
                auto_refresh_attempts = auto_refresh_attempts + 1,
                last_checked_at = $2,
                updated_at = $2
            WHERE id = $1 AND auto_refresh_attempts < $3
            RETURNING id, org_id, user_id, marketplace, encrypted_access_token,
                      encrypted_refresh_token, token_expires_at, remote_account_id,
                      status, settings, auto_refresh_attempts, last_checked_at,
                      created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .bind(MAX_AUTO_REFRESH_ATTEMPTS)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to reserve refresh attempt: {e}")))?;

        row.map(MarketplaceAccount::try_from).transpose()
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<MarketplaceAccount>, DomainError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find account: {e}")))?;

        row.map(MarketplaceAccount::try_from).transpose()
    }

    async fn find_by_id_for_org(
        &self,
        id: AccountId,
        org_id: OrgId,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1 AND org_id = $2"))
                .bind(id.as_uuid())
                .bind(org_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find account: {e}")))?;

        row.map(MarketplaceAccount::try_from).transpose()
    }

    async fn find_by_remote_identity(
        &self,
        org_id: OrgId,
        marketplace: Marketplace,
        remote_account_id: &str,
    ) -> Result<Option<MarketplaceAccount>, DomainError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE org_id = $1 AND marketplace = $2 AND remote_account_id = $3"
        ))
        .bind(org_id.as_uuid())
        .bind(marketplace.as_str())
        .bind(remote_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find account: {e}")))?;

        row.map(MarketplaceAccount::try_from).transpose()
    }

    async fn find_active_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceAccount>, DomainError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS}
            WHERE status = 'active'
              AND token_expires_at IS NOT NULL
              AND token_expires_at <= $1
            ORDER BY token_expires_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find expiring accounts: {e}")))?;

        rows.into_iter()
            .map(MarketplaceAccount::try_from)
            .collect()
    }
}
