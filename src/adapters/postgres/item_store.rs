//! PostgreSQL implementation of ItemStore.
//!
//! Items are owned by the wider platform; this adapter reads the fields
//! the processors need and advances the lifecycle stage with guarded
//! updates, so a concurrent or retried job cannot regress a stage.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ItemId};
use crate::domain::listing::{ItemSnapshot, ItemStage};
use crate::ports::ItemStore;

pub struct PostgresItemStore {
    pool: PgPool,
}

impl PostgresItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    title: String,
    description: String,
    price_cents: i64,
    currency: String,
    quantity: i32,
    attributes: serde_json::Value,
}

impl From<ItemRow> for ItemSnapshot {
    fn from(row: ItemRow) -> Self {
        ItemSnapshot {
            item_id: ItemId::from_uuid(row.id),
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
            currency: row.currency,
            quantity: row.quantity,
            attributes: row.attributes,
        }
    }
}

fn parse_stage(s: &str) -> Result<ItemStage, DomainError> {
    match s {
        "draft" => Ok(ItemStage::Draft),
        "ready" => Ok(ItemStage::Ready),
        "listed" => Ok(ItemStage::Listed),
        "sold" => Ok(ItemStage::Sold),
        _ => Err(DomainError::database(format!("Invalid item stage: {s}"))),
    }
}

#[async_trait]
impl ItemStore for PostgresItemStore {
    async fn snapshot(&self, item_id: ItemId) -> Result<Option<ItemSnapshot>, DomainError> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, price_cents, currency, quantity, attributes
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to read item: {e}")))?;

        Ok(row.map(ItemSnapshot::from))
    }

    async fn stage(&self, item_id: ItemId) -> Result<Option<ItemStage>, DomainError> {
        let stage: Option<String> = sqlx::query_scalar("SELECT stage FROM items WHERE id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to read item stage: {e}")))?;

        stage.as_deref().map(parse_stage).transpose()
    }

    async fn remaining_quantity(&self, item_id: ItemId) -> Result<i32, DomainError> {
        let quantity: Option<i32> =
            sqlx::query_scalar("SELECT quantity FROM items WHERE id = $1")
                .bind(item_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to read quantity: {e}")))?;

        Ok(quantity.unwrap_or(0))
    }

    async fn advance_to_listed(&self, item_id: ItemId) -> Result<(), DomainError> {
        // Guarded update: only draft/ready move forward, anything else is a
        // no-op rather than an error.
        sqlx::query(
            "UPDATE items SET stage = 'listed' WHERE id = $1 AND stage IN ('draft', 'ready')",
        )
        .bind(item_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to advance item stage: {e}")))?;

        Ok(())
    }

    async fn advance_to_sold(&self, item_id: ItemId) -> Result<(), DomainError> {
        // Only a listed item can sell out; draft/ready never jump stages.
        sqlx::query("UPDATE items SET stage = 'sold' WHERE id = $1 AND stage = 'listed'")
            .bind(item_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to advance item stage: {e}")))?;

        Ok(())
    }
}
