//! ItemStore port - the slice of the external item catalog the processors
//! need: a snapshot for publishing and the lifecycle stage.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ItemId};
use crate::domain::listing::{ItemSnapshot, ItemStage};

/// Port for reading items and advancing their lifecycle stage.
///
/// Items are owned by the wider platform. Stage progression is idempotent:
/// `advance_to_listed` on an item already at or past `Listed` is a no-op,
/// so a retried publish never regresses the stage.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Item fields used to build a canonical listing.
    async fn snapshot(&self, item_id: ItemId) -> Result<Option<ItemSnapshot>, DomainError>;

    /// Current lifecycle stage.
    async fn stage(&self, item_id: ItemId) -> Result<Option<ItemStage>, DomainError>;

    /// Remaining sellable quantity across all channels.
    async fn remaining_quantity(&self, item_id: ItemId) -> Result<i32, DomainError>;

    /// Advances Draft/Ready to Listed. No-op when already Listed or Sold.
    async fn advance_to_listed(&self, item_id: ItemId) -> Result<(), DomainError>;

    /// Advances to Sold.
    async fn advance_to_sold(&self, item_id: ItemId) -> Result<(), DomainError>;
}
