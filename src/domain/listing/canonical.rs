//! Canonical listing: the marketplace-agnostic representation submitted to
//! an adapter.
//!
//! Built from item fields with marketplace-specific overrides winning over
//! item defaults. Catalog field mapping beyond this merge is the adapter's
//! concern.

use serde_json::Value;

use crate::domain::foundation::ItemId;

/// Marketplace-agnostic listing content submitted to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalListing {
    pub item_id: ItemId,
    pub title: String,
    pub description: String,
    /// Price in minor units (cents).
    pub price_cents: i64,
    pub currency: String,
    pub quantity: i32,
    /// Merged marketplace-specific attributes.
    pub attributes: Value,
}

/// Item fields used to build a canonical listing.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub quantity: i32,
    pub attributes: Value,
}

impl CanonicalListing {
    /// Builds a canonical listing from an item, applying overrides from the
    /// account's marketplace-specific settings. Override fields win.
    pub fn from_item(item: ItemSnapshot, overrides: &Value) -> Self {
        let title = override_str(overrides, "title").unwrap_or(item.title);
        let description = override_str(overrides, "description").unwrap_or(item.description);
        let price_cents = overrides
            .get("price_cents")
            .and_then(Value::as_i64)
            .unwrap_or(item.price_cents);
        let quantity = overrides
            .get("quantity")
            .and_then(Value::as_i64)
            .map(|q| q as i32)
            .unwrap_or(item.quantity);

        let mut attributes = item.attributes;
        if let (Some(base), Some(extra)) = (
            attributes.as_object_mut(),
            overrides.get("attributes").and_then(Value::as_object),
        ) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }

        Self {
            item_id: item.item_id,
            title,
            description,
            price_cents,
            currency: item.currency,
            quantity,
            attributes,
        }
    }
}

fn override_str(overrides: &Value, key: &str) -> Option<String> {
    overrides
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}
